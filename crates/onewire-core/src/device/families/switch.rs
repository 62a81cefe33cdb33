//! DS2408-style 8-channel switch (family `0x29`). `pio` is a bitfield
//! aggregate: the ALL view is eight `yesno` values, the BYTE view is the
//! packed unsigned, and a per-index write is read-modify-write with bit
//! substitution.

use super::common::{address_filetype, family_filetype};
use crate::bus::{TransactionStep, run_device_transaction};
use crate::device::ops::HandlerCtx;
use crate::device::{Aggregate, ChangeClass, Device, DeviceClass, FileType, IndexStyle, PropertyOps, StorageStyle};
use crate::error::{CoreError, CoreResult};
use crate::format::{Format, Value};
use async_trait::async_trait;

struct PioOps;

#[async_trait]
impl PropertyOps for PioOps {
    async fn read_all(&self, ctx: &HandlerCtx<'_>) -> CoreResult<Vec<Value>> {
        let outcome = run_device_transaction(
            ctx.connection,
            ctx.rom,
            vec![TransactionStep::Match(vec![0xF5]), TransactionStep::Read(1)],
        )
        .await?;
        let byte = outcome.nth(0)?[0];
        Ok((0..8).map(|bit| Value::YesNo(byte & (1 << bit) != 0)).collect())
    }

    async fn write_all(&self, ctx: &HandlerCtx<'_>, values: Vec<Value>) -> CoreResult<()> {
        let mut byte = 0u8;
        for (bit, value) in values.into_iter().enumerate().take(8) {
            let Value::YesNo(on) = value else {
                return Err(CoreError::BadFormat("pio expects yes/no".into()));
            };
            if on {
                byte |= 1 << bit;
            }
        }
        run_device_transaction(
            ctx.connection,
            ctx.rom,
            vec![TransactionStep::Match(vec![0x5A, byte]), TransactionStep::Read(1)],
        )
        .await?;
        Ok(())
    }
}

static PIO: PioOps = PioOps;

static FILETYPES: [FileType; 3] = [
    address_filetype(),
    family_filetype(),
    FileType {
        name: "pio",
        nominal_length: 1,
        aggregate: Some(Aggregate::new(8, IndexStyle::Numbers, StorageStyle::Bitfield)),
        format: Format::YesNo,
        change_class: ChangeClass::Volatile,
        ops: &PIO,
    },
];

pub fn device() -> &'static Device {
    static DEVICE: Device = Device {
        family: 0x29,
        name: "DS2408",
        class: DeviceClass::Chip,
        filetypes: &FILETYPES,
    };
    &DEVICE
}
