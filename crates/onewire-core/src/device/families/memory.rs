//! DS2433-style EEPROM (family `0x23`): paged memory, one wire op per
//! page, CRC-16 validated on read.

use super::common::{address_filetype, family_filetype};
use crate::bus::{TransactionStep, run_device_transaction};
use crate::device::ops::HandlerCtx;
use crate::device::{Aggregate, ChangeClass, Device, DeviceClass, FileType, IndexStyle, PropertyOps, StorageStyle};
use crate::error::{CoreError, CoreResult};
use crate::format::{Format, Value};
use async_trait::async_trait;

const PAGE_COUNT: u32 = 16;
const PAGE_LEN: usize = 32;

struct MemoryOps;

#[async_trait]
impl PropertyOps for MemoryOps {
    async fn read_one(&self, ctx: &HandlerCtx<'_>, index: u8) -> CoreResult<Value> {
        let outcome = run_device_transaction(
            ctx.connection,
            ctx.rom,
            vec![
                TransactionStep::Match(vec![0xF0, index]),
                TransactionStep::Read(PAGE_LEN + 2),
                TransactionStep::Crc16(PAGE_LEN + 2),
            ],
        )
        .await?;
        let page = outcome.nth(0)?;
        Ok(Value::Binary(page[..PAGE_LEN].to_vec()))
    }

    async fn write_one(&self, ctx: &HandlerCtx<'_>, index: u8, value: Value) -> CoreResult<()> {
        let Value::Binary(mut data) = value else {
            return Err(CoreError::BadFormat("memory page expects binary data".into()));
        };
        if data.len() > PAGE_LEN {
            return Err(CoreError::OutOfRange);
        }
        data.resize(PAGE_LEN, 0);
        let mut command = vec![0x0F, index];
        command.extend_from_slice(&data);
        run_device_transaction(
            ctx.connection,
            ctx.rom,
            vec![TransactionStep::Match(command), TransactionStep::Read(1)],
        )
        .await?;
        Ok(())
    }
}

static MEMORY: MemoryOps = MemoryOps;

static FILETYPES: [FileType; 3] = [
    address_filetype(),
    family_filetype(),
    FileType {
        name: "memory",
        nominal_length: PAGE_LEN,
        aggregate: Some(Aggregate::new(PAGE_COUNT, IndexStyle::Numbers, StorageStyle::Separate)),
        format: Format::Binary,
        change_class: ChangeClass::Stable,
        ops: &MEMORY,
    },
];

pub fn device() -> &'static Device {
    static DEVICE: Device = Device {
        family: 0x23,
        name: "DS2433",
        class: DeviceClass::Chip,
        filetypes: &FILETYPES,
    };
    &DEVICE
}
