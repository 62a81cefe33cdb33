//! The `simultaneous` pseudo-device: a convert-all broadcast rather than
//! an addressed chip, grounded on `ow_exec.c`. Resolved by name
//! (`device::lookup_pseudo`), never by family code.

use crate::bus::{TransactionStep, run_broadcast_transaction};
use crate::device::ops::HandlerCtx;
use crate::device::{ChangeClass, Device, DeviceClass, FileType, PropertyOps};
use crate::error::{CoreError, CoreResult};
use crate::format::{Format, Value};
use async_trait::async_trait;

struct ConvertOps;

#[async_trait]
impl PropertyOps for ConvertOps {
    async fn write_one(&self, ctx: &HandlerCtx<'_>, _index: u8, value: Value) -> CoreResult<()> {
        let Value::YesNo(start) = value else {
            return Err(CoreError::BadFormat("convert expects yes/no".into()));
        };
        if !start {
            return Ok(());
        }
        run_broadcast_transaction(
            ctx.connection,
            vec![TransactionStep::Match(vec![0x44]), TransactionStep::Delay(750)],
        )
        .await?;
        Ok(())
    }
}

static CONVERT: ConvertOps = ConvertOps;

static FILETYPES: [FileType; 1] = [FileType {
    name: "convert",
    nominal_length: 1,
    aggregate: None,
    format: Format::YesNo,
    change_class: ChangeClass::Volatile,
    ops: &CONVERT,
}];

pub fn device() -> &'static Device {
    static DEVICE: Device = Device {
        family: 0x00,
        name: "simultaneous",
        class: DeviceClass::Pseudo,
        filetypes: &FILETYPES,
    };
    &DEVICE
}
