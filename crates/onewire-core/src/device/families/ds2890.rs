//! DS2890 single-channel digital potentiometer, grounded on `ow_2890.c`'s
//! `OW_r_wiper`/`OW_w_wiper`/`OW_r_cp`/`OW_w_cp`.

use super::common::{address_filetype, family_filetype};
use crate::bus::{TransactionStep, run_device_transaction};
use crate::device::ops::HandlerCtx;
use crate::device::{ChangeClass, Device, DeviceClass, FileType, PropertyOps};
use crate::error::{CoreError, CoreResult};
use crate::format::{Format, Value};
use async_trait::async_trait;

struct WiperOps;

#[async_trait]
impl PropertyOps for WiperOps {
    async fn read_one(&self, ctx: &HandlerCtx<'_>, _index: u8) -> CoreResult<Value> {
        let outcome = run_device_transaction(
            ctx.connection,
            ctx.rom,
            vec![TransactionStep::Match(vec![0xF0]), TransactionStep::Read(2)],
        )
        .await?;
        let resp = outcome.nth(0)?;
        Ok(Value::Unsigned(u64::from(resp[1])))
    }

    async fn write_one(&self, ctx: &HandlerCtx<'_>, _index: u8, value: Value) -> CoreResult<()> {
        let Value::Unsigned(v) = value else {
            return Err(CoreError::BadFormat("wiper expects an unsigned byte".into()));
        };
        let wiper = u8::try_from(v).map_err(|_| CoreError::OutOfRange)?;
        let outcome = run_device_transaction(
            ctx.connection,
            ctx.rom,
            vec![
                TransactionStep::Match(vec![0x0F, wiper]),
                TransactionStep::Read(1),
                TransactionStep::Match(vec![0x96]),
            ],
        )
        .await?;
        // The chip echoes the wiper setting back before release; a mismatch
        // means the write didn't land.
        if outcome.nth(0)?.first() != Some(&wiper) {
            return Err(CoreError::Io("wiper write not acknowledged".into()));
        }
        Ok(())
    }
}

struct ChargepumpOps;

#[async_trait]
impl PropertyOps for ChargepumpOps {
    async fn read_one(&self, ctx: &HandlerCtx<'_>, _index: u8) -> CoreResult<Value> {
        let outcome = run_device_transaction(
            ctx.connection,
            ctx.rom,
            vec![TransactionStep::Match(vec![0xAA]), TransactionStep::Read(2)],
        )
        .await?;
        let resp = outcome.nth(0)?;
        Ok(Value::YesNo(resp[1] & 0x40 != 0))
    }

    async fn write_one(&self, ctx: &HandlerCtx<'_>, _index: u8, value: Value) -> CoreResult<()> {
        let Value::YesNo(on) = value else {
            return Err(CoreError::BadFormat("chargepump expects yes/no".into()));
        };
        let cmd = if on { 0x4C } else { 0x0C };
        let outcome = run_device_transaction(
            ctx.connection,
            ctx.rom,
            vec![
                TransactionStep::Match(vec![0x55, cmd]),
                TransactionStep::Read(1),
                TransactionStep::Match(vec![0x96]),
            ],
        )
        .await?;
        if outcome.nth(0)?.first() != Some(&cmd) {
            return Err(CoreError::Io("chargepump write not acknowledged".into()));
        }
        Ok(())
    }
}

static WIPER: WiperOps = WiperOps;
static CHARGEPUMP: ChargepumpOps = ChargepumpOps;

static FILETYPES: [FileType; 4] = [
    address_filetype(),
    family_filetype(),
    FileType {
        name: "wiper",
        nominal_length: 3,
        aggregate: None,
        format: Format::Unsigned,
        change_class: ChangeClass::Stable,
        ops: &WIPER,
    },
    FileType {
        name: "chargepump",
        nominal_length: 1,
        aggregate: None,
        format: Format::YesNo,
        change_class: ChangeClass::Stable,
        ops: &CHARGEPUMP,
    },
];

pub fn device() -> &'static Device {
    static DEVICE: Device = Device {
        family: 0x2C,
        name: "DS2890",
        class: DeviceClass::Chip,
        filetypes: &FILETYPES,
    };
    &DEVICE
}
