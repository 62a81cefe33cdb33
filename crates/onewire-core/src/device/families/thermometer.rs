//! DS18B20-style thermometer (family `0x28`). `temperature` is a
//! volatile scalar reading exercising the property cache's short TTL
//! class; `temphigh` is the aggregate (N=8) alarm-threshold scratchpad
//! exercising read-modify-write.

use super::common::{address_filetype, family_filetype};
use crate::bus::{TransactionStep, run_device_transaction};
use crate::device::ops::HandlerCtx;
use crate::device::{Aggregate, ChangeClass, Device, DeviceClass, FileType, IndexStyle, PropertyOps, StorageStyle};
use crate::error::{CoreError, CoreResult};
use crate::format::{Format, Value};
use async_trait::async_trait;

struct TemperatureOps;

#[async_trait]
impl PropertyOps for TemperatureOps {
    async fn read_one(&self, ctx: &HandlerCtx<'_>, _index: u8) -> CoreResult<Value> {
        run_device_transaction(
            ctx.connection,
            ctx.rom,
            vec![TransactionStep::Match(vec![0x44]), TransactionStep::Delay(750)],
        )
        .await?;
        let outcome = run_device_transaction(
            ctx.connection,
            ctx.rom,
            vec![
                TransactionStep::Match(vec![0xBE]),
                TransactionStep::Read(9),
                TransactionStep::Crc8(9),
            ],
        )
        .await?;
        let scratchpad = outcome.nth(0)?;
        let raw = i16::from_le_bytes([scratchpad[0], scratchpad[1]]);
        Ok(Value::Temperature(f64::from(raw) / 16.0))
    }
}

/// Scratchpad bytes 2..10, read/written as a block — the vehicle for the
/// aggregate engine's read-modify-write path, not a literal DS18B20
/// register (the real chip only has two one-byte thresholds).
struct TempHighOps;

#[async_trait]
impl PropertyOps for TempHighOps {
    async fn read_all(&self, ctx: &HandlerCtx<'_>) -> CoreResult<Vec<Value>> {
        let outcome = run_device_transaction(
            ctx.connection,
            ctx.rom,
            vec![TransactionStep::Match(vec![0xB8]), TransactionStep::Read(8)],
        )
        .await?;
        let bytes = outcome.nth(0)?;
        Ok(bytes.iter().map(|b| Value::Integer(i64::from(*b))).collect())
    }

    async fn write_all(&self, ctx: &HandlerCtx<'_>, values: Vec<Value>) -> CoreResult<()> {
        let mut bytes = Vec::with_capacity(values.len());
        for value in values {
            let Value::Integer(n) = value else {
                return Err(CoreError::BadFormat("temphigh expects integers".into()));
            };
            bytes.push(u8::try_from(n).map_err(|_| CoreError::OutOfRange)?);
        }
        let mut command = vec![0x4E];
        command.extend_from_slice(&bytes);
        run_device_transaction(
            ctx.connection,
            ctx.rom,
            vec![TransactionStep::Match(command), TransactionStep::Read(1)],
        )
        .await?;
        Ok(())
    }
}

static TEMPERATURE: TemperatureOps = TemperatureOps;
static TEMPHIGH: TempHighOps = TempHighOps;

static FILETYPES: [FileType; 4] = [
    address_filetype(),
    family_filetype(),
    FileType {
        name: "temperature",
        nominal_length: 12,
        aggregate: None,
        format: Format::Temperature,
        change_class: ChangeClass::Volatile,
        ops: &TEMPERATURE,
    },
    FileType {
        name: "temphigh",
        nominal_length: 4,
        aggregate: Some(Aggregate::new(8, IndexStyle::Numbers, StorageStyle::Aggregate)),
        format: Format::Integer,
        change_class: ChangeClass::Stable,
        ops: &TEMPHIGH,
    },
];

pub fn device() -> &'static Device {
    static DEVICE: Device = Device {
        family: 0x28,
        name: "DS18B20",
        class: DeviceClass::Chip,
        filetypes: &FILETYPES,
    };
    &DEVICE
}
