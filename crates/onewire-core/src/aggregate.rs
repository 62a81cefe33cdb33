//! Aggregate Engine: turns a `FileType` plus an
//! `Extension` into the handler calls needed to produce or accept a
//! value, implementing the four storage strategies uniformly so the
//! dispatcher never has to know which one a given device uses.

use crate::device::ops::HandlerCtx;
use crate::device::FileType;
use crate::error::{CoreError, CoreResult};
use crate::format::Value;
use crate::path::Extension;

/// Reads the value(s) a parsed path's extension selects.
///
/// - `Extension::None` (scalar property): a single element at index 0.
/// - `Extension::Index(i)`: one element, read directly if the driver
///   supports it, otherwise via a bulk `read_all` projection.
/// - `Extension::All`: every element.
/// - `Extension::Byte`: the bitfield's packed unsigned view.
pub async fn read(ft: &FileType, ctx: &HandlerCtx<'_>, extension: Extension) -> CoreResult<Values> {
    match extension {
        Extension::None => Ok(Values::Scalar(ft.ops.read_one(ctx, 0).await?)),
        Extension::Index(i) => Ok(Values::Scalar(read_element(ft, ctx, i).await?)),
        Extension::All => Ok(Values::Array(read_all(ft, ctx).await?)),
        Extension::Byte => Ok(Values::Scalar(Value::Unsigned(read_packed_byte(ft, ctx).await?))),
    }
}

/// Writes the value(s) a parsed path's extension selects.
pub async fn write(ft: &FileType, ctx: &HandlerCtx<'_>, extension: Extension, values: Values) -> CoreResult<()> {
    match (extension, values) {
        (Extension::None, Values::Scalar(v)) => ft.ops.write_one(ctx, 0, v).await,
        (Extension::Index(i), Values::Scalar(v)) => write_element(ft, ctx, i, v).await,
        (Extension::All, Values::Array(vs)) => write_all(ft, ctx, vs).await,
        (Extension::Byte, Values::Scalar(Value::Unsigned(packed))) => write_packed_byte(ft, ctx, packed).await,
        _ => Err(CoreError::BadFormat("extension/value shape mismatch".into())),
    }
}

/// Either one value (scalar or indexed access) or a full array (ALL).
#[derive(Debug, Clone)]
pub enum Values {
    Scalar(Value),
    Array(Vec<Value>),
}

async fn read_element(ft: &FileType, ctx: &HandlerCtx<'_>, index: u8) -> CoreResult<Value> {
    match ft.ops.read_one(ctx, index).await {
        Err(CoreError::NotReadable) => {
            let all = read_all(ft, ctx).await?;
            all.into_iter()
                .nth(usize::from(index))
                .ok_or(CoreError::OutOfRange)
        }
        other => other,
    }
}

async fn read_all(ft: &FileType, ctx: &HandlerCtx<'_>) -> CoreResult<Vec<Value>> {
    match ft.ops.read_all(ctx).await {
        Err(CoreError::NotReadable) if ft.aggregate.is_some() => {
            let count = ft.element_count();
            let mut values = Vec::with_capacity(count as usize);
            for i in 0..count {
                values.push(ft.ops.read_one(ctx, u8::try_from(i).map_err(|_| CoreError::OutOfRange)?).await?);
            }
            Ok(values)
        }
        other => other,
    }
}

async fn read_packed_byte(ft: &FileType, ctx: &HandlerCtx<'_>) -> CoreResult<u64> {
    if !ft.is_bitfield() {
        return Err(CoreError::BadFormat("BYTE view is only valid for bitfield properties".into()));
    }
    let values = read_all(ft, ctx).await?;
    let mut packed = 0u64;
    for (bit, value) in values.into_iter().enumerate() {
        if let Value::YesNo(true) = value {
            packed |= 1 << bit;
        }
    }
    Ok(packed)
}

/// A write to one element: direct if the driver supports per-element
/// writes, otherwise read-modify-write — bulk read, substitute, bulk
/// write. A device with no bulk read handler simply fails read-only,
/// via `read_all`'s own `NotReadable` propagating out.
async fn write_element(ft: &FileType, ctx: &HandlerCtx<'_>, index: u8, value: Value) -> CoreResult<()> {
    match ft.ops.write_one(ctx, index, value.clone()).await {
        Err(CoreError::NotWritable) if ft.aggregate.is_some() => {
            let mut all = read_all(ft, ctx).await?;
            let slot = all.get_mut(usize::from(index)).ok_or(CoreError::OutOfRange)?;
            *slot = value;
            write_all(ft, ctx, all).await
        }
        other => other,
    }
}

async fn write_all(ft: &FileType, ctx: &HandlerCtx<'_>, mut values: Vec<Value>) -> CoreResult<()> {
    let count = ft.element_count() as usize;
    while values.len() < count {
        values.push(ft.format.default_value());
    }
    values.truncate(count);

    match ft.ops.write_all(ctx, values.clone()).await {
        Err(CoreError::NotWritable) if matches!(ft.aggregate, Some(a) if matches!(a.storage, crate::device::StorageStyle::Separate)) => {
            for (i, value) in values.into_iter().enumerate() {
                ft.ops.write_one(ctx, u8::try_from(i).map_err(|_| CoreError::OutOfRange)?, value).await?;
            }
            Ok(())
        }
        other => other,
    }
}

async fn write_packed_byte(ft: &FileType, ctx: &HandlerCtx<'_>, packed: u64) -> CoreResult<()> {
    if !ft.is_bitfield() {
        return Err(CoreError::BadFormat("BYTE view is only valid for bitfield properties".into()));
    }
    let count = ft.element_count();
    let values = (0..count).map(|bit| Value::YesNo(packed & (1 << bit) != 0)).collect();
    write_all(ft, ctx, values).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ops::PropertyOps;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeBitfield {
        bits: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl PropertyOps for FakeBitfield {
        async fn read_all(&self, _ctx: &HandlerCtx<'_>) -> CoreResult<Vec<Value>> {
            Ok(self.bits.lock().unwrap().iter().map(|b| Value::YesNo(*b)).collect())
        }

        async fn write_all(&self, _ctx: &HandlerCtx<'_>, values: Vec<Value>) -> CoreResult<()> {
            let mut bits = self.bits.lock().unwrap();
            for (slot, value) in bits.iter_mut().zip(values) {
                if let Value::YesNo(b) = value {
                    *slot = b;
                }
            }
            Ok(())
        }
    }

    fn bitfield_filetype(ops: &'static FakeBitfield) -> FileType {
        use crate::device::{Aggregate, ChangeClass, IndexStyle, StorageStyle};
        use crate::format::Format;
        FileType {
            name: "pio",
            nominal_length: 1,
            aggregate: Some(Aggregate::new(4, IndexStyle::Numbers, StorageStyle::Bitfield)),
            format: Format::YesNo,
            change_class: ChangeClass::Volatile,
            ops,
        }
    }

    #[tokio::test]
    async fn bitfield_byte_view_matches_sum_of_bits() {
        static OPS: std::sync::OnceLock<FakeBitfield> = std::sync::OnceLock::new();
        let ops = OPS.get_or_init(|| FakeBitfield {
            bits: Mutex::new(vec![true, false, true, false]),
        });
        let ft = bitfield_filetype(ops);

        let connection = fake_connection();
        let ctx = HandlerCtx {
            rom: crate::path::RomId([0, 0, 0, 0, 0, 0]),
            connection: &connection,
        };

        let packed = match read(&ft, &ctx, Extension::Byte).await.unwrap() {
            Values::Scalar(Value::Unsigned(n)) => n,
            _ => panic!("expected scalar unsigned"),
        };
        assert_eq!(packed, 0b0101);
    }

    fn fake_connection() -> crate::bus::ConnectionIn {
        use crate::bus::{AdapterKind, SimulatedAdapter};
        use std::sync::Arc;
        crate::bus::ConnectionIn::local(0, AdapterKind::Simulated, "sim", Arc::new(SimulatedAdapter::new(Vec::new())))
    }
}
