//! The handler surface each `FileType` implements to read/write its wire
//! representation: a trait object in place of a read fn, write fn, and
//! opaque handler-data pointer.

use crate::bus::ConnectionIn;
use crate::error::{CoreError, CoreResult};
use crate::format::Value;
use crate::path::RomId;
use async_trait::async_trait;

/// Everything a property handler needs to run a transaction: which device
/// it's talking to and over which already-bound bus.
pub struct HandlerCtx<'a> {
    pub rom: RomId,
    pub connection: &'a ConnectionIn,
}

/// A property's wire-level read/write behavior. Scalar properties (no
/// `Aggregate`) only implement `read_one`/`write_one` with `index` always
/// `0`; `aggregate`-storage properties only implement `read_all`/
/// `write_all`; `mixed` implements both; `bitfield` implements `read_all`
/// (as yes/no values) and, where the chip allows it, `write_one` for
/// per-bit read-modify-write.
#[async_trait]
pub trait PropertyOps: Send + Sync {
    async fn read_one(&self, _ctx: &HandlerCtx<'_>, _index: u8) -> CoreResult<Value> {
        Err(CoreError::NotReadable)
    }

    async fn write_one(&self, _ctx: &HandlerCtx<'_>, _index: u8, _value: Value) -> CoreResult<()> {
        Err(CoreError::NotWritable)
    }

    async fn read_all(&self, _ctx: &HandlerCtx<'_>) -> CoreResult<Vec<Value>> {
        Err(CoreError::NotReadable)
    }

    async fn write_all(&self, _ctx: &HandlerCtx<'_>, _values: Vec<Value>) -> CoreResult<()> {
        Err(CoreError::NotWritable)
    }
}
