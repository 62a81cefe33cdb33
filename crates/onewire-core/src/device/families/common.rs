//! The properties every real chip carries, grounded on `ow_2890.c`'s
//! `F_STANDARD` macro (address/family/type, present on every device entry
//! regardless of family-specific properties).

use crate::device::ops::HandlerCtx;
use crate::device::{ChangeClass, FileType, PropertyOps};
use crate::error::CoreResult;
use crate::format::{Format, Value};
use async_trait::async_trait;

pub struct AddressOps;

#[async_trait]
impl PropertyOps for AddressOps {
    async fn read_one(&self, ctx: &HandlerCtx<'_>, _index: u8) -> CoreResult<Value> {
        Ok(Value::Ascii(ctx.rom.to_canonical_string()))
    }
}

pub struct FamilyOps;

#[async_trait]
impl PropertyOps for FamilyOps {
    async fn read_one(&self, ctx: &HandlerCtx<'_>, _index: u8) -> CoreResult<Value> {
        Ok(Value::Ascii(format!("{:02X}", ctx.rom.family())))
    }
}

pub struct StaticTextOps(pub &'static str);

#[async_trait]
impl PropertyOps for StaticTextOps {
    async fn read_one(&self, _ctx: &HandlerCtx<'_>, _index: u8) -> CoreResult<Value> {
        Ok(Value::Ascii(self.0.to_string()))
    }
}

pub static ADDRESS: AddressOps = AddressOps;
pub static FAMILY: FamilyOps = FamilyOps;

pub const fn address_filetype() -> FileType {
    FileType {
        name: "address",
        nominal_length: 16,
        aggregate: None,
        format: Format::Ascii,
        change_class: ChangeClass::Static,
        ops: &ADDRESS,
    }
}

pub const fn family_filetype() -> FileType {
    FileType {
        name: "family",
        nominal_length: 2,
        aggregate: None,
        format: Format::Ascii,
        change_class: ChangeClass::Static,
        ops: &FAMILY,
    }
}
