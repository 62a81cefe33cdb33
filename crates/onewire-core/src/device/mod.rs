//! The device table (`Device`/`FileType`/`Aggregate`): static,
//! process-wide, read-only data mapping 1-Wire family codes to the
//! properties they expose.

pub mod families;
pub mod ops;

pub use ops::{HandlerCtx, PropertyOps};

use crate::format::Format;
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Chip,
    Interface,
    Pseudo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeClass {
    Static,
    Stable,
    Volatile,
    Alarm,
    Directory,
    Subdir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStyle {
    Numbers,
    Letters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStyle {
    /// One wire op per element.
    Separate,
    /// One wire op returns/accepts every element.
    Aggregate,
    /// The driver advertises both; engine picks the narrower for writes.
    Mixed,
    /// All elements packed into one unsigned; `.BYTE` is the packed view.
    Bitfield,
}

#[derive(Debug, Clone, Copy)]
pub struct Aggregate {
    pub count: u32,
    pub index_style: IndexStyle,
    pub storage: StorageStyle,
}

impl Aggregate {
    pub const fn new(count: u32, index_style: IndexStyle, storage: StorageStyle) -> Self {
        Aggregate {
            count,
            index_style,
            storage,
        }
    }
}

pub struct FileType {
    pub name: &'static str,
    pub nominal_length: usize,
    pub aggregate: Option<Aggregate>,
    pub format: Format,
    pub change_class: ChangeClass,
    pub ops: &'static dyn PropertyOps,
}

impl FileType {
    pub fn is_bitfield(&self) -> bool {
        matches!(
            self.aggregate,
            Some(Aggregate {
                storage: StorageStyle::Bitfield,
                ..
            })
        )
    }

    pub fn element_count(&self) -> u32 {
        self.aggregate.map_or(1, |a| a.count)
    }
}

pub struct Device {
    pub family: u8,
    pub name: &'static str,
    pub class: DeviceClass,
    pub filetypes: &'static [FileType],
}

impl Device {
    pub fn find_filetype(&self, name: &str) -> Option<&'static FileType> {
        self.filetypes.iter().find(|ft| ft.name.eq_ignore_ascii_case(name))
    }
}

fn registry() -> &'static HashMap<u8, &'static Device> {
    static REGISTRY: OnceLock<HashMap<u8, &'static Device>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        for device in families::chip_devices() {
            // Duplicate family codes are a startup error; since this
            // table is compiled in, a panic here means the
            // crate itself is broken, not a runtime/config condition.
            if map.insert(device.family, device).is_some() {
                panic!("duplicate family code 0x{:02X} in device table", device.family);
            }
        }
        map
    })
}

pub fn lookup_family(family: u8) -> Option<&'static Device> {
    registry().get(&family).copied()
}

fn pseudo_registry() -> &'static HashMap<&'static str, &'static Device> {
    static REGISTRY: OnceLock<HashMap<&'static str, &'static Device>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        for device in families::pseudo_devices() {
            map.insert(device.name, device);
        }
        map
    })
}

pub fn lookup_pseudo(name: &str) -> Option<&'static Device> {
    pseudo_registry().get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_no_duplicate_families() {
        // Forces initialization; a panic inside `registry()` would fail
        // this test rather than surface lazily on first real use.
        assert!(lookup_family(0x2C).is_some());
    }
}
