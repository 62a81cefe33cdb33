//! Path parsing: textual path → [`ParsedName`].
//!
//! The parser never touches the bus — presence is resolved later by the
//! router (see `crate::router`). A `ParsedName` is a stack-scoped,
//! immutable value; rebinding it to a bus produces a *new* value
//! (`ParsedName::rebind`) rather than mutating one in place.

mod parser;

pub use parser::parse;

use crate::crc::crc8;
use crate::device::{Device, FileType};

/// Which of the reserved top-level trees a path resolves into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Real,
    System,
    Statistics,
    Settings,
    Structure,
}

/// The element a property's `.ext` suffix selects.
///
/// A sum type with a `match`, rather than the `-1`/`-2`/`>=0` integer
/// encoding an aggregate-format handler table would use for the same
/// distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    /// No `.ext` suffix was present — a scalar (non-aggregate) property.
    None,
    /// `.ALL` — the whole tuple as one array.
    All,
    /// `.BYTE` — bitfield elements packed into one unsigned (bitfield only).
    Byte,
    /// `.N` or `.a`..`.z` — a concrete element index.
    Index(u8),
}

impl Extension {
    /// The integer encoding external collaborators expect (`-1`/`-2`/`>=0`).
    pub fn as_i32(self) -> i32 {
        match self {
            Extension::None => -3,
            Extension::All => -1,
            Extension::Byte => -2,
            Extension::Index(i) => i32::from(i),
        }
    }
}

/// A 6-byte 1-Wire ROM id: family byte + 4-byte serial + CRC-8 trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RomId(pub [u8; 6]);

impl RomId {
    pub fn family(&self) -> u8 {
        self.0[0]
    }

    /// Collapses the ROM id into a 64-bit key for the presence cache.
    pub fn as_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes[..6].copy_from_slice(&self.0);
        u64::from_le_bytes(bytes)
    }

    pub fn crc_is_valid(&self) -> bool {
        crc8(&self.0) == 0
    }

    pub fn to_canonical_string(&self) -> String {
        format!(
            "{:02X}.{:02X}{:02X}{:02X}{:02X}{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// State flags carried on a [`ParsedName`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateFlags {
    pub bound_to_specific_bus: bool,
    pub uncached: bool,
    pub alarm: bool,
}

/// The central immutable handle produced by the parser and consumed by the
/// router, lock manager, aggregate engine, and dispatcher.
///
/// Construction happens once per request and it is never shared across
/// requests or mutated after construction — see `rebind`.
#[derive(Debug, Clone)]
pub struct ParsedName {
    pub path: String,
    pub namespace: Namespace,
    /// Set by `/bus.N/...`: restricts the search/bind to that one bus.
    pub adapter: Option<u32>,
    pub device: Option<&'static Device>,
    pub rom: Option<RomId>,
    pub filetype: Option<&'static FileType>,
    pub extension: Extension,
    /// `None` until the router binds this name to a physical bus.
    pub bus_nr: Option<u32>,
    pub state: StateFlags,
    /// Segments of the path beyond the namespace root, for namespaces
    /// (`system`/`statistics`/`settings`/`structure`) that don't carry a
    /// device/filetype pair.
    pub segments: Vec<String>,
}

impl ParsedName {
    /// Produces a new `ParsedName` bound to `bus_nr`. The original is left
    /// untouched — callers that already hold it keep seeing the unbound
    /// value.
    pub fn rebind(&self, bus_nr: u32) -> ParsedName {
        let mut next = self.clone();
        next.bus_nr = Some(bus_nr);
        next.state.bound_to_specific_bus = true;
        next
    }
}
