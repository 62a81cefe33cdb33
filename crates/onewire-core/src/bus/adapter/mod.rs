//! Driver interface each physical adapter type implements.

pub mod remote;
pub mod simulated;

pub use remote::RemoteAdapter;
pub use simulated::SimulatedAdapter;

use crate::error::CoreResult;
use crate::path::RomId;
use async_trait::async_trait;

/// Thin driver interface executed by the transaction interpreter
/// (`crate::bus::transaction`). DS9490 USB and passive-serial adapters
/// implement this against their own transport; [`RemoteAdapter`] does not
/// — a remote bus answers whole `read`/`write`/`presence` calls as one RPC
/// rather than individual wire steps, so it never runs the local
/// transaction DSL at all (see `ConnectionIn::is_remote`).
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Resets the bus and returns whether a presence pulse was observed.
    async fn reset(&self) -> CoreResult<bool>;

    async fn write(&self, bytes: &[u8]) -> CoreResult<()>;

    async fn read(&self, len: usize) -> CoreResult<Vec<u8>>;

    /// Duplex transfer: send and receive the same number of bytes.
    async fn duplex(&self, bytes: &[u8]) -> CoreResult<Vec<u8>>;

    fn supports_program_pulse(&self) -> bool {
        false
    }

    async fn program_pulse(&self) -> CoreResult<()>;

    /// A narrow `ROM-MATCH` presence probe, used by the router's
    /// speculative fan-out instead of a full search.
    async fn search_presence(&self, rom: RomId) -> CoreResult<bool>;
}
