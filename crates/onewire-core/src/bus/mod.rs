//! Bus/adapter data model (`ConnectionIn`) and the framed,
//! retried transaction entry point device drivers call through.

pub mod adapter;
pub mod transaction;

pub use adapter::{Adapter, RemoteAdapter, SimulatedAdapter};
pub use transaction::{TransactionOutcome, TransactionStep};

use crate::error::{CoreError, CoreResult};
use crate::path::RomId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_retry::strategy::{ExponentialBackoff, jitter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    UsbDs9490,
    Serial,
    W1,
    Remote,
    Simulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverdriveSpeed {
    Regular,
    Flexible,
    Overdrive,
}

/// One physical bus. Created at startup, destroyed at shutdown, never
/// removed mid-operation.
pub struct ConnectionIn {
    pub index: u32,
    pub kind: AdapterKind,
    pub name: String,
    pub transport: Transport,
    pub lock: Mutex<()>,
    pub ds2404_compliance: bool,
    pub overdrive: OverdriveSpeed,
}

pub enum Transport {
    Local(Arc<dyn Adapter>),
    Remote(Arc<RemoteAdapter>),
}

impl ConnectionIn {
    pub fn local(index: u32, kind: AdapterKind, name: impl Into<String>, adapter: Arc<dyn Adapter>) -> Self {
        Self {
            index,
            kind,
            name: name.into(),
            transport: Transport::Local(adapter),
            lock: Mutex::new(()),
            ds2404_compliance: false,
            overdrive: OverdriveSpeed::Regular,
        }
    }

    pub fn remote(index: u32, name: impl Into<String>, adapter: Arc<RemoteAdapter>) -> Self {
        Self {
            index,
            kind: AdapterKind::Remote,
            name: name.into(),
            transport: Transport::Remote(adapter),
            lock: Mutex::new(()),
            ds2404_compliance: false,
            overdrive: OverdriveSpeed::Regular,
        }
    }

    /// Per-bus overdrive speed, set by the collaborator layer's
    /// `overdrive` startup option.
    pub fn with_overdrive(mut self, overdrive: OverdriveSpeed) -> Self {
        self.overdrive = overdrive;
        self
    }

    /// Enables the DS2404 extra inter-byte delay, set by the
    /// collaborator layer's `ds2404_compliance` startup option.
    pub fn with_ds2404_compliance(mut self, compliance: bool) -> Self {
        self.ds2404_compliance = compliance;
        self
    }

    pub fn local_adapter(&self) -> CoreResult<&dyn Adapter> {
        match &self.transport {
            Transport::Local(a) => Ok(a.as_ref()),
            Transport::Remote(_) => Err(CoreError::NotSupported),
        }
    }

    pub fn remote_adapter(&self) -> CoreResult<&RemoteAdapter> {
        match &self.transport {
            Transport::Remote(r) => Ok(r.as_ref()),
            Transport::Local(_) => Err(CoreError::NotSupported),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.transport, Transport::Remote(_))
    }

    /// Presence probe that works for either transport: a local adapter runs
    /// its own `search_presence` wire pulse, a remote bus asks its peer's
    /// core via one `Present` RPC keyed by the ROM id's canonical path.
    pub async fn search_presence(&self, rom: RomId) -> CoreResult<bool> {
        match &self.transport {
            Transport::Local(a) => a.search_presence(rom).await,
            Transport::Remote(r) => r.presence(&format!("/{}", rom.to_canonical_string())).await,
        }
    }
}

/// The inbound chain: every configured bus, in registration order. The
/// core reads this only; the outbound (listening-socket) chain belongs to
/// the collaborator layer.
#[derive(Default)]
pub struct Chain {
    buses: Vec<Arc<ConnectionIn>>,
}

impl Chain {
    pub fn new(buses: Vec<Arc<ConnectionIn>>) -> Self {
        Self { buses }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ConnectionIn>> {
        self.buses.iter()
    }

    pub fn len(&self) -> usize {
        self.buses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&Arc<ConnectionIn>> {
        self.buses.iter().find(|b| b.index == index)
    }
}

/// Wraps a device's raw command steps with ROM addressing (`MATCH ROM` if
/// more than one chip may share the bus) and runs the framed program with
/// up to 3 attempts on transient errors. `not-supported` and `no-device`
/// are never retried.
pub async fn run_device_transaction(
    connection: &ConnectionIn,
    rom: RomId,
    device_steps: Vec<TransactionStep>,
) -> CoreResult<TransactionOutcome> {
    let adapter = connection.local_adapter()?;

    // In overdrive mode the ROM command byte is rewritten from the
    // regular-speed MATCH ROM (0x55) to the overdrive MATCH ROM (0x69);
    // the device itself only responds to the matching speed.
    let match_rom_cmd = match connection.overdrive {
        OverdriveSpeed::Overdrive => 0x69,
        OverdriveSpeed::Regular | OverdriveSpeed::Flexible => 0x55,
    };

    let mut program = Vec::with_capacity(device_steps.len() + 3);
    program.push(TransactionStep::StartCheckPresence);
    program.push(TransactionStep::Match({
        let mut bytes = vec![match_rom_cmd];
        bytes.extend_from_slice(&rom.0);
        bytes
    }));
    program.extend(device_steps);
    program.push(TransactionStep::End);

    // Up to 3 attempts total on transient errors; `RetryIf`'s condition
    // keeps fatal errors (`not-supported`, `no-device`, ...) from being
    // retried at all.
    let strategy = ExponentialBackoff::from_millis(5).map(jitter).take(2);
    let ds2404_compliance = connection.ds2404_compliance;
    tokio_retry::RetryIf::spawn(
        strategy,
        || {
            let program = program.clone();
            async move { transaction::run_with_compliance_delay(adapter, &program, ds2404_compliance).await }
        },
        |e: &CoreError| {
            let retry = e.is_retryable();
            if retry {
                tracing::debug!(bus = connection.index, error = %e, "retrying transient transaction error");
            }
            retry
        },
    )
    .await
}

/// Broadcasts a command to every device on the bus via `SKIP ROM` rather
/// than addressing one ROM id — the `simultaneous` pseudo-device's only
/// mode of operation, mirroring a convert-all broadcast.
pub async fn run_broadcast_transaction(
    connection: &ConnectionIn,
    steps: Vec<TransactionStep>,
) -> CoreResult<TransactionOutcome> {
    let adapter = connection.local_adapter()?;

    // SKIP ROM (0xCC) becomes the overdrive SKIP ROM (0x3C) under the
    // same per-bus speed rewrite `run_device_transaction` applies to
    // MATCH ROM.
    let skip_rom_cmd = match connection.overdrive {
        OverdriveSpeed::Overdrive => 0x3C,
        OverdriveSpeed::Regular | OverdriveSpeed::Flexible => 0xCC,
    };

    let mut program = Vec::with_capacity(steps.len() + 2);
    program.push(TransactionStep::Start);
    program.push(TransactionStep::Match(vec![skip_rom_cmd]));
    program.extend(steps);
    program.push(TransactionStep::End);

    transaction::run_with_compliance_delay(adapter, &program, connection.ds2404_compliance).await
}

/// Acquires the bus lock with the configured deadline, or fails with
/// `bus-busy`. The router treats this as a per-bus failure, not a
/// global one.
pub async fn lock_bus(
    connection: &ConnectionIn,
    timeout: Duration,
) -> CoreResult<tokio::sync::MutexGuard<'_, ()>> {
    tokio::time::timeout(timeout, connection.lock.lock()).await.map_err(|_| {
        tracing::warn!(bus = connection.index, "bus lock not acquired within deadline");
        CoreError::BusBusy
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::adapter::simulated::SimDs2890;
    use crate::path::RomId;

    #[tokio::test]
    async fn overdrive_bus_rewrites_match_rom_to_the_overdrive_command() {
        let rom = RomId([0x2C, 1, 2, 3, 4, 5]);
        let adapter = Arc::new(SimulatedAdapter::new(vec![SimDs2890::new(rom, 0, false)]));
        let connection =
            ConnectionIn::local(0, AdapterKind::Simulated, "sim0", adapter).with_overdrive(OverdriveSpeed::Overdrive);

        let outcome = run_device_transaction(&connection, rom, vec![TransactionStep::Match(vec![0xAA]), TransactionStep::Read(2)])
            .await
            .unwrap();
        assert_eq!(outcome.reads.len(), 2);
    }

    #[tokio::test]
    async fn ds2404_compliance_adds_inter_byte_delay() {
        let rom = RomId([0x2C, 1, 2, 3, 4, 5]);
        let adapter = Arc::new(SimulatedAdapter::new(vec![SimDs2890::new(rom, 0, false)]));
        let connection = ConnectionIn::local(0, AdapterKind::Simulated, "sim0", adapter).with_ds2404_compliance(true);

        let start = std::time::Instant::now();
        run_device_transaction(&connection, rom, vec![TransactionStep::Match(vec![0xAA]), TransactionStep::Read(2)])
            .await
            .unwrap();
        // StartCheckPresence, Match(rom), Match(0xAA), Read(2): 3 steps
        // that put bytes on the wire, each followed by the 2ms delay.
        assert!(start.elapsed() >= Duration::from_millis(6));
    }
}
