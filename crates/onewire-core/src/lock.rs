//! Lock Manager: bus lock, per-device read/write
//! coordination, and the simultaneous-convert lock, acquired in a fixed
//! order so two requests can never deadlock against each other.
//!
//! Acquisition order is always: bus lock, then device lock, then (for the
//! `simultaneous` pseudo-device only) the simultaneous lock. Every guard
//! is an RAII value; a panicking handler still releases its locks on
//! unwind, and a timed-out acquisition releases whatever it already held.

use crate::bus::{ConnectionIn, lock_bus};
use crate::error::{CoreError, CoreResult};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Per-device read/write coordination, keyed by 64-bit ROM id. Readers
/// share; a single writer excludes every reader and every other writer.
#[derive(Default)]
pub struct DeviceLocks {
    locks: DashMap<u64, Arc<RwLock<()>>>,
}

impl DeviceLocks {
    pub fn new() -> Self {
        Self { locks: DashMap::new() }
    }

    fn entry(&self, key: u64) -> Arc<RwLock<()>> {
        self.locks.entry(key).or_insert_with(|| Arc::new(RwLock::new(()))).clone()
    }

    pub async fn read(&self, key: u64, timeout: Duration) -> CoreResult<OwnedRwLockReadGuard<()>> {
        let lock = self.entry(key);
        tokio::time::timeout(timeout, lock.read_owned())
            .await
            .map_err(|_| CoreError::BusBusy)
    }

    pub async fn write(&self, key: u64, timeout: Duration) -> CoreResult<OwnedRwLockWriteGuard<()>> {
        let lock = self.entry(key);
        tokio::time::timeout(timeout, lock.write_owned())
            .await
            .map_err(|_| CoreError::BusBusy)
    }
}

/// Serializes every broadcast against the `simultaneous` pseudo-device:
/// only one convert-all may be in flight, and it must not interleave
/// with a per-device transaction that assumes the bus is quiescent.
#[derive(Default)]
pub struct SimultaneousLock {
    inner: Mutex<()>,
}

impl SimultaneousLock {
    pub fn new() -> Self {
        Self { inner: Mutex::new(()) }
    }

    pub async fn acquire(&self, timeout: Duration) -> CoreResult<MutexGuard<'_, ()>> {
        tokio::time::timeout(timeout, self.inner.lock())
            .await
            .map_err(|_| CoreError::BusBusy)
    }
}

/// Acquires the bus lock, then the per-device lock, in that fixed order.
/// Dropping the returned guards releases both, bus lock last.
pub struct DeviceTransactionGuard<'a> {
    _device: OwnedRwLockWriteGuard<()>,
    _bus: MutexGuard<'a, ()>,
}

pub async fn acquire_for_write<'a>(
    connection: &'a ConnectionIn,
    device_locks: &DeviceLocks,
    rom_key: u64,
    timeout: Duration,
) -> CoreResult<DeviceTransactionGuard<'a>> {
    let bus = lock_bus(connection, timeout).await?;
    let device = device_locks.write(rom_key, timeout).await?;
    Ok(DeviceTransactionGuard { _device: device, _bus: bus })
}

pub struct DeviceReadGuard<'a> {
    _device: OwnedRwLockReadGuard<()>,
    _bus: MutexGuard<'a, ()>,
}

pub async fn acquire_for_read<'a>(
    connection: &'a ConnectionIn,
    device_locks: &DeviceLocks,
    rom_key: u64,
    timeout: Duration,
) -> CoreResult<DeviceReadGuard<'a>> {
    let bus = lock_bus(connection, timeout).await?;
    let device = device_locks.read(rom_key, timeout).await?;
    Ok(DeviceReadGuard { _device: device, _bus: bus })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{AdapterKind, SimulatedAdapter};
    use std::time::Instant;

    #[tokio::test]
    async fn bus_lock_excludes_a_second_acquisition_until_the_first_is_dropped() {
        let adapter = Arc::new(SimulatedAdapter::new(Vec::new()));
        let connection = ConnectionIn::local(0, AdapterKind::Simulated, "sim", adapter);
        let first = lock_bus(&connection, Duration::from_millis(50)).await.unwrap();

        let start = Instant::now();
        let second = lock_bus(&connection, Duration::from_millis(30)).await;
        assert!(second.is_err());
        assert!(start.elapsed() >= Duration::from_millis(25));
        drop(first);

        assert!(lock_bus(&connection, Duration::from_millis(50)).await.is_ok());
    }

    #[tokio::test]
    async fn device_write_lock_excludes_concurrent_readers() {
        let locks = DeviceLocks::new();
        let _writer = locks.write(42, Duration::from_millis(50)).await.unwrap();
        let reader = locks.read(42, Duration::from_millis(30)).await;
        assert!(reader.is_err());
    }
}
