//! Presence cache and bus router.
//!
//! A device id is looked up in the cache first; on a miss the router
//! fans a presence probe out across every inbound bus concurrently —
//! the first success wins, every other in-flight probe is joined and its
//! result discarded — rather than walking the chain sequentially.

use crate::bus::{Chain, ConnectionIn};
use crate::error::{CoreError, CoreResult};
use crate::path::RomId;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

#[derive(Clone, Copy)]
struct CacheEntry {
    bus_nr: Option<u32>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Keyed by 64-bit ROM id. Positive and
/// negative hits carry independent TTLs; negative is always the shorter
/// of the two so a device that reappears is not hidden for long.
pub struct PresenceCache {
    entries: DashMap<u64, CacheEntry>,
    positive_ttl: Duration,
    negative_ttl: Duration,
}

impl PresenceCache {
    pub fn new(positive_ttl: Duration, negative_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            positive_ttl,
            negative_ttl,
        }
    }

    fn lookup(&self, key: u64) -> Option<Option<u32>> {
        let entry = *self.entries.get(&key)?;
        if entry.is_expired() {
            self.entries.remove(&key);
            return None;
        }
        Some(entry.bus_nr)
    }

    fn record_positive(&self, key: u64, bus_nr: u32) {
        self.entries.insert(
            key,
            CacheEntry {
                bus_nr: Some(bus_nr),
                expires_at: Instant::now() + self.positive_ttl,
            },
        );
    }

    fn record_negative(&self, key: u64) {
        self.entries.insert(
            key,
            CacheEntry {
                bus_nr: None,
                expires_at: Instant::now() + self.negative_ttl,
            },
        );
    }

    pub fn invalidate(&self, key: u64) {
        self.entries.remove(&key);
    }
}

/// Resolves which bus `rom` lives on, consulting `cache` first and
/// falling back to a speculative concurrent probe across `chain`
/// (restricted to `restrict_bus` when the path carried a `/bus.N/`
/// prefix). Returns the bus index, or `CoreError::NoDevice`.
pub async fn locate(
    chain: &Chain,
    rom: RomId,
    restrict_bus: Option<u32>,
    cache: &PresenceCache,
) -> CoreResult<u32> {
    let key = rom.as_u64();

    if restrict_bus.is_none() {
        if let Some(hit) = cache.lookup(key) {
            return hit.ok_or(CoreError::NoDevice);
        }
    }

    let candidates: Vec<Arc<ConnectionIn>> = match restrict_bus {
        Some(bus_nr) => chain.get(bus_nr).cloned().into_iter().collect(),
        None => chain.iter().cloned().collect(),
    };

    if candidates.is_empty() {
        return Err(CoreError::NoDevice);
    }

    let mut probes = JoinSet::new();
    for connection in candidates {
        probes.spawn(async move {
            let present = connection.search_presence(rom).await.unwrap_or(false);
            (connection.index, present)
        });
    }

    // Every probe is awaited to completion, not abandoned at the first hit,
    // so the winner is the lowest bus index among every bus that answered
    // present rather than whichever future happened to resolve first.
    let mut found = None;
    while let Some(joined) = probes.join_next().await {
        if let Ok((bus_nr, true)) = joined {
            found = Some(found.map_or(bus_nr, |current: u32| current.min(bus_nr)));
        }
    }

    match found {
        Some(bus_nr) => {
            tracing::debug!(rom = %rom.to_canonical_string(), bus_nr, "presence probe resolved");
            if restrict_bus.is_none() {
                cache.record_positive(key, bus_nr);
            }
            Ok(bus_nr)
        }
        None => {
            tracing::debug!(rom = %rom.to_canonical_string(), "presence probe found no bus");
            if restrict_bus.is_none() {
                cache.record_negative(key);
            }
            Err(CoreError::NoDevice)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{AdapterKind, SimulatedAdapter};
    use std::sync::Arc;

    fn chain_with(buses: Vec<Arc<ConnectionIn>>) -> Chain {
        Chain::new(buses)
    }

    #[tokio::test]
    async fn positive_cache_hit_skips_every_bus() {
        let cache = PresenceCache::new(Duration::from_secs(5), Duration::from_millis(50));
        let rom = RomId([0x2C, 1, 2, 3, 4, 5]);
        cache.record_positive(rom.as_u64(), 7);
        let chain = chain_with(Vec::new());
        assert_eq!(locate(&chain, rom, None, &cache).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn negative_cache_hit_within_ttl_returns_no_device_without_probing() {
        let cache = PresenceCache::new(Duration::from_secs(5), Duration::from_secs(5));
        let rom = RomId([0x2C, 1, 2, 3, 4, 5]);
        cache.record_negative(rom.as_u64());
        let chain = chain_with(Vec::new());
        assert!(matches!(locate(&chain, rom, None, &cache).await, Err(CoreError::NoDevice)));
    }

    #[tokio::test]
    async fn miss_probes_every_bus_and_caches_the_winner() {
        let rom = RomId([0x2C, 1, 2, 3, 4, 5]);
        let adapter = Arc::new(SimulatedAdapter::new(vec![crate::bus::adapter::simulated::SimDs2890::new(rom, 0, false)]));
        let bus = Arc::new(ConnectionIn::local(3, AdapterKind::Simulated, "sim", adapter));
        let cache = PresenceCache::new(Duration::from_secs(5), Duration::from_secs(5));
        let chain = chain_with(vec![bus]);
        assert_eq!(locate(&chain, rom, None, &cache).await.unwrap(), 3);
        assert_eq!(cache.lookup(rom.as_u64()), Some(Some(3)));
    }

    /// When more than one bus answers present, the lowest bus index wins
    /// regardless of probe completion order.
    #[tokio::test]
    async fn tie_break_picks_the_lowest_bus_index() {
        let rom = RomId([0x2C, 1, 2, 3, 4, 5]);
        let adapter_a = Arc::new(SimulatedAdapter::new(vec![crate::bus::adapter::simulated::SimDs2890::new(rom, 0, false)]));
        let adapter_b = Arc::new(SimulatedAdapter::new(vec![crate::bus::adapter::simulated::SimDs2890::new(rom, 0, false)]));
        let bus_hi = Arc::new(ConnectionIn::local(5, AdapterKind::Simulated, "sim-hi", adapter_a));
        let bus_lo = Arc::new(ConnectionIn::local(1, AdapterKind::Simulated, "sim-lo", adapter_b));
        let cache = PresenceCache::new(Duration::from_secs(5), Duration::from_secs(5));
        // Listed high-index-first so a completion-order tie-break would be
        // likely to pick 5 instead of 1.
        let chain = chain_with(vec![bus_hi, bus_lo]);
        assert_eq!(locate(&chain, rom, None, &cache).await.unwrap(), 1);
    }
}
