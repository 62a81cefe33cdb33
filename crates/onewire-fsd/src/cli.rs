//! Startup flags, collected into a single immutable [`onewire_core::CoreConfig`]
//! plus the handful of settings `CoreConfig` doesn't own (bind address, the
//! optional remote-bus peer) — scattered globals (`readonly`, `indevices`,
//! process argv) collapsed into one struct, carried here as this binary's
//! `clap`-derived equivalent.

use clap::Parser;
use onewire_core::CoreConfig;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "onewire-fsd", about = "Serves the 1-Wire remote-bus protocol over TCP")]
pub struct Cli {
    /// Address this daemon listens on for remote-bus RPCs.
    #[arg(long, default_value = "127.0.0.1:4304")]
    pub bind: SocketAddr,

    /// Forward every write with `EROFS` instead of touching the bus.
    #[arg(long)]
    pub readonly: bool,

    /// An upstream remote-bus peer to add as an extra adapter, demonstrating
    /// that `RemoteAdapter` is "just another adapter type".
    #[arg(long)]
    pub remote_bus: Option<SocketAddr>,

    /// Property Cache TTL for `stable`-class properties, in seconds.
    #[arg(long, default_value_t = 15)]
    pub cache_ttl_stable_secs: u64,

    /// Property Cache TTL for `volatile`-class properties, in seconds.
    #[arg(long, default_value_t = 1)]
    pub cache_ttl_volatile_secs: u64,

    /// Property Cache entry capacity before LRU eviction kicks in.
    #[arg(long, default_value_t = 4096)]
    pub cache_capacity: usize,

    /// Presence Cache TTL for a positive hit, in seconds.
    #[arg(long, default_value_t = 120)]
    pub presence_ttl_positive_secs: u64,

    /// Presence Cache TTL for a negative hit, in seconds.
    #[arg(long, default_value_t = 5)]
    pub presence_ttl_negative_secs: u64,

    /// Deadline for acquiring a bus lock, in milliseconds.
    #[arg(long, default_value_t = 3_000)]
    pub bus_lock_timeout_ms: u64,

    /// Deadline for acquiring a per-device read/write lock, in milliseconds.
    #[arg(long, default_value_t = 3_000)]
    pub device_lock_timeout_ms: u64,
}

impl Cli {
    pub fn core_config(&self) -> CoreConfig {
        CoreConfig {
            readonly: self.readonly,
            cache: onewire_core::cache::CacheTtls {
                stable: Duration::from_secs(self.cache_ttl_stable_secs),
                volatile: Duration::from_secs(self.cache_ttl_volatile_secs),
            },
            cache_capacity: self.cache_capacity,
            presence_positive_ttl: Duration::from_secs(self.presence_ttl_positive_secs),
            presence_negative_ttl: Duration::from_secs(self.presence_ttl_negative_secs),
            bus_lock_timeout: Duration::from_millis(self.bus_lock_timeout_ms),
            device_lock_timeout: Duration::from_millis(self.device_lock_timeout_ms),
        }
    }
}
