//! Process-wide configuration, collected once at startup into a single
//! immutable value instead of scattered mutable globals (`readonly`,
//! `indevices`, process argv).

use crate::cache::CacheTtls;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// `write` always fails with `EROFS` and issues no transaction.
    pub readonly: bool,
    pub cache: CacheTtls,
    pub cache_capacity: usize,
    pub presence_positive_ttl: Duration,
    pub presence_negative_ttl: Duration,
    pub bus_lock_timeout: Duration,
    pub device_lock_timeout: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            readonly: false,
            cache: CacheTtls::default(),
            cache_capacity: 4096,
            presence_positive_ttl: Duration::from_secs(120),
            presence_negative_ttl: Duration::from_secs(5),
            bus_lock_timeout: Duration::from_secs(3),
            device_lock_timeout: Duration::from_secs(3),
        }
    }
}

impl CoreConfig {
    pub fn readonly() -> Self {
        Self {
            readonly: true,
            ..Self::default()
        }
    }
}
