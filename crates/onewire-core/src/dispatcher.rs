//! Entry Dispatcher: the `read`/`write`/`dir`/`presence` façade every
//! external collaborator (FTP front end, FUSE layer, the remote-bus RPC
//! server in `onewire-fsd`) calls through.
//! Parses the path, binds a bus, runs the property cache and aggregate
//! engine, and returns either a byte count or a `CoreError` the caller
//! maps onto `-errno`.

use crate::aggregate;
use crate::bus::Chain;
use crate::cache::PropertyCache;
use crate::config::CoreConfig;
use crate::device::ops::HandlerCtx;
use crate::device::ChangeClass;
use crate::error::{CoreError, CoreResult};
use crate::lock::{DeviceLocks, SimultaneousLock};
use crate::path::{self, Extension, Namespace, ParsedName};
use crate::router::{self, PresenceCache};

pub struct Core {
    pub chain: Chain,
    pub config: CoreConfig,
    presence: PresenceCache,
    properties: PropertyCache,
    device_locks: DeviceLocks,
    simultaneous: SimultaneousLock,
}

impl Core {
    pub fn new(chain: Chain, config: CoreConfig) -> Self {
        let presence = PresenceCache::new(config.presence_positive_ttl, config.presence_negative_ttl);
        let properties = PropertyCache::new(config.cache_capacity, config.cache);
        Self {
            chain,
            presence,
            properties,
            device_locks: DeviceLocks::new(),
            simultaneous: SimultaneousLock::new(),
            config,
        }
    }

    pub async fn read(&self, path: &str, size: u32, offset: u32) -> CoreResult<Vec<u8>> {
        let pn = path::parse(path)?;

        if pn.namespace != Namespace::Real {
            return self.read_virtual(&pn);
        }

        let (Some(device), Some(ft)) = (pn.device, pn.filetype) else {
            return Err(CoreError::IsDirectory);
        };

        if device.class == crate::device::DeviceClass::Pseudo {
            let connection = match pn.adapter {
                Some(bus_nr) => self.chain.get(bus_nr).ok_or(CoreError::NoDevice)?,
                None => self.chain.iter().next().ok_or(CoreError::NoDevice)?,
            };
            let ctx = HandlerCtx {
                rom: crate::path::RomId([0; 6]),
                connection,
            };
            let values = aggregate::read(ft, &ctx, pn.extension).await?;
            let rendered = render(ft, &values)?;
            return Ok(truncate(rendered.into_bytes(), size, offset));
        }

        let rom = pn.rom.ok_or_else(|| CoreError::NotFound(path.to_string()))?;
        let bus_nr = self.bind_bus(&pn, rom).await?;
        let pn = pn.rebind(bus_nr);
        let connection = self.chain.get(bus_nr).ok_or(CoreError::NoDevice)?;

        // A remote bus runs its own complete core; there is no local
        // transaction to run or cache entry to keep, so the whole request
        // is forwarded as one RPC.
        if connection.is_remote() {
            return connection.remote_adapter()?.read(path, size, offset).await;
        }

        let cache_key = cache_key(&pn, bus_nr);

        if let Some(cached) = self.properties.get(&cache_key, ft.change_class, pn.state.uncached) {
            return Ok(truncate(cached.into_bytes(), size, offset));
        }

        let rom_key = rom.as_u64();
        let _guard = crate::lock::acquire_for_read(connection, &self.device_locks, rom_key, self.config.device_lock_timeout).await?;
        let ctx = HandlerCtx { rom, connection };

        let values = aggregate::read(ft, &ctx, pn.extension).await?;
        let rendered = render(ft, &values)?;

        self.properties.put(&cache_key, rendered.clone(), ft.change_class, pn.state.uncached);

        Ok(truncate(rendered.into_bytes(), size, offset))
    }

    pub async fn write(&self, path: &str, data: &[u8], offset: u32) -> CoreResult<u32> {
        if self.config.readonly {
            return Err(CoreError::ReadOnly);
        }

        let pn = path::parse(path)?;
        if pn.namespace != Namespace::Real {
            return Err(CoreError::ReadOnly);
        }

        let (Some(device), Some(ft)) = (pn.device, pn.filetype) else {
            return Err(CoreError::IsDirectory);
        };

        if offset != 0 && !matches!(ft.format, crate::format::Format::Binary | crate::format::Format::Ascii) {
            return Err(CoreError::InvalidOffset);
        }
        if offset != 0 && matches!(pn.extension, Extension::All) && ft.format != crate::format::Format::Binary {
            return Err(CoreError::InvalidOffset);
        }

        let text = std::str::from_utf8(data).map_err(|_| CoreError::BadFormat("non-UTF8 write payload".into()))?;
        let values = parse_input(ft, pn.extension, text)?;

        // The `simultaneous` pseudo-device has no ROM id to route on: it
        // broadcasts to every bus the path restricts it to, rather than
        // being located by the presence cache/router like a real chip
        // (grounded on `ow_exec.c`'s convert-all broadcast).
        let (result, pn) = if device.class == crate::device::DeviceClass::Pseudo {
            // A broadcast spans every targeted bus at once, so there is no
            // single bus to rebind the name to; the cache key falls back to
            // the unbound sentinel below.
            let result = self.broadcast_write(&pn, ft, values.clone()).await;
            (result, pn)
        } else {
            let rom = pn.rom.ok_or_else(|| CoreError::NotFound(path.to_string()))?;
            let bus_nr = self.bind_bus(&pn, rom).await?;
            let pn = pn.rebind(bus_nr);
            let connection = self.chain.get(bus_nr).ok_or(CoreError::NoDevice)?;

            if connection.is_remote() {
                return connection.remote_adapter()?.write(path, data, offset).await;
            }

            let rom_key = rom.as_u64();
            let _guard =
                crate::lock::acquire_for_write(connection, &self.device_locks, rom_key, self.config.device_lock_timeout).await?;
            let ctx = HandlerCtx { rom, connection };
            let result = aggregate::write(ft, &ctx, pn.extension, values).await;
            (result, pn)
        };

        let cache_key = cache_key(&pn, pn.bus_nr.unwrap_or(u32::MAX));
        match result {
            Ok(()) => {
                self.properties.put(&cache_key, text.to_string(), ft.change_class, pn.state.uncached);
                Ok(data.len() as u32)
            }
            Err(e) => {
                self.properties.invalidate(&cache_key);
                Err(e)
            }
        }
    }

    /// Runs a pseudo-device write against every bus `pn.adapter` allows
    /// (one bus if `/bus.N/...`, every configured bus otherwise), taking
    /// the per-bus simultaneous lock for each so a convert-all never
    /// interleaves with an in-flight per-device transaction on that bus.
    async fn broadcast_write(&self, pn: &ParsedName, ft: &crate::device::FileType, values: aggregate::Values) -> CoreResult<()> {
        let targets: Vec<_> = match pn.adapter {
            Some(bus_nr) => self.chain.get(bus_nr).cloned().into_iter().collect(),
            None => self.chain.iter().cloned().collect(),
        };
        if targets.is_empty() {
            return Err(CoreError::NoDevice);
        }
        for connection in &targets {
            let _sim_guard = self.simultaneous.acquire(self.config.bus_lock_timeout).await?;
            let ctx = HandlerCtx {
                rom: crate::path::RomId([0; 6]),
                connection,
            };
            aggregate::write(ft, &ctx, pn.extension, values.clone()).await?;
        }
        Ok(())
    }

    pub async fn dir(&self, path: &str) -> CoreResult<Vec<String>> {
        let pn = path::parse(path)?;

        if pn.namespace != Namespace::Real {
            return Ok(virtual_namespace_children());
        }

        match (pn.device, pn.filetype) {
            (None, None) => Ok(self.root_children()),
            (Some(device), None) => Ok(device.filetypes.iter().map(|ft| ft.name.to_string()).collect()),
            (Some(_), Some(ft)) => Ok(match ft.aggregate {
                Some(agg) => (0..agg.count).map(|i| i.to_string()).collect(),
                None => Vec::new(),
            }),
            (None, Some(_)) => Err(CoreError::NotFound(path.to_string())),
        }
    }

    pub async fn presence(&self, path: &str) -> CoreResult<bool> {
        let pn = path::parse(path)?;
        let Some(rom) = pn.rom else {
            return Ok(pn.namespace != Namespace::Real || pn.device.is_some());
        };
        match self.bind_bus(&pn, rom).await {
            Ok(_) => Ok(true),
            Err(CoreError::NoDevice) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn bind_bus(&self, pn: &ParsedName, rom: crate::path::RomId) -> CoreResult<u32> {
        router::locate(&self.chain, rom, pn.adapter, &self.presence).await
    }

    fn read_virtual(&self, pn: &ParsedName) -> CoreResult<Vec<u8>> {
        match pn.namespace {
            Namespace::Structure => Ok(b"structure is read-only metadata\n".to_vec()),
            Namespace::System => {
                let mut out = String::new();
                for connection in self.chain.iter() {
                    out.push_str(&format!("bus.{}={}\n", connection.index, connection.name));
                }
                Ok(out.into_bytes())
            }
            Namespace::Statistics => Ok(format!("buses={}\n", self.chain.len()).into_bytes()),
            Namespace::Settings => Ok(format!("readonly={}\n", self.config.readonly).into_bytes()),
            Namespace::Real => unreachable!("guarded by caller"),
        }
    }

    /// Root directory listing: every configured bus plus the reserved
    /// top-level trees.
    fn root_children(&self) -> Vec<String> {
        let mut children: Vec<String> = self.chain.iter().map(|c| format!("bus.{}", c.index)).collect();
        children.extend([
            "settings".to_string(),
            "system".to_string(),
            "statistics".to_string(),
            "structure".to_string(),
            "simultaneous".to_string(),
            "alarm".to_string(),
        ]);
        children
    }
}

fn cache_key(pn: &ParsedName, bus_nr: u32) -> String {
    format!("{}#{}#{}#{}", pn.path, bus_nr, pn.extension.as_i32(), pn.state.uncached)
}

fn render(ft: &crate::device::FileType, values: &aggregate::Values) -> CoreResult<String> {
    match values {
        // The `.BYTE` view of a bitfield is always a packed unsigned, even
        // when the per-element format (what `ft.format` names) is `yesno`
        // — render it with `Format::Unsigned` rather than the element
        // format, which would reject a bare `Value::Unsigned`.
        aggregate::Values::Scalar(v @ crate::format::Value::Unsigned(_)) if ft.is_bitfield() => {
            crate::format::Format::Unsigned.render(v)
        }
        aggregate::Values::Scalar(v) => ft.format.render(v),
        aggregate::Values::Array(vs) => {
            let rendered: CoreResult<Vec<String>> = vs.iter().map(|v| ft.format.render(v)).collect();
            Ok(ft.format.join_array(&rendered?))
        }
    }
}

fn parse_input(ft: &crate::device::FileType, extension: Extension, text: &str) -> CoreResult<aggregate::Values> {
    match extension {
        Extension::All => {
            let count = ft.element_count() as usize;
            let parts = ft.format.split_array(text, count, ft.nominal_length);
            let values: CoreResult<Vec<_>> = parts.iter().map(|p| ft.format.parse(p)).collect();
            Ok(aggregate::Values::Array(values?))
        }
        Extension::Byte => {
            let n: u64 = text.trim().parse().map_err(|_| CoreError::BadFormat(text.to_string()))?;
            Ok(aggregate::Values::Scalar(crate::format::Value::Unsigned(n)))
        }
        Extension::None | Extension::Index(_) => Ok(aggregate::Values::Scalar(ft.format.parse(text)?)),
    }
}

fn truncate(mut bytes: Vec<u8>, size: u32, offset: u32) -> Vec<u8> {
    let offset = offset as usize;
    if offset >= bytes.len() {
        return Vec::new();
    }
    bytes.drain(..offset);
    bytes.truncate(size as usize);
    bytes
}

fn virtual_namespace_children() -> Vec<String> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::adapter::simulated::SimDs2890;
    use crate::bus::{AdapterKind, ConnectionIn, SimulatedAdapter};
    use crate::path::RomId;
    use std::sync::Arc;

    fn core_with_ds2890(rom: RomId) -> Core {
        let adapter = Arc::new(SimulatedAdapter::new(vec![SimDs2890::new(rom, 0, false)]));
        let connection = Arc::new(ConnectionIn::local(0, AdapterKind::Simulated, "sim0", adapter));
        Core::new(Chain::new(vec![connection]), CoreConfig::default())
    }

    #[tokio::test]
    async fn ds2890_wiper_write_then_read_round_trips() {
        let rom = RomId([0x2C, 0x01, 0x02, 0x03, 0x04, 0x05]);
        let core = core_with_ds2890(rom);
        let path = format!("/{}/wiper", rom.to_canonical_string());

        let n = core.write(&path, b"128", 0).await.unwrap();
        assert_eq!(n, 3);

        let bytes = core.read(&path, 16, 0).await.unwrap();
        assert_eq!(bytes, b"128");
    }

    #[tokio::test]
    async fn readonly_config_rejects_every_write_without_touching_the_bus() {
        let rom = RomId([0x2C, 0x01, 0x02, 0x03, 0x04, 0x05]);
        let adapter = Arc::new(SimulatedAdapter::new(vec![SimDs2890::new(rom, 0, false)]));
        let connection = Arc::new(ConnectionIn::local(0, AdapterKind::Simulated, "sim0", adapter));
        let core = Core::new(Chain::new(vec![connection]), CoreConfig::readonly());

        let path = format!("/{}/wiper", rom.to_canonical_string());
        let err = core.write(&path, b"200", 0).await.unwrap_err();
        assert!(matches!(err, CoreError::ReadOnly));
    }

    #[tokio::test]
    async fn root_listing_includes_every_configured_bus() {
        let rom = RomId([0x2C, 0x01, 0x02, 0x03, 0x04, 0x05]);
        let core = core_with_ds2890(rom);
        let children = core.dir("/").await.unwrap();
        assert!(children.contains(&"bus.0".to_string()));
        assert!(children.contains(&"simultaneous".to_string()));
    }

    #[tokio::test]
    async fn simultaneous_convert_broadcasts_without_a_rom_id() {
        let rom = RomId([0x28, 0x01, 0x02, 0x03, 0x04, 0x05]);
        let adapter = Arc::new(SimulatedAdapter::new(vec![
            crate::bus::adapter::simulated::SimThermometer::new(rom, 20.0),
        ]));
        let connection = Arc::new(ConnectionIn::local(0, AdapterKind::Simulated, "sim0", adapter));
        let core = Core::new(Chain::new(vec![connection]), CoreConfig::default());

        let n = core.write("/simultaneous/convert", b"1", 0).await.unwrap();
        assert_eq!(n, 1);
    }

    fn core_with_thermometer(rom: RomId) -> Core {
        let adapter = Arc::new(SimulatedAdapter::new(vec![
            crate::bus::adapter::simulated::SimThermometer::new(rom, 20.0),
        ]));
        let connection = Arc::new(ConnectionIn::local(0, AdapterKind::Simulated, "sim0", adapter));
        Core::new(Chain::new(vec![connection]), CoreConfig::default())
    }

    /// `temphigh.ALL` is the comma-joined read of every element.
    #[tokio::test]
    async fn temphigh_all_matches_the_freshly_written_aggregate() {
        let rom = RomId([0x28, 0x01, 0x02, 0x03, 0x04, 0x05]);
        let core = core_with_thermometer(rom);
        let path = format!("/{}/temphigh", rom.to_canonical_string());

        core.write(&format!("{path}.ALL"), b"1,2,3,4,5,6,7,8", 0).await.unwrap();
        let all = core.read(&format!("{path}.ALL"), 64, 0).await.unwrap();
        assert_eq!(all, b"1,2,3,4,5,6,7,8");
    }

    /// Writing one element of an `aggregate`-storage property and then
    /// reading `ALL` yields the previous tuple with only that position
    /// changed.
    #[tokio::test]
    async fn temphigh_single_element_write_is_read_modify_write() {
        let rom = RomId([0x28, 0x01, 0x02, 0x03, 0x04, 0x05]);
        let core = core_with_thermometer(rom);
        let path = format!("/{}/temphigh", rom.to_canonical_string());

        core.write(&format!("{path}.ALL"), b"10,20,30,40,50,60,70,80", 0).await.unwrap();
        core.write(&format!("{path}.2"), b"99", 0).await.unwrap();

        let all = core.read(&format!("{path}.ALL"), 64, 0).await.unwrap();
        assert_eq!(all, b"10,20,99,40,50,60,70,80");
    }

    /// With `readonly` set, no write should reach the bus — asserted here
    /// via a chip whose convert command would otherwise advance its staged
    /// state.
    #[tokio::test]
    async fn readonly_rejects_aggregate_writes_before_touching_the_bus() {
        let rom = RomId([0x28, 0x01, 0x02, 0x03, 0x04, 0x05]);
        let adapter = Arc::new(SimulatedAdapter::new(vec![
            crate::bus::adapter::simulated::SimThermometer::new(rom, 20.0),
        ]));
        let connection = Arc::new(ConnectionIn::local(0, AdapterKind::Simulated, "sim0", adapter));
        let core = Core::new(Chain::new(vec![connection]), CoreConfig::readonly());

        let path = format!("/{}/temphigh.ALL", rom.to_canonical_string());
        let err = core.write(&path, b"1,2,3,4,5,6,7,8", 0).await.unwrap_err();
        assert!(matches!(err, CoreError::ReadOnly));
    }

    /// A write's Property Cache entry must be keyed the same way a
    /// subsequent read looks it up — otherwise every cached write is
    /// invisible to reads and every read after a write re-hits the bus.
    #[tokio::test]
    async fn write_populates_the_cache_under_the_key_a_later_read_uses() {
        use crate::bus::adapter::simulated::SimChip;

        let rom = RomId([0x2C, 0x01, 0x02, 0x03, 0x04, 0x05]);
        let chip = SimDs2890::new(rom, 10, false);
        let adapter = Arc::new(SimulatedAdapter::new(vec![chip.clone()]));
        let connection = Arc::new(ConnectionIn::local(0, AdapterKind::Simulated, "sim0", adapter));
        let core = Core::new(Chain::new(vec![connection]), CoreConfig::default());
        let path = format!("/{}/wiper", rom.to_canonical_string());

        core.write(&path, b"128", 0).await.unwrap();

        // Mutate the chip out from under the cache: a cache miss here
        // would surface 7, not the 128 that was just written.
        chip.command(&[0x0F, 7]);

        let read_back = core.read(&path, 16, 0).await.unwrap();
        assert_eq!(read_back, b"128");
    }

    fn core_with_switch(rom: RomId) -> Core {
        let adapter = Arc::new(SimulatedAdapter::new(vec![
            crate::bus::adapter::simulated::SimSwitch::new(rom, 0),
        ]));
        let connection = Arc::new(ConnectionIn::local(0, AdapterKind::Simulated, "sim0", adapter));
        Core::new(Chain::new(vec![connection]), CoreConfig::default())
    }

    /// `pio.BYTE` equals the sum of `1 << i` over every set bit, for a
    /// bitfield property driven through the full dispatcher (not just the
    /// aggregate engine unit test in `aggregate.rs`).
    #[tokio::test]
    async fn pio_byte_view_matches_the_packed_all_view() {
        let rom = RomId([0x29, 0x10, 0x11, 0x12, 0x13, 0x14]);
        let core = core_with_switch(rom);
        let path = format!("/{}/pio", rom.to_canonical_string());

        core.write(&format!("{path}.ALL"), b"1,0,1,0,0,0,0,0", 0).await.unwrap();

        let byte = core.read(&format!("{path}.BYTE"), 16, 0).await.unwrap();
        assert_eq!(byte, b"5");

        // A per-index bitfield write is read-modify-write: flipping bit 1
        // must leave every other bit exactly as it was.
        core.write(&format!("{path}.1"), b"1", 0).await.unwrap();
        let byte_after = core.read(&format!("{path}.BYTE"), 16, 0).await.unwrap();
        assert_eq!(byte_after, b"7");
    }

    fn core_with_memory(rom: RomId) -> Core {
        let adapter = Arc::new(SimulatedAdapter::new(vec![
            crate::bus::adapter::simulated::SimMemory::new(rom, 16, 32),
        ]));
        let connection = Arc::new(ConnectionIn::local(0, AdapterKind::Simulated, "sim0", adapter));
        Core::new(Chain::new(vec![connection]), CoreConfig::default())
    }

    /// Exercised against a `separate`-storage aggregate (one wire op per
    /// page) rather than the `aggregate`-storage thermometer case above:
    /// reading `.ALL` must equal the per-element reads joined by `,`.
    #[tokio::test]
    async fn memory_all_matches_join_of_every_page_for_separate_storage() {
        let rom = RomId([0x23, 0x20, 0x21, 0x22, 0x23, 0x24]);
        let core = core_with_memory(rom);
        let path = format!("/{}/memory", rom.to_canonical_string());

        core.write(&format!("{path}.0"), b"hello", 0).await.unwrap();
        core.write(&format!("{path}.1"), b"world", 0).await.unwrap();

        let page0 = core.read(&format!("{path}.0"), 32, 0).await.unwrap();
        let page1 = core.read(&format!("{path}.1"), 32, 0).await.unwrap();
        let all = core.read(&format!("{path}.ALL"), 4096, 0).await.unwrap();

        let mut expected = page0.clone();
        expected.extend_from_slice(&page1);
        assert_eq!(all[..expected.len()], expected[..]);
    }
}
