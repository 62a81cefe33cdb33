//! An in-process adapter standing in for the USB/serial drivers that are
//! out of scope for this crate. It lets the rest of the core
//! — router, lock manager, aggregate engine, dispatcher — be exercised
//! end-to-end in tests without real 1-Wire hardware.

use super::Adapter;
use crate::error::{CoreError, CoreResult};
use crate::path::RomId;
use async_trait::async_trait;
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;

/// A chip model responding to the raw command bytes a device driver's
/// transaction program sends, after ROM addressing has already selected it.
pub trait SimChip: Send + Sync {
    fn rom(&self) -> RomId;
    /// A command byte sequence was written; update internal state and
    /// stage whatever bytes the next `respond` call should return.
    fn command(&self, bytes: &[u8]);
    /// Returns the next `len` staged response bytes.
    fn respond(&self, len: usize) -> Vec<u8>;
}

pub struct SimulatedAdapter {
    chips: Vec<std::sync::Arc<dyn SimChip>>,
    selected: Mutex<Option<RomId>>,
}

impl SimulatedAdapter {
    pub fn new(chips: Vec<std::sync::Arc<dyn SimChip>>) -> Self {
        Self {
            chips,
            selected: Mutex::new(None),
        }
    }

    fn find(&self, rom: RomId) -> Option<&std::sync::Arc<dyn SimChip>> {
        self.chips.iter().find(|c| c.rom() == rom)
    }
}

#[async_trait]
impl Adapter for SimulatedAdapter {
    async fn reset(&self) -> CoreResult<bool> {
        *self.selected.lock().await = None;
        Ok(!self.chips.is_empty())
    }

    async fn write(&self, bytes: &[u8]) -> CoreResult<()> {
        let mut selected = self.selected.lock().await;
        if selected.is_none() {
            // ROM addressing: 0x55 MATCH ROM + 6 ROM bytes (0x69 in
            // overdrive), or 0xCC SKIP ROM on a single-drop bus (0x3C in
            // overdrive).
            match bytes.first() {
                Some(0x55 | 0x69) if bytes.len() == 7 => {
                    let mut rom = [0u8; 6];
                    rom.copy_from_slice(&bytes[1..7]);
                    let rom = RomId(rom);
                    if self.find(rom).is_none() {
                        return Err(CoreError::NoDevice);
                    }
                    *selected = Some(rom);
                }
                Some(0xCC | 0x3C) => {
                    if self.chips.len() != 1 {
                        return Err(CoreError::NoDevice);
                    }
                    *selected = Some(self.chips[0].rom());
                }
                _ => return Err(CoreError::Io("no device selected on bus".into())),
            }
            return Ok(());
        }
        let rom = selected.expect("checked above");
        let chip = self.find(rom).ok_or(CoreError::NoDevice)?;
        chip.command(bytes);
        Ok(())
    }

    async fn read(&self, len: usize) -> CoreResult<Vec<u8>> {
        let selected = self.selected.lock().await;
        let rom = selected.ok_or_else(|| CoreError::Io("read with no device selected".into()))?;
        let chip = self.find(rom).ok_or(CoreError::NoDevice)?;
        Ok(chip.respond(len))
    }

    async fn duplex(&self, bytes: &[u8]) -> CoreResult<Vec<u8>> {
        self.write(bytes).await?;
        self.read(bytes.len()).await
    }

    async fn program_pulse(&self) -> CoreResult<()> {
        Err(CoreError::NotSupported)
    }

    async fn search_presence(&self, rom: RomId) -> CoreResult<bool> {
        Ok(self.find(rom).is_some())
    }
}

/// DS2890 digital potentiometer, grounded on `ow_2890.c`'s `OW_r_wiper` /
/// `OW_w_wiper` / `OW_r_cp` / `OW_w_cp`.
pub struct SimDs2890 {
    rom: RomId,
    state: StdMutex<Ds2890State>,
}

struct Ds2890State {
    wiper: u8,
    chargepump: bool,
    staged: Vec<u8>,
}

impl SimDs2890 {
    pub fn new(rom: RomId, wiper: u8, chargepump: bool) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            rom,
            state: StdMutex::new(Ds2890State {
                wiper,
                chargepump,
                staged: Vec::new(),
            }),
        })
    }
}

impl SimChip for SimDs2890 {
    fn rom(&self) -> RomId {
        self.rom
    }

    fn command(&self, bytes: &[u8]) {
        let mut s = self.state.lock().expect("chip mutex poisoned");
        match bytes.first() {
            Some(0x0F) if bytes.len() == 2 => {
                s.wiper = bytes[1];
                s.staged = vec![s.wiper];
            }
            Some(0xF0) => {
                s.staged = vec![0x00, s.wiper];
            }
            Some(0x55) if bytes.len() == 2 => {
                s.chargepump = bytes[1] == 0x4C;
                s.staged = vec![bytes[1]];
            }
            Some(0xAA) => {
                let bit = if s.chargepump { 0x40 } else { 0x00 };
                s.staged = vec![0x00, bit];
            }
            Some(0x96) => {
                s.staged.clear();
            }
            _ => {}
        }
    }

    fn respond(&self, len: usize) -> Vec<u8> {
        let mut s = self.state.lock().expect("chip mutex poisoned");
        let mut out = std::mem::take(&mut s.staged);
        out.resize(len, 0);
        out
    }
}

/// DS18B20-style thermometer: `Read(9)` returns a scratchpad whose first
/// two bytes are the signed raw temperature (1/16 °C units) and whose
/// ninth byte is the CRC-8 of the first eight.
pub struct SimThermometer {
    rom: RomId,
    raw_temp: StdMutex<i16>,
    /// Scratchpad bytes 2..10 — the `temphigh` aggregate's backing store
    /// (see `device::families::thermometer::TempHighOps`).
    thresholds: StdMutex<[u8; 8]>,
    staged: StdMutex<Vec<u8>>,
}

impl SimThermometer {
    pub fn new(rom: RomId, celsius: f64) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            rom,
            raw_temp: StdMutex::new((celsius * 16.0).round() as i16),
            thresholds: StdMutex::new([0u8; 8]),
            staged: StdMutex::new(Vec::new()),
        })
    }
}

impl SimChip for SimThermometer {
    fn rom(&self) -> RomId {
        self.rom
    }

    fn command(&self, bytes: &[u8]) {
        match bytes.first() {
            Some(0xBE) => {
                let raw = *self.raw_temp.lock().expect("chip mutex poisoned");
                let raw_bytes = raw.to_le_bytes();
                let mut scratchpad = vec![raw_bytes[0], raw_bytes[1], 0, 0, 0, 0, 0, 0];
                let crc = crate::crc::crc8(&scratchpad);
                scratchpad.push(crc);
                *self.staged.lock().expect("chip mutex poisoned") = scratchpad;
            }
            Some(0xB8) => {
                *self.staged.lock().expect("chip mutex poisoned") =
                    self.thresholds.lock().expect("chip mutex poisoned").to_vec();
            }
            Some(0x4E) if bytes.len() == 9 => {
                self.thresholds
                    .lock()
                    .expect("chip mutex poisoned")
                    .copy_from_slice(&bytes[1..9]);
                *self.staged.lock().expect("chip mutex poisoned") = vec![0xAA];
            }
            _ => {}
        }
    }

    fn respond(&self, len: usize) -> Vec<u8> {
        let mut out = std::mem::take(&mut *self.staged.lock().expect("chip mutex poisoned"));
        out.resize(len, 0);
        out
    }
}

/// DS2408-style 8-channel switch: one PIO state byte, bitfield aggregate.
pub struct SimSwitch {
    rom: RomId,
    pio: StdMutex<u8>,
    staged: StdMutex<Vec<u8>>,
}

impl SimSwitch {
    pub fn new(rom: RomId, pio: u8) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            rom,
            pio: StdMutex::new(pio),
            staged: StdMutex::new(Vec::new()),
        })
    }
}

impl SimChip for SimSwitch {
    fn rom(&self) -> RomId {
        self.rom
    }

    fn command(&self, bytes: &[u8]) {
        match bytes.first() {
            Some(0xF5) => {
                // read PIO
                *self.staged.lock().expect("chip mutex poisoned") = vec![*self.pio.lock().expect("chip mutex poisoned")];
            }
            Some(0x5A) if bytes.len() == 2 => {
                *self.pio.lock().expect("chip mutex poisoned") = bytes[1];
            }
            _ => {}
        }
    }

    fn respond(&self, len: usize) -> Vec<u8> {
        let mut out = std::mem::take(&mut *self.staged.lock().expect("chip mutex poisoned"));
        out.resize(len, 0);
        out
    }
}

/// DS2433-style EEPROM: paged memory with a CRC-16 per page read.
pub struct SimMemory {
    rom: RomId,
    pages: StdMutex<Vec<Vec<u8>>>,
    staged: StdMutex<Vec<u8>>,
}

impl SimMemory {
    pub fn new(rom: RomId, page_count: usize, page_len: usize) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            rom,
            pages: StdMutex::new(vec![vec![0u8; page_len]; page_count]),
            staged: StdMutex::new(Vec::new()),
        })
    }
}

impl SimChip for SimMemory {
    fn rom(&self) -> RomId {
        self.rom
    }

    fn command(&self, bytes: &[u8]) {
        // 0xF0 READ MEMORY <page>, 0x0F WRITE MEMORY <page> <data...>
        match bytes.first() {
            Some(0xF0) if bytes.len() == 2 => {
                let page = bytes[1] as usize;
                let pages = self.pages.lock().expect("chip mutex poisoned");
                if let Some(data) = pages.get(page) {
                    let mut out = data.clone();
                    let crc = crate::crc::crc16(&out);
                    out.extend_from_slice(&crc.to_le_bytes());
                    *self.staged.lock().expect("chip mutex poisoned") = out;
                }
            }
            Some(0x0F) if bytes.len() >= 2 => {
                let page = bytes[1] as usize;
                let data = &bytes[2..];
                let mut pages = self.pages.lock().expect("chip mutex poisoned");
                if let Some(slot) = pages.get_mut(page) {
                    let n = data.len().min(slot.len());
                    slot[..n].copy_from_slice(&data[..n]);
                    *self.staged.lock().expect("chip mutex poisoned") = vec![0xAA];
                }
            }
            _ => {}
        }
    }

    fn respond(&self, len: usize) -> Vec<u8> {
        let mut out = std::mem::take(&mut *self.staged.lock().expect("chip mutex poisoned"));
        out.resize(len, 0);
        out
    }
}
