//! Builds the inbound adapter chain this daemon serves.
//!
//! Real USB/serial/w1 enumeration is out of scope for the core: this
//! binary stands up a [`SimulatedAdapter`](onewire_core::bus::SimulatedAdapter)
//! bus populated with one instance of each built-in chip family so the
//! remote-bus protocol has something real to answer, plus (optionally) a
//! [`RemoteAdapter`](onewire_core::bus::RemoteAdapter) bus proxying another
//! `onewire-fsd` instance, grounded on `ow_w1_list.c`'s "one adapter type
//! among several" model.

use onewire_core::bus::adapter::simulated::{SimDs2890, SimMemory, SimSwitch, SimThermometer};
use onewire_core::bus::{AdapterKind, Chain, ConnectionIn, RemoteAdapter, SimulatedAdapter};
use onewire_core::path::RomId;
use std::net::SocketAddr;
use std::sync::Arc;

/// ROM ids are deterministic demo fixtures, not read from any hardware.
const DEMO_DS2890: RomId = RomId([0x2C, 0x01, 0x02, 0x03, 0x04, 0x05]);
const DEMO_THERMOMETER: RomId = RomId([0x28, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE]);
const DEMO_SWITCH: RomId = RomId([0x29, 0x10, 0x11, 0x12, 0x13, 0x14]);
const DEMO_MEMORY: RomId = RomId([0x23, 0x20, 0x21, 0x22, 0x23, 0x24]);

pub fn build_chain(remote_bus: Option<SocketAddr>) -> Chain {
    let local = Arc::new(SimulatedAdapter::new(vec![
        SimDs2890::new(DEMO_DS2890, 0, false),
        SimThermometer::new(DEMO_THERMOMETER, 21.5),
        SimSwitch::new(DEMO_SWITCH, 0),
        SimMemory::new(DEMO_MEMORY, 16, 32),
    ]));

    let mut buses = vec![Arc::new(ConnectionIn::local(0, AdapterKind::Simulated, "sim0", local))];

    if let Some(addr) = remote_bus {
        let remote = Arc::new(RemoteAdapter::new(addr));
        buses.push(Arc::new(ConnectionIn::remote(buses.len() as u32, format!("remote@{addr}"), remote)));
    }

    Chain::new(buses)
}
