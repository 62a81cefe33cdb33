//! Built-in device descriptors. Each submodule owns one family's wire
//! protocol and exposes a `const fn device() -> Device` (or, for the
//! pseudo-devices, a `name()`-keyed equivalent) that `chip_devices()`/
//! `pseudo_devices()` collect into the registries in `device::mod`.

pub mod common;
pub mod ds2890;
pub mod memory;
pub mod simultaneous;
pub mod switch;
pub mod thermometer;

use crate::device::Device;

pub fn chip_devices() -> Vec<&'static Device> {
    vec![ds2890::device(), thermometer::device(), switch::device(), memory::device()]
}

pub fn pseudo_devices() -> Vec<&'static Device> {
    vec![simultaneous::device()]
}
