use super::intellikeys::Handler;
use super::intellikeys::protocol::EEPROM_SERIAL_NUMBER_LEN;
use defmt::{bitflags, info};

/// A [`Handler`] which logs device events
pub struct LogHandler(EventMask);

bitflags! {
    /// Used to select which events are logged by the [`LogHandler`]
    ///
    /// Each of the flags corresponds to one or more of the methods in the [`Handler`] interface.
    pub struct EventMask: u8 {
        const MEMBRANE = 1 << 0;
        const SWITCH = 1 << 1;
        const SENSOR = 1 << 2;
        const VERSION = 1 << 3;
        const CONNECTION = 1 << 4;
        const POWER_SWITCH = 1 << 5;
        const SERIAL_NUMBER = 1 << 6;
    }
}

impl LogHandler {
    pub fn new(event_mask: EventMask) -> Self {
        Self(event_mask)
    }

    pub fn event_mask(&self) -> EventMask {
        self.0
    }
}

impl Handler for LogHandler {
    fn membrane_press(&mut self, x: u8, y: u8) {
        if self.0.contains(EventMask::MEMBRANE) {
            info!("[IntelliKeys LogHandler] Membrane pressed at ({}, {})", x, y);
        }
    }

    fn membrane_release(&mut self, x: u8, y: u8) {
        if self.0.contains(EventMask::MEMBRANE) {
            info!("[IntelliKeys LogHandler] Membrane released at ({}, {})", x, y);
        }
    }

    fn switch(&mut self, number: u8, state: u8) {
        if self.0.contains(EventMask::SWITCH) {
            info!("[IntelliKeys LogHandler] Switch {} changed to {}", number, state);
        }
    }

    fn sensor(&mut self, number: u8, on: bool) {
        if self.0.contains(EventMask::SENSOR) {
            info!("[IntelliKeys LogHandler] Sensor {} is {}", number, if on { "on" } else { "off" });
        }
    }

    fn version(&mut self, major: u8, minor: u8) {
        if self.0.contains(EventMask::VERSION) {
            info!("[IntelliKeys LogHandler] Firmware version {}.{}", major, minor);
        }
    }

    fn connected(&mut self) {
        if self.0.contains(EventMask::CONNECTION) {
            info!("[IntelliKeys LogHandler] Device connected");
        }
    }

    fn disconnected(&mut self) {
        if self.0.contains(EventMask::CONNECTION) {
            info!("[IntelliKeys LogHandler] Device disconnected");
        }
    }

    fn power_switch(&mut self, on: bool) {
        if self.0.contains(EventMask::POWER_SWITCH) {
            info!("[IntelliKeys LogHandler] Power switch turned {}", if on { "on" } else { "off" });
        }
    }

    fn serial_number(&mut self, serial_number: &[u8; EEPROM_SERIAL_NUMBER_LEN]) {
        if self.0.contains(EventMask::SERIAL_NUMBER) {
            info!("[IntelliKeys LogHandler] Serial number {=[u8]:a}", serial_number.as_slice());
        }
    }
}
