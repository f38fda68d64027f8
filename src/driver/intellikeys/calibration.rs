//! Calibration data read from the device EEPROM
//!
//! The table is read one byte at a time. Each request names an offset into the table, the answer
//! arrives as an [`Event::EepromByte`](super::event::Event::EepromByte) some time later, possibly out of order.
//! Requests are repeated for every byte that is still missing, until the table is complete.

use super::protocol::{command, EEPROM_ADDRESS_OFFSET, EEPROM_READBYTE_MARKER, EEPROM_SERIAL_NUMBER_LEN, NUM_SENSORS, REPORT_LEN};

/// Number of bytes in the calibration table
pub const TABLE_LEN: usize = EEPROM_SERIAL_NUMBER_LEN + 2 * NUM_SENSORS;

const BLACK_OFFSET: usize = EEPROM_SERIAL_NUMBER_LEN;
const WHITE_OFFSET: usize = BLACK_OFFSET + NUM_SENSORS;

/// Table layout: serial number, then the black level of each sensor, then the white level of each sensor
pub struct Calibration {
    table: [u8; TABLE_LEN],
    valid: [bool; TABLE_LEN],
    all_valid: bool,
}

impl Default for Calibration {
    fn default() -> Self {
        Self::new()
    }
}

impl Calibration {
    pub const fn new() -> Self {
        Self {
            table: [0; TABLE_LEN],
            valid: [false; TABLE_LEN],
            all_valid: false,
        }
    }

    /// Forget everything that was read so far
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Store a byte reported by the device.
    ///
    /// `address` is the device-side address, including [`EEPROM_ADDRESS_OFFSET`].
    /// Returns `false` if it lies outside of the table.
    pub fn store(&mut self, value: u8, address: u8) -> bool {
        let offset = address.wrapping_sub(EEPROM_ADDRESS_OFFSET) as usize;
        if offset >= TABLE_LEN {
            return false
        }
        self.table[offset] = value;
        self.valid[offset] = true;
        true
    }

    /// Has the table been completed (see [`complete`](Self::complete))?
    pub fn is_valid(&self) -> bool {
        self.all_valid
    }

    /// Offsets of all bytes that were not received yet
    pub fn pending(&self) -> impl Iterator<Item = usize> + '_ {
        self.valid.iter().enumerate().filter(|(_, valid)| !**valid).map(|(offset, _)| offset)
    }

    /// Mark the table as complete, if no byte is missing.
    ///
    /// Returns `true` exactly once: on the first call which finds the table complete.
    pub fn complete(&mut self) -> bool {
        if self.all_valid || self.pending().next().is_some() {
            return false
        }
        self.all_valid = true;
        true
    }

    /// Command report requesting the byte at the given table offset
    pub fn request(offset: usize) -> [u8; REPORT_LEN] {
        [command::EEPROM_READBYTE, EEPROM_ADDRESS_OFFSET + offset as u8, EEPROM_READBYTE_MARKER, 0, 0, 0, 0, 0]
    }

    pub fn serial_number(&self) -> [u8; EEPROM_SERIAL_NUMBER_LEN] {
        let mut serial_number = [0; EEPROM_SERIAL_NUMBER_LEN];
        serial_number.copy_from_slice(&self.table[..BLACK_OFFSET]);
        serial_number
    }

    /// Reading of the given sensor over a black surface
    pub fn black(&self, sensor: usize) -> Option<u8> {
        self.level(BLACK_OFFSET, sensor)
    }

    /// Reading of the given sensor over a white surface
    pub fn white(&self, sensor: usize) -> Option<u8> {
        self.level(WHITE_OFFSET, sensor)
    }

    fn level(&self, base: usize, sensor: usize) -> Option<u8> {
        if sensor < NUM_SENSORS {
            Some(self.table[base + sensor])
        } else {
            None
        }
    }
}
