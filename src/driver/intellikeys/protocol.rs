//! Constants of the IntelliKeys report protocol and of the EZ-USB bootloader

use defmt::Format;

pub const VENDOR_ID: u16 = 0x095E;
/// Product id while the device waits for its firmware
pub const PRODUCT_ID_FIRMWARE_LOAD: u16 = 0x0100;
/// Product id once the firmware is running
pub const PRODUCT_ID_RUNNING: u16 = 0x0101;

/// Length of a command report
pub const REPORT_LEN: usize = 8;
/// Largest report the device exchanges on any interrupt endpoint
pub const MAX_REPORT_LEN: usize = 64;

pub const NUM_SENSORS: usize = 3;
pub const EEPROM_SERIAL_NUMBER_LEN: usize = 29;

/// Endpoint number of the command (OUT) endpoint
pub const ENDPOINT_COMMAND: u8 = 2;
/// Endpoint numbers of the IN endpoints, in channel order
pub const ENDPOINTS_EVENT: [u8; 3] = [1, 3, 4];

pub mod command {
    pub const GET_VERSION: u8 = 1;
    pub const LED: u8 = 2;
    pub const SCAN: u8 = 3;
    pub const TONE: u8 = 4;
    pub const INIT: u8 = 6;
    pub const EEPROM_READBYTE: u8 = 11;
    pub const ALL_SENSORS: u8 = 18;
}

pub mod event {
    pub const ACK: u8 = 1;
    pub const MEMBRANE_PRESS: u8 = 2;
    pub const MEMBRANE_RELEASE: u8 = 3;
    pub const SWITCH: u8 = 4;
    pub const SENSOR_CHANGE: u8 = 5;
    pub const VERSION: u8 = 6;
    pub const EEPROM_READ: u8 = 7;
    pub const ONOFFSWITCH: u8 = 8;
    pub const NOMOREEVENTS: u8 = 9;
    pub const MEMBRANE_REPEAT: u8 = 10;
    pub const SWITCH_REPEAT: u8 = 11;
    pub const CORRECT_MEMBRANE: u8 = 12;
    pub const CORRECT_SWITCH: u8 = 13;
    pub const CORRECT_DONE: u8 = 14;
    pub const EEPROM_READBYTE: u8 = 15;
    pub const DEVICEREADY: u8 = 16;
    pub const AUTOPILOT_STATE: u8 = 17;
    pub const DELAY: u8 = 18;
    pub const ALL_SENSORS: u8 = 19;
}

/// EEPROM addresses are sent with this offset added
pub const EEPROM_ADDRESS_OFFSET: u8 = 0x80;
/// Third byte of an EEPROM_READBYTE command
pub const EEPROM_READBYTE_MARKER: u8 = 0x1F;

/// EZ-USB vendor request: write to internal RAM
pub const ANCHOR_LOAD_INTERNAL: u8 = 0xA0;
/// Vendor request of the loader firmware: write to external RAM
pub const ANCHOR_LOAD_EXTERNAL: u8 = 0xA3;
/// 8051 control and status register. Bit 0 holds the CPU in reset.
pub const CPUCS_REG: u16 = 0x7F92;
/// Highest address of the microcontroller's internal RAM
pub const MAX_INTERNAL_ADDRESS: u16 = 0x1B3F;

/// LEDs on the front of the device
#[derive(Copy, Clone, PartialEq, Debug, Format)]
#[repr(u8)]
pub enum Led {
    Shift = 1,
    Alt = 2,
    CapsLock = 4,
    CtrlCmd = 5,
    Mouse = 7,
    NumLock = 8,
}
