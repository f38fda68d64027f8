//! Decoding of inbound reports
//!
//! The first byte of every report is the event tag, the following bytes are its arguments.
//! Bytes missing from a short report read as zero.

use super::protocol::event;
use defmt::Format;

#[derive(Copy, Clone, PartialEq, Debug, Format)]
pub enum Event {
    Ack,
    MembranePress { x: u8, y: u8 },
    MembraneRelease { x: u8, y: u8 },
    Switch { number: u8, state: u8 },
    SensorChange { number: u8, value: u8 },
    Version { major: u8, minor: u8 },
    EepromRead,
    PowerSwitch { on: bool },
    NoMoreEvents,
    MembraneRepeat,
    SwitchRepeat,
    CorrectMembrane,
    CorrectSwitch,
    CorrectDone,
    /// One byte of EEPROM content, at the device-side address (offset included)
    EepromByte { value: u8, address: u8 },
    DeviceReady,
    AutopilotState,
    Delay,
    AllSensors,
    Unknown(u8),
}

impl Event {
    /// Decode a report. Returns `None` for an empty report.
    pub fn parse(report: &[u8]) -> Option<Self> {
        let (&tag, args) = report.split_first()?;
        let arg = |index: usize| args.get(index).copied().unwrap_or(0);
        Some(match tag {
            event::ACK => Event::Ack,
            event::MEMBRANE_PRESS => Event::MembranePress { x: arg(0), y: arg(1) },
            event::MEMBRANE_RELEASE => Event::MembraneRelease { x: arg(0), y: arg(1) },
            event::SWITCH => Event::Switch { number: arg(0), state: arg(1) },
            event::SENSOR_CHANGE => Event::SensorChange { number: arg(0), value: arg(1) },
            event::VERSION => Event::Version { major: arg(0), minor: arg(1) },
            event::EEPROM_READ => Event::EepromRead,
            event::ONOFFSWITCH => Event::PowerSwitch { on: arg(0) != 0 },
            event::NOMOREEVENTS => Event::NoMoreEvents,
            event::MEMBRANE_REPEAT => Event::MembraneRepeat,
            event::SWITCH_REPEAT => Event::SwitchRepeat,
            event::CORRECT_MEMBRANE => Event::CorrectMembrane,
            event::CORRECT_SWITCH => Event::CorrectSwitch,
            event::CORRECT_DONE => Event::CorrectDone,
            event::EEPROM_READBYTE => Event::EepromByte { value: arg(0), address: arg(1) },
            event::DEVICEREADY => Event::DeviceReady,
            event::AUTOPILOT_STATE => Event::AutopilotState,
            event::DELAY => Event::Delay,
            event::ALL_SENSORS => Event::AllSensors,
            other => Event::Unknown(other),
        })
    }
}
