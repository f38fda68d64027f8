//! Edge detection for the optical sensors
//!
//! The device reports raw intensities. A sensor counts as "on" above the midpoint between its calibrated
//! black and white levels. Only changes of that state are passed on.

use super::calibration::Calibration;
use super::protocol::NUM_SENSORS;
use defmt::Format;

/// Threshold used until the calibration table was read
pub const DEFAULT_MIDPOINT: u8 = 150;

#[derive(Copy, Clone, PartialEq, Debug, Format)]
pub enum SensorStatus {
    Unknown,
    Off,
    On,
}

pub struct Sensors {
    status: [SensorStatus; NUM_SENSORS],
}

impl Default for Sensors {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensors {
    pub const fn new() -> Self {
        Self { status: [SensorStatus::Unknown; NUM_SENSORS] }
    }

    /// Forget the state of all sensors. The next reading of each sensor is reported.
    pub fn reset(&mut self) {
        self.status = [SensorStatus::Unknown; NUM_SENSORS];
    }

    pub fn status(&self, sensor: usize) -> Option<SensorStatus> {
        self.status.get(sensor).copied()
    }

    /// Record a new reading.
    ///
    /// Returns the new state if it differs from the previous one, `None` otherwise (or if `sensor` is out of range).
    pub fn update(&mut self, sensor: usize, value: u8, calibration: &Calibration) -> Option<bool> {
        let status = self.status.get_mut(sensor)?;
        let on = value > midpoint(sensor, calibration);
        let next = if on { SensorStatus::On } else { SensorStatus::Off };
        if *status == next {
            return None
        }
        *status = next;
        Some(on)
    }
}

/// Rounded average of the black and white levels, or [`DEFAULT_MIDPOINT`] if the table is incomplete
pub fn midpoint(sensor: usize, calibration: &Calibration) -> u8 {
    if !calibration.is_valid() {
        return DEFAULT_MIDPOINT
    }
    match (calibration.black(sensor), calibration.white(sensor)) {
        (Some(black), Some(white)) => ((black as u16 + white as u16 + 1) / 2) as u8,
        _ => DEFAULT_MIDPOINT,
    }
}
