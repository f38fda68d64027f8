//! Recording [`Host`] and [`Handler`] used by the unit tests

use crate::host::{Host, TransferError};
use crate::types::{DeviceAddress, PipeId, SetupPacket};
use super::Handler;
use super::protocol::EEPROM_SERIAL_NUMBER_LEN;
use usb_device::UsbDirection;

#[derive(Default)]
pub struct MockHost {
    pub controls: Vec<(SetupPacket, Vec<u8>)>,
    pub out: Vec<(PipeId, Vec<u8>)>,
    pub armed: Vec<(PipeId, u16)>,
    pub pipes: Vec<(u8, UsbDirection)>,
    pub released: Vec<PipeId>,
    pub timers: Vec<u32>,
    pub timer_stopped: bool,
    pub refuse_control: bool,
    pub refuse_out: bool,
    pub pipe_limit: Option<usize>,
}

impl MockHost {
    pub fn pipe(&self, endpoint_number: u8, direction: UsbDirection) -> PipeId {
        let index = self.pipes.iter()
            .position(|pipe| *pipe == (endpoint_number, direction))
            .expect("no such pipe");
        PipeId(index as u8)
    }

    /// Payloads sent on the command pipe, in order
    pub fn commands(&self) -> Vec<Vec<u8>> {
        self.out.iter().map(|(_, data)| data.clone()).collect()
    }
}

impl Host for MockHost {
    fn control_out(&mut self, _dev_addr: DeviceAddress, setup: SetupPacket, data: &[u8]) -> Result<(), TransferError> {
        if self.refuse_control {
            return Err(TransferError::WouldBlock)
        }
        self.controls.push((setup, data.to_vec()));
        Ok(())
    }

    fn create_interrupt_pipe(&mut self, _dev_addr: DeviceAddress, endpoint_number: u8, direction: UsbDirection, _size: u16, _interval: u8) -> Option<PipeId> {
        if self.pipe_limit.map_or(false, |limit| self.pipes.len() >= limit) {
            return None
        }
        self.pipes.push((endpoint_number, direction));
        Some(PipeId(self.pipes.len() as u8 - 1))
    }

    fn release_pipe(&mut self, pipe_id: PipeId) {
        self.released.push(pipe_id);
    }

    fn interrupt_in(&mut self, pipe_id: PipeId, length: u16) -> Result<(), TransferError> {
        self.armed.push((pipe_id, length));
        Ok(())
    }

    fn interrupt_out(&mut self, pipe_id: PipeId, data: &[u8]) -> Result<(), TransferError> {
        if self.refuse_out {
            return Err(TransferError::WouldBlock)
        }
        self.out.push((pipe_id, data.to_vec()));
        Ok(())
    }

    fn start_timer(&mut self, _dev_addr: DeviceAddress, delay: fugit::MillisDurationU32) {
        self.timers.push(delay.to_millis());
        self.timer_stopped = false;
    }

    fn stop_timer(&mut self, _dev_addr: DeviceAddress) {
        self.timer_stopped = true;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Press(u8, u8),
    Release(u8, u8),
    Switch(u8, u8),
    Sensor(u8, bool),
    Version(u8, u8),
    Connected,
    Disconnected,
    PowerSwitch(bool),
    SerialNumber(Vec<u8>),
}

#[derive(Default)]
pub struct RecordingHandler {
    pub calls: Vec<Call>,
}

impl Handler for RecordingHandler {
    fn membrane_press(&mut self, x: u8, y: u8) {
        self.calls.push(Call::Press(x, y));
    }

    fn membrane_release(&mut self, x: u8, y: u8) {
        self.calls.push(Call::Release(x, y));
    }

    fn switch(&mut self, number: u8, state: u8) {
        self.calls.push(Call::Switch(number, state));
    }

    fn sensor(&mut self, number: u8, on: bool) {
        self.calls.push(Call::Sensor(number, on));
    }

    fn version(&mut self, major: u8, minor: u8) {
        self.calls.push(Call::Version(major, minor));
    }

    fn connected(&mut self) {
        self.calls.push(Call::Connected);
    }

    fn disconnected(&mut self) {
        self.calls.push(Call::Disconnected);
    }

    fn power_switch(&mut self, on: bool) {
        self.calls.push(Call::PowerSwitch(on));
    }

    fn serial_number(&mut self, serial_number: &[u8; EEPROM_SERIAL_NUMBER_LEN]) {
        self.calls.push(Call::SerialNumber(serial_number.to_vec()));
    }
}
