//! Interface to the host stack
//!
//! The driver does not own the USB controller. Transfer scheduling, pipe allocation and interrupt dispatch
//! belong to a host stack, which in turn calls into the driver through the [`Driver`](crate::driver::Driver) trait.
//!
//! In order to use the driver with a given host stack, there must be a [`Host`] implementation for it.
//!
//! All of the methods return immediately. Completion of a submitted transfer is signaled later by calling the
//! matching `completed_*` method of the driver.

use crate::types::{DeviceAddress, PipeId, SetupPacket};
use defmt::Format;
use fugit::MillisDurationU32;
use usb_device::UsbDirection;

pub trait Host {
    /// Submit a control OUT transfer on the default control pipe of the given device.
    ///
    /// The host must copy `data` before returning.
    /// Once the status stage has completed, [`Driver::completed_control`](crate::driver::Driver::completed_control) must be called.
    ///
    /// Only one control transfer can be in flight per device. If another one is still pending, `WouldBlock` is returned.
    fn control_out(&mut self, dev_addr: DeviceAddress, setup: SetupPacket, data: &[u8]) -> Result<(), TransferError>;

    /// Create a pipe for an interrupt endpoint of the given device.
    ///
    /// Returns `None` if the host has run out of pipes.
    fn create_interrupt_pipe(&mut self, dev_addr: DeviceAddress, endpoint_number: u8, direction: UsbDirection, size: u16, interval: u8) -> Option<PipeId>;

    /// Release a pipe that was previously created with [`Host::create_interrupt_pipe`].
    fn release_pipe(&mut self, pipe_id: PipeId);

    /// Arm an IN pipe to receive up to `length` bytes.
    ///
    /// When data was received, [`Driver::completed_in`](crate::driver::Driver::completed_in) must be called with it.
    fn interrupt_in(&mut self, pipe_id: PipeId, length: u16) -> Result<(), TransferError>;

    /// Submit `data` on an OUT pipe.
    ///
    /// The host must copy `data` before returning.
    /// Once it was sent, [`Driver::completed_out`](crate::driver::Driver::completed_out) must be called.
    fn interrupt_out(&mut self, pipe_id: PipeId, data: &[u8]) -> Result<(), TransferError>;

    /// (Re-)start the timer for the given device.
    ///
    /// After `delay` has passed, [`Driver::timer`](crate::driver::Driver::timer) must be called once.
    /// Starting a timer that is already running replaces the previous deadline.
    fn start_timer(&mut self, dev_addr: DeviceAddress, delay: MillisDurationU32);

    /// Stop the timer for the given device, if it is running.
    fn stop_timer(&mut self, dev_addr: DeviceAddress);
}

/// Error returned when a transfer could not be submitted
#[derive(Copy, Clone, PartialEq, Debug, Format)]
pub enum TransferError {
    /// Another transfer is still in progress. Try again after it completed.
    WouldBlock,
    /// The given pipe does not exist (anymore)
    InvalidPipe,
}
