//! Interface for implementing drivers
//!
//! Drivers are instantiated by application code and handed to the host stack, which calls the methods
//! defined in this trait at the appropriate times.
//!
//! ## Walkthrough for a newly connected device
//!
//! 1. The host stack enumerates the device and assigns an address.
//! 2. It offers the device to the driver with [`claim`](Driver::claim), first as a whole ([`ClaimType::Device`]),
//!    then once per interface ([`ClaimType::Interface`]) together with the interface descriptor and all of
//!    its nested descriptors. The driver inspects the descriptors, creates pipes for the endpoints it needs
//!    and returns `true` if it takes ownership of the device.
//! 3. From then on the host stack reports completed transfers through the `completed_*` methods,
//!    and expired timers through [`timer`](Driver::timer).
//! 4. When the device goes away, [`detached`](Driver::detached) is called. The driver must drop everything it knows
//!    about the device.
//!
//! Application code must call [`poll`](Driver::poll) regularly (once per scheduling tick). Completion callbacks
//! should do as little work as possible, the bulk of the processing happens in `poll`.
//!
//! ## Communicating with the device
//!
//! Drivers cannot initiate communication on their own, they must be given access to the [`Host`] by the caller.
//! For this purpose driver specific methods (commands) take a `&mut H` as well:
//! ```ignore
//! keys.set_led_state(Led::CapsLock, true, &mut host)?;
//! ```
use crate::host::Host;
use crate::types::{ClaimType, DeviceAddress, PipeId, VidPid};

pub mod intellikeys;
pub mod log;

/// The Driver trait
///
/// See [module-level documentation](`crate::driver`) for details.
pub trait Driver<H: Host> {
    /// The host offers a device (or one of its interfaces) to the driver.
    ///
    /// `descriptors` contains the raw descriptors belonging to what is being offered.
    ///
    /// Returns `true` if the driver took ownership.
    fn claim(&mut self, dev_addr: DeviceAddress, claim_type: ClaimType, ids: VidPid, descriptors: &[u8], host: &mut H) -> bool;

    /// The device with the given address was detached.
    ///
    /// Clean up any internal data related to the device here.
    fn detached(&mut self, dev_addr: DeviceAddress, host: &mut H);

    /// Called when a control transfer was completed
    fn completed_control(&mut self, dev_addr: DeviceAddress, host: &mut H);

    /// Called when data was received on the given IN pipe
    fn completed_in(&mut self, dev_addr: DeviceAddress, pipe_id: PipeId, data: &[u8], host: &mut H);

    /// Called when a transfer on the given OUT pipe was sent
    fn completed_out(&mut self, dev_addr: DeviceAddress, pipe_id: PipeId, host: &mut H);

    /// Called when the timer started via [`Host::start_timer`] has expired
    fn timer(&mut self, dev_addr: DeviceAddress, host: &mut H);

    /// Process pending work. Must be called regularly by application code.
    fn poll(&mut self, host: &mut H);
}
