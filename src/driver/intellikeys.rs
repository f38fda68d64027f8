//! Driver for the IntelliKeys membrane keyboard
//!
//! The device shows up in one of two forms:
//! - Without firmware ([`PRODUCT_ID_FIRMWARE_LOAD`](protocol::PRODUCT_ID_FIRMWARE_LOAD)). The driver downloads the
//!   [`Firmware`] images given to [`IntelliKeys::new`] and starts the microcontroller, after which the device
//!   detaches and comes back in its running form.
//! - Running ([`PRODUCT_ID_RUNNING`](protocol::PRODUCT_ID_RUNNING)). Commands are sent as 8 byte reports on the
//!   interrupt OUT endpoint, events arrive on three interrupt IN endpoints.
//!
//! Decoded events are passed to a [`Handler`] supplied by the application.
//!
//! ```ignore
//! struct Keys;
//! impl Handler for Keys {
//!     fn membrane_press(&mut self, x: u8, y: u8) {
//!         defmt::info!("pressed {} {}", x, y);
//!     }
//! }
//!
//! let mut keys: IntelliKeys<Keys> = IntelliKeys::new(firmware, Keys);
//! // hand `keys` to the host stack, then once per tick:
//! keys.poll(&mut host);
//! keys.set_led_state(Led::CapsLock, true, &mut host)?;
//! ```

use crate::host::Host;
use crate::types::{ClaimType, DeviceAddress, PipeId, VidPid};
use super::Driver;
use calibration::Calibration;
use event::Event;
use firmware::Firmware;
use loader::{FirmwareLoader, LoaderState};
use matcher::{Endpoints, Variant};
use protocol::{command, Led, EEPROM_SERIAL_NUMBER_LEN, ENDPOINTS_EVENT, MAX_REPORT_LEN, REPORT_LEN};
use ring::{CommandRing, RingError};
use sensor::{SensorStatus, Sensors};
use defmt::{debug, info, trace, warn, Format};
use fugit::MillisDurationU32;
use usb_device::UsbDirection;

pub mod calibration;
pub mod event;
pub mod firmware;
pub mod loader;
pub mod matcher;
pub mod protocol;
pub mod ring;
pub mod sensor;

#[cfg(test)]
pub(crate) mod mock;

/// Time between claiming a running device and requesting its sensor states and version
pub const BRING_UP_DELAY: MillisDurationU32 = MillisDurationU32::millis(500);
/// Period of the timer that paces calibration requests
pub const TICK_INTERVAL: MillisDurationU32 = MillisDurationU32::millis(250);
/// Maximum number of EEPROM requests queued per tick
pub const CALIBRATION_BATCH: usize = 10;

/// Callbacks for device events
///
/// All methods have empty default implementations, so only the interesting ones need to be implemented.
pub trait Handler {
    /// A point on the membrane was pressed
    fn membrane_press(&mut self, _x: u8, _y: u8) {}

    /// A point on the membrane was released
    fn membrane_release(&mut self, _x: u8, _y: u8) {}

    /// One of the switch jacks changed state
    fn switch(&mut self, _number: u8, _state: u8) {}

    /// One of the overlay sensors changed between "on" and "off"
    fn sensor(&mut self, _number: u8, _on: bool) {}

    /// Firmware version. Reported once after each [`IntelliKeys::request_version`].
    fn version(&mut self, _major: u8, _minor: u8) {}

    /// A running device was claimed
    fn connected(&mut self) {}

    /// The device was detached
    fn disconnected(&mut self) {}

    /// The power switch on the device was toggled
    fn power_switch(&mut self, _on: bool) {}

    /// The calibration table was read completely
    fn serial_number(&mut self, _serial_number: &[u8; EEPROM_SERIAL_NUMBER_LEN]) {}

    /// Reserved. Never called by this driver.
    fn correct_membrane(&mut self, _x: u8, _y: u8) {}

    /// Reserved. Never called by this driver.
    fn correct_switch(&mut self, _number: u8, _state: u8) {}

    /// Reserved. Never called by this driver.
    fn correct_done(&mut self) {}
}

impl Handler for () {}

#[derive(Copy, Clone, PartialEq, Debug, Format)]
pub enum ConnectionState {
    /// No device was claimed yet
    Unclaimed,
    /// A device without firmware was claimed
    BootloaderDetected,
    /// Firmware download is in progress (or finished, and the device is about to re-enumerate)
    Loading,
    /// A running device was claimed
    Running,
    /// The device went away
    Disconnected,
}

/// Error type for commands
#[derive(Copy, Clone, PartialEq, Debug, Format)]
pub enum CommandError {
    /// No running device is connected
    NotRunning,
    /// The command could not be queued
    Ring(RingError),
}

impl From<RingError> for CommandError {
    fn from(error: RingError) -> Self {
        CommandError::Ring(error)
    }
}

struct InboundChannel {
    pipe: PipeId,
    packet: [u8; MAX_REPORT_LEN],
    /// Length of the report waiting in `packet`, 0 if none
    received: u8,
}

impl InboundChannel {
    fn new(pipe: PipeId) -> Self {
        Self { pipe, packet: [0; MAX_REPORT_LEN], received: 0 }
    }

    fn arm<B: Host>(&mut self, host: &mut B) {
        self.received = 0;
        if let Err(error) = host.interrupt_in(self.pipe, MAX_REPORT_LEN as u16) {
            warn!("IntelliKeys: failed to arm pipe {}: {}", self.pipe, error);
        }
    }
}

struct Pipes {
    command: PipeId,
    channels: [InboundChannel; ENDPOINTS_EVENT.len()],
}

struct Session<'fw> {
    dev_addr: DeviceAddress,
    /// `None` while the device has no firmware
    pipes: Option<Pipes>,
    loader: FirmwareLoader<'fw>,
    calibration: Calibration,
    sensors: Sensors,
    version_seen: bool,
    bring_up_pending: bool,
    calibration_due: bool,
}

impl<'fw> Session<'fw> {
    fn new(dev_addr: DeviceAddress, pipes: Option<Pipes>, loader: FirmwareLoader<'fw>) -> Self {
        Self {
            dev_addr,
            pipes,
            loader,
            calibration: Calibration::new(),
            sensors: Sensors::new(),
            version_seen: false,
            bring_up_pending: true,
            calibration_due: false,
        }
    }
}

/// Driver for a single IntelliKeys device
///
/// `TX_CAPACITY` is the size of the outbound command queue in bytes. Each queued command takes up
/// [`REPORT_LEN`] + 1 bytes.
pub struct IntelliKeys<'fw, H: Handler, const TX_CAPACITY: usize = 135> {
    firmware: Firmware<'fw>,
    handler: H,
    state: ConnectionState,
    session: Option<Session<'fw>>,
    ring: CommandRing<TX_CAPACITY>,
    unknown_events: u32,
}

impl<'fw, H: Handler, const TX_CAPACITY: usize> IntelliKeys<'fw, H, TX_CAPACITY> {
    pub fn new(firmware: Firmware<'fw>, handler: H) -> Self {
        Self {
            firmware,
            handler,
            state: ConnectionState::Unclaimed,
            session: None,
            ring: CommandRing::new(),
            unknown_events: 0,
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    /// State of the firmware download. [`LoaderState::Idle`] if no download was started.
    pub fn loader_state(&self) -> LoaderState {
        self.session.as_ref().map_or(LoaderState::Idle, |session| session.loader.state())
    }

    /// Calibration data of the connected device
    pub fn calibration(&self) -> Option<&Calibration> {
        self.session.as_ref().map(|session| &session.calibration)
    }

    pub fn sensor_status(&self, sensor: usize) -> Option<SensorStatus> {
        self.session.as_ref()?.sensors.status(sensor)
    }

    /// Number of reports received with a tag this driver does not know
    pub fn unknown_events(&self) -> u32 {
        self.unknown_events
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Set LED `number` to `value`
    pub fn set_led<B: Host>(&mut self, number: u8, value: u8, host: &mut B) -> Result<(), CommandError> {
        self.send(&[command::LED, number, value, 0, 0, 0, 0, 0], host)
    }

    pub fn set_led_state<B: Host>(&mut self, led: Led, on: bool, host: &mut B) -> Result<(), CommandError> {
        self.set_led(led as u8, on as u8, host)
    }

    /// Play a tone. The duration has a resolution of 10ms, and is limited to 2550ms.
    pub fn play_tone<B: Host>(&mut self, freq: u8, duration_ms: u16, volume: u8, host: &mut B) -> Result<(), CommandError> {
        let duration = (duration_ms / 10).min(u8::MAX as u16) as u8;
        self.send(&[command::TONE, freq, volume, duration, 0, 0, 0, 0], host)
    }

    /// Ask for the firmware version. The answer is passed to [`Handler::version`].
    pub fn request_version<B: Host>(&mut self, host: &mut B) -> Result<(), CommandError> {
        self.send(&[command::GET_VERSION, 0, 0, 0, 0, 0, 0, 0], host)?;
        self.running_mut()?.version_seen = false;
        Ok(())
    }

    /// Ask for the state of all sensors. Every sensor is reported to [`Handler::sensor`] afterwards.
    pub fn request_all_sensors<B: Host>(&mut self, host: &mut B) -> Result<(), CommandError> {
        self.send(&[command::ALL_SENSORS, 0, 0, 0, 0, 0, 0, 0], host)?;
        self.running_mut()?.sensors.reset();
        Ok(())
    }

    fn running_mut(&mut self) -> Result<&mut Session<'fw>, CommandError> {
        self.session.as_mut().filter(|session| session.pipes.is_some()).ok_or(CommandError::NotRunning)
    }

    fn command_pipe(&self) -> Result<PipeId, CommandError> {
        self.session.as_ref()
            .and_then(|session| session.pipes.as_ref())
            .map(|pipes| pipes.command)
            .ok_or(CommandError::NotRunning)
    }

    /// Queue a command report.
    ///
    /// Never waits for space: completions are delivered through `&mut self`, so they cannot
    /// drain the queue while a command is being queued. A full queue is reported as
    /// [`RingError::Full`], and the command can be retried after the host delivered completions.
    fn send<B: Host>(&self, report: &[u8; REPORT_LEN], host: &mut B) -> Result<(), CommandError> {
        let pipe = self.command_pipe()?;
        self.ring.try_enqueue(report, pipe, host)?;
        Ok(())
    }

    /// Initialization sequence for a freshly claimed running device
    fn start<B: Host>(&mut self, host: &mut B) {
        // INIT with mode 0 selects interrupt event mode, SCAN 1 enables scanning
        for report in [[command::INIT, 0, 0, 0, 0, 0, 0, 0], [command::SCAN, 1, 0, 0, 0, 0, 0, 0]] {
            if let Err(error) = self.send(&report, host) {
                warn!("IntelliKeys: failed to queue init command: {}", error);
            }
        }
        if let Some(session) = self.session.as_mut() {
            session.calibration.clear();
        }
        self.handler.connected();
    }

    /// Take the report received on the given channel (if any), and re-arm the channel
    fn take_report<B: Host>(&mut self, channel: usize, host: &mut B) -> Option<([u8; MAX_REPORT_LEN], usize)> {
        let channel = self.session.as_mut()?.pipes.as_mut()?.channels.get_mut(channel)?;
        if channel.received == 0 {
            return None
        }
        let report = (channel.packet, channel.received as usize);
        channel.arm(host);
        Some(report)
    }

    fn dispatch<B: Host>(&mut self, report: &[u8], host: &mut B) {
        let Some(event) = Event::parse(report) else { return };
        let Some(session) = self.session.as_mut() else { return };
        trace!("IntelliKeys event {}", event);
        match event {
            Event::MembranePress { x, y } => self.handler.membrane_press(x, y),
            Event::MembraneRelease { x, y } => self.handler.membrane_release(x, y),
            Event::Switch { number, state } => self.handler.switch(number, state),
            Event::SensorChange { number, value } => {
                if let Some(on) = session.sensors.update(number as usize, value, &session.calibration) {
                    self.handler.sensor(number, on);
                }
            }
            Event::Version { major, minor } => {
                if !session.version_seen {
                    session.version_seen = true;
                    self.handler.version(major, minor);
                }
            }
            Event::EepromByte { value, address } => {
                if !session.calibration.store(value, address) {
                    warn!("IntelliKeys: EEPROM address {:#X} out of range", address);
                }
            }
            Event::PowerSwitch { on } => {
                if on {
                    if let Err(error) = self.request_all_sensors(host) {
                        warn!("IntelliKeys: failed to request sensors: {}", error);
                    }
                }
                self.handler.power_switch(on);
            }
            Event::Unknown(tag) => {
                self.unknown_events = self.unknown_events.wrapping_add(1);
                warn!("IntelliKeys: unknown event tag {}", tag);
            }
            other => debug!("IntelliKeys: ignoring {}", other),
        }
    }

    /// Request the calibration bytes that are still missing, or finish calibration if there are none
    fn calibrate<B: Host>(&mut self, host: &mut B) {
        let Some(session) = self.session.as_mut() else { return };
        let Some(pipes) = session.pipes.as_ref() else { return };
        if session.calibration.is_valid() {
            return
        }

        if session.calibration.complete() {
            info!("IntelliKeys {}: calibration complete", session.dev_addr);
            let serial_number = session.calibration.serial_number();
            if let Err(error) = self.request_all_sensors(host) {
                warn!("IntelliKeys: failed to request sensors: {}", error);
            }
            self.handler.serial_number(&serial_number);
            return
        }

        let pipe = pipes.command;
        for offset in session.calibration.pending().take(CALIBRATION_BATCH) {
            match self.ring.try_enqueue(&Calibration::request(offset), pipe, host) {
                Ok(()) => {}
                Err(RingError::Full) => break,
                Err(error) => {
                    warn!("IntelliKeys: failed to request calibration byte {}: {}", offset, error);
                    break
                }
            }
        }
    }
}

/// Create the four interrupt pipes. If one of them cannot be created, the others are released again.
fn open_pipes<B: Host>(dev_addr: DeviceAddress, endpoints: &Endpoints, host: &mut B) -> Option<Pipes> {
    let [first, second, third] = endpoints.events;
    let requests = [
        (endpoints.command, UsbDirection::Out),
        (first, UsbDirection::In),
        (second, UsbDirection::In),
        (third, UsbDirection::In),
    ];
    let mut created = [None; 4];
    for (i, &(info, direction)) in requests.iter().enumerate() {
        match host.create_interrupt_pipe(dev_addr, info.number, direction, info.max_packet_size, info.interval) {
            Some(pipe) => created[i] = Some(pipe),
            None => {
                warn!("IntelliKeys {}: failed to create pipe for endpoint {}", dev_addr, info.number);
                for pipe in created[..i].iter().flatten() {
                    host.release_pipe(*pipe);
                }
                return None
            }
        }
    }
    match created {
        [Some(command), Some(first), Some(second), Some(third)] => Some(Pipes {
            command,
            channels: [first, second, third].map(InboundChannel::new),
        }),
        _ => None,
    }
}

impl<'fw, H: Handler, B: Host, const TX_CAPACITY: usize> Driver<B> for IntelliKeys<'fw, H, TX_CAPACITY> {
    fn claim(&mut self, dev_addr: DeviceAddress, claim_type: ClaimType, ids: VidPid, descriptors: &[u8], host: &mut B) -> bool {
        let Some(variant) = matcher::identify(claim_type, ids) else { return false };
        if let Some(session) = &self.session {
            debug!("IntelliKeys: already serving device {}, not claiming {}", session.dev_addr, dev_addr);
            return false
        }

        match variant {
            Variant::FirmwareLoad => {
                let mut loader = FirmwareLoader::new(self.firmware);
                loader.start();
                self.session = Some(Session::new(dev_addr, None, loader));
                self.state = ConnectionState::BootloaderDetected;
                info!("IntelliKeys {} has no firmware yet", dev_addr);
                true
            }
            Variant::Running => {
                let endpoints = match matcher::endpoints(descriptors) {
                    Ok(endpoints) => endpoints,
                    Err(error) => {
                        debug!("IntelliKeys {}: not claiming: {}", dev_addr, error);
                        return false
                    }
                };
                let Some(mut pipes) = open_pipes(dev_addr, &endpoints, host) else { return false };

                self.ring.reset();
                for channel in pipes.channels.iter_mut() {
                    channel.arm(host);
                }
                host.start_timer(dev_addr, BRING_UP_DELAY);
                self.session = Some(Session::new(dev_addr, Some(pipes), FirmwareLoader::new(self.firmware)));
                self.state = ConnectionState::Running;
                info!("IntelliKeys {} claimed", dev_addr);
                self.start(host);
                true
            }
        }
    }

    fn detached(&mut self, dev_addr: DeviceAddress, host: &mut B) {
        if !self.session.as_ref().map_or(false, |session| session.dev_addr == dev_addr) {
            return
        }
        host.stop_timer(dev_addr);
        self.session = None;
        self.state = ConnectionState::Disconnected;
        info!("IntelliKeys {} detached", dev_addr);
        self.handler.disconnected();
    }

    fn completed_control(&mut self, dev_addr: DeviceAddress, host: &mut B) {
        let Some(session) = self.session.as_mut().filter(|session| session.dev_addr == dev_addr) else { return };
        if session.loader.state() != LoaderState::Idle {
            session.loader.run(dev_addr, host);
            self.state = ConnectionState::Loading;
        }
    }

    fn completed_in(&mut self, dev_addr: DeviceAddress, pipe_id: PipeId, data: &[u8], host: &mut B) {
        let Some(pipes) = self.session.as_mut()
            .filter(|session| session.dev_addr == dev_addr)
            .and_then(|session| session.pipes.as_mut()) else { return };
        let Some(channel) = pipes.channels.iter_mut().find(|channel| channel.pipe == pipe_id) else { return };

        if data.is_empty() || data.len() > MAX_REPORT_LEN {
            trace!("IntelliKeys: discarding {} byte report on pipe {}", data.len(), pipe_id);
            channel.arm(host);
            return
        }
        channel.packet[..data.len()].copy_from_slice(data);
        channel.received = data.len() as u8;
    }

    fn completed_out(&mut self, dev_addr: DeviceAddress, pipe_id: PipeId, host: &mut B) {
        let Some(pipes) = self.session.as_ref()
            .filter(|session| session.dev_addr == dev_addr)
            .and_then(|session| session.pipes.as_ref()) else { return };
        if pipes.command == pipe_id {
            self.ring.complete(pipe_id, host);
        }
    }

    fn timer(&mut self, dev_addr: DeviceAddress, host: &mut B) {
        let Some(session) = self.session.as_mut().filter(|session| session.dev_addr == dev_addr) else { return };
        if session.pipes.is_none() {
            return
        }

        if core::mem::take(&mut session.bring_up_pending) {
            host.start_timer(dev_addr, TICK_INTERVAL);
            for result in [self.request_all_sensors(host), self.request_version(host)] {
                if let Err(error) = result {
                    warn!("IntelliKeys: bring-up request failed: {}", error);
                }
            }
            return
        }

        if !session.calibration.is_valid() {
            session.calibration_due = true;
            host.start_timer(dev_addr, TICK_INTERVAL);
        }
    }

    fn poll(&mut self, host: &mut B) {
        let Some(session) = self.session.as_mut() else { return };
        if session.loader.state() == LoaderState::SelectInterface {
            session.loader.run(session.dev_addr, host);
            self.state = ConnectionState::Loading;
        }

        for channel in 0..ENDPOINTS_EVENT.len() {
            let Some((packet, len)) = self.take_report(channel, host) else { continue };
            if channel == 0 {
                self.dispatch(&packet[..len], host);
            } else {
                trace!("IntelliKeys: drained {} bytes on channel {}", len, channel);
            }
        }

        if self.session.as_mut().map_or(false, |session| core::mem::take(&mut session.calibration_due)) {
            self.calibrate(host);
        }

        if let Ok(pipe) = self.command_pipe() {
            self.ring.transmit(pipe, host);
        }
    }
}
