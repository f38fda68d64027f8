//! Firmware download state machine
//!
//! A device that enumerates with [`PRODUCT_ID_FIRMWARE_LOAD`](super::protocol::PRODUCT_ID_FIRMWARE_LOAD) is an
//! EZ-USB microcontroller without firmware. Loading it takes two passes:
//!
//! 1. With the CPU held in reset, the *loader* image is written. Internal RAM is written by the EZ-USB core
//!    directly, external RAM needs the loader's vendor request, so external records go first.
//! 2. The CPU is released to run the loader, which can now write the external records of the *main* image.
//!    Then the CPU is reset again, the internal records of the main image are written, and the CPU is released.
//!
//! Each step issues at most one control transfer and then waits for its completion, which re-enters
//! [`FirmwareLoader::run`]. Progress is fully described by the [`LoaderState`] and the record cursor.
//! Once started, the device re-enumerates with the running product id.

use crate::host::{Host, TransferError};
use crate::types::{DeviceAddress, SetupPacket};
use super::firmware::{Firmware, HexRecord, RecordType, Region, Stage};
use super::protocol::{ANCHOR_LOAD_EXTERNAL, ANCHOR_LOAD_INTERNAL, CPUCS_REG};
use defmt::{debug, info, trace, warn, Format};
use usb_device::{UsbDirection, control::{Recipient, Request, RequestType}};

#[derive(Copy, Clone, PartialEq, Debug, Format)]
#[repr(u8)]
pub enum LoaderState {
    /// Firmware was loaded, and the CPU started
    Done = 0,
    /// Nothing to do
    Idle = 1,
    /// Select interface 0, alternate setting 0
    SelectInterface = 2,
    /// Hold the CPU in reset, and start with the loader image
    ResetAssert = 3,
    /// External records of the loader image
    LoadExternalStage1 = 4,
    /// Reserved
    Reserved5 = 5,
    /// Internal records of the loader image
    LoadInternalStage1 = 6,
    /// Reserved
    Reserved7 = 7,
    /// Start the loader, and continue with the main image
    ResetDeassert = 8,
    /// External records of the main image (written by the loader)
    LoadExternalStage2 = 9,
    /// Reserved
    Reserved10 = 10,
    /// Hold the CPU in reset again
    ResetAssertStage2 = 11,
    /// Internal records of the main image, then start the CPU
    LoadInternalStage2 = 12,
}

enum Step {
    /// A transfer was issued (or there is nothing to do). Wait for the next trigger.
    Wait,
    /// Go on with the next state right away
    Continue,
}

pub struct FirmwareLoader<'fw> {
    firmware: Firmware<'fw>,
    state: LoaderState,
    stage: Stage,
    cursor: usize,
}

impl<'fw> FirmwareLoader<'fw> {
    pub fn new(firmware: Firmware<'fw>) -> Self {
        Self {
            firmware,
            state: LoaderState::Idle,
            stage: Stage::Loader,
            cursor: 0,
        }
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    /// Begin loading. Nothing is sent until [`run`](Self::run) is called.
    pub fn start(&mut self) {
        self.set_state(LoaderState::SelectInterface);
    }

    /// Advance the state machine until it has to wait for a control transfer to complete.
    ///
    /// If the host refuses a transfer, nothing changes and the same step is retried on the next call.
    pub fn run<H: Host>(&mut self, dev_addr: DeviceAddress, host: &mut H) -> LoaderState {
        loop {
            match self.step(dev_addr, host) {
                Ok(Step::Continue) => {}
                Ok(Step::Wait) => break,
                Err(error) => {
                    warn!("firmware loader: transfer refused in {}: {}", self.state, error);
                    break
                }
            }
        }
        self.state
    }

    fn step<H: Host>(&mut self, dev_addr: DeviceAddress, host: &mut H) -> Result<Step, TransferError> {
        match self.state {
            LoaderState::Done
            | LoaderState::Idle
            | LoaderState::Reserved5
            | LoaderState::Reserved7
            | LoaderState::Reserved10 => Ok(Step::Wait),

            LoaderState::SelectInterface => {
                host.control_out(dev_addr, set_interface(0, 0), &[])?;
                self.set_state(LoaderState::ResetAssert);
                Ok(Step::Wait)
            }

            LoaderState::ResetAssert => {
                reset_cpu(dev_addr, true, host)?;
                self.select(Stage::Loader);
                self.set_state(LoaderState::LoadExternalStage1);
                Ok(Step::Wait)
            }

            LoaderState::LoadExternalStage1 => {
                if self.download(dev_addr, Region::External, host)? {
                    return Ok(Step::Wait)
                }
                self.select(Stage::Loader);
                self.set_state(LoaderState::LoadInternalStage1);
                Ok(Step::Continue)
            }

            LoaderState::LoadInternalStage1 => {
                if self.download(dev_addr, Region::Internal, host)? {
                    return Ok(Step::Wait)
                }
                self.set_state(LoaderState::ResetDeassert);
                Ok(Step::Continue)
            }

            LoaderState::ResetDeassert => {
                reset_cpu(dev_addr, false, host)?;
                self.select(Stage::Main);
                self.set_state(LoaderState::LoadExternalStage2);
                Ok(Step::Wait)
            }

            LoaderState::LoadExternalStage2 => {
                if self.download(dev_addr, Region::External, host)? {
                    return Ok(Step::Wait)
                }
                self.set_state(LoaderState::ResetAssertStage2);
                Ok(Step::Continue)
            }

            LoaderState::ResetAssertStage2 => {
                reset_cpu(dev_addr, true, host)?;
                self.select(Stage::Main);
                self.set_state(LoaderState::LoadInternalStage2);
                Ok(Step::Wait)
            }

            LoaderState::LoadInternalStage2 => {
                if self.download(dev_addr, Region::Internal, host)? {
                    return Ok(Step::Wait)
                }
                reset_cpu(dev_addr, false, host)?;
                self.set_state(LoaderState::Done);
                info!("firmware loaded, waiting for device {} to re-enumerate", dev_addr);
                Ok(Step::Wait)
            }
        }
    }

    fn set_state(&mut self, state: LoaderState) {
        debug!("firmware loader: {} -> {}", self.state, state);
        self.state = state;
    }

    /// Rewind the cursor to the first record of the given image
    fn select(&mut self, stage: Stage) {
        self.stage = stage;
        self.cursor = 0;
    }

    /// Send the next record of the current image which targets `region`.
    ///
    /// Returns `false` once the end of the image was reached.
    fn download<H: Host>(&mut self, dev_addr: DeviceAddress, region: Region, host: &mut H) -> Result<bool, TransferError> {
        let image = self.firmware.image(self.stage);
        while let Some(record) = image.get(self.cursor) {
            if record.record_type != RecordType::Data {
                break
            }
            if record.region() == region {
                write_record(dev_addr, record, host)?;
                trace!("firmware loader: {} record {} at {:#X}", self.stage, self.cursor, record.address);
                self.cursor += 1;
                return Ok(true)
            }
            self.cursor += 1;
        }
        Ok(false)
    }
}

fn set_interface(interface: u16, alternate_setting: u16) -> SetupPacket {
    SetupPacket::new(
        UsbDirection::Out,
        RequestType::Standard,
        Recipient::Interface,
        Request::SET_INTERFACE,
        alternate_setting,
        interface,
        0,
    )
}

fn vendor_write(request: u8, address: u16, length: u16) -> SetupPacket {
    SetupPacket::new(UsbDirection::Out, RequestType::Vendor, Recipient::Device, request, address, 0, length)
}

fn reset_cpu<H: Host>(dev_addr: DeviceAddress, hold: bool, host: &mut H) -> Result<(), TransferError> {
    host.control_out(dev_addr, vendor_write(ANCHOR_LOAD_INTERNAL, CPUCS_REG, 1), &[hold as u8])
}

fn write_record<H: Host>(dev_addr: DeviceAddress, record: &HexRecord, host: &mut H) -> Result<(), TransferError> {
    let request = match record.region() {
        Region::Internal => ANCHOR_LOAD_INTERNAL,
        Region::External => ANCHOR_LOAD_EXTERNAL,
    };
    let payload = record.payload();
    host.control_out(dev_addr, vendor_write(request, record.address, payload.len() as u16), payload)
}
