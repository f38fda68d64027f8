//! Recognizing the device, and finding its endpoints

use crate::descriptor::{self, Descriptors, TYPE_ENDPOINT, TYPE_INTERFACE};
use crate::types::{ClaimType, TransferType, VidPid};
use super::protocol::{ENDPOINTS_EVENT, ENDPOINT_COMMAND, PRODUCT_ID_FIRMWARE_LOAD, PRODUCT_ID_RUNNING, VENDOR_ID};
use defmt::Format;
use usb_device::UsbDirection;

/// The two ways the device presents itself
#[derive(Copy, Clone, PartialEq, Debug, Format)]
pub enum Variant {
    /// EZ-USB core without firmware
    FirmwareLoad,
    /// Firmware is running
    Running,
}

/// Decide whether the offered device is ours. Only interface level offers are accepted.
pub fn identify(claim_type: ClaimType, ids: VidPid) -> Option<Variant> {
    if claim_type != ClaimType::Interface || ids.vendor != VENDOR_ID {
        return None
    }
    match ids.product {
        PRODUCT_ID_FIRMWARE_LOAD => Some(Variant::FirmwareLoad),
        PRODUCT_ID_RUNNING => Some(Variant::Running),
        _ => None,
    }
}

#[derive(Copy, Clone, PartialEq, Debug, Format)]
pub struct EndpointInfo {
    pub number: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

/// Endpoints of a running device
#[derive(Copy, Clone, PartialEq, Debug, Format)]
pub struct Endpoints {
    pub command: EndpointInfo,
    /// IN endpoints in channel order
    pub events: [EndpointInfo; ENDPOINTS_EVENT.len()],
}

#[derive(Copy, Clone, PartialEq, Debug, Format)]
pub enum MatchError {
    /// The buffer does not start with an interface descriptor
    NotInterface,
    /// A descriptor is shorter than 2 bytes, or extends past the end of the buffer
    Malformed,
    /// Not all four interrupt endpoints were found
    MissingEndpoint,
}

/// Length of a standard interface descriptor
const INTERFACE_DESCRIPTOR_LEN: u8 = 9;

/// Walk the descriptors of an offered interface, and pick out the command and event endpoints
pub fn endpoints(descriptors: &[u8]) -> Result<Endpoints, MatchError> {
    let mut descriptors = Descriptors::new(descriptors);
    match descriptors.next() {
        Some(Ok(desc)) if desc.descriptor_type == TYPE_INTERFACE && desc.length >= INTERFACE_DESCRIPTOR_LEN => {}
        _ => return Err(MatchError::NotInterface),
    }

    let mut command = None;
    let mut events = [None; ENDPOINTS_EVENT.len()];
    for desc in descriptors {
        let desc = desc.map_err(|_| MatchError::Malformed)?;
        if desc.descriptor_type != TYPE_ENDPOINT {
            continue
        }
        let Ok((_, endpoint)) = descriptor::parse::endpoint_descriptor(desc.data) else {
            continue
        };
        if endpoint.attributes.transfer_type() != TransferType::Interrupt {
            continue
        }
        let number = endpoint.address.number();
        let info = EndpointInfo { number, max_packet_size: endpoint.max_packet_size, interval: endpoint.interval };
        match endpoint.address.direction() {
            UsbDirection::Out if number == ENDPOINT_COMMAND => command = Some(info),
            UsbDirection::In => {
                if let Some(channel) = ENDPOINTS_EVENT.iter().position(|n| *n == number) {
                    events[channel] = Some(info);
                }
            }
            _ => {}
        }
    }

    match (command, events) {
        (Some(command), [Some(first), Some(second), Some(third)]) => Ok(Endpoints { command, events: [first, second, third] }),
        _ => Err(MatchError::MissingEndpoint),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Interface and endpoint descriptors of a running device
    pub(crate) const RUNNING: [u8; 37] = [
        9, 4, 0, 0, 4, 0xFF, 0, 0, 0,
        7, 5, 0x81, 3, 8, 0, 10,
        7, 5, 0x02, 3, 8, 0, 10,
        7, 5, 0x83, 3, 8, 0, 10,
        7, 5, 0x84, 3, 64, 0, 10,
    ];

    #[test]
    fn test_identify() {
        assert_eq!(identify(ClaimType::Interface, VidPid::new(0x095E, 0x0100)), Some(Variant::FirmwareLoad));
        assert_eq!(identify(ClaimType::Interface, VidPid::new(0x095E, 0x0101)), Some(Variant::Running));
        assert_eq!(identify(ClaimType::Device, VidPid::new(0x095E, 0x0101)), None);
        assert_eq!(identify(ClaimType::Interface, VidPid::new(0x095E, 0x0102)), None);
        assert_eq!(identify(ClaimType::Interface, VidPid::new(0x1234, 0x0101)), None);
    }

    #[test]
    fn test_endpoints() {
        let endpoints = endpoints(&RUNNING).unwrap();
        assert_eq!(endpoints.command.number, 2);
        assert_eq!(endpoints.events.map(|e| e.number), [1, 3, 4]);
        assert_eq!(endpoints.events[2].max_packet_size, 64);
        assert_eq!(endpoints.events[0].interval, 10);
    }

    #[test]
    fn test_skips_other_descriptors() {
        let mut data = [0; 43];
        data[..9].copy_from_slice(&RUNNING[..9]);
        // class specific descriptor, then a bulk endpoint
        data[9..15].copy_from_slice(&[6, 0x21, 1, 2, 3, 4]);
        data[15..].copy_from_slice(&RUNNING[9..37]);
        assert!(endpoints(&data).is_ok());

        let mut data = RUNNING;
        data[12] = 2;
        assert_eq!(endpoints(&data), Err(MatchError::MissingEndpoint));
    }

    #[test]
    fn test_missing_endpoint() {
        assert_eq!(endpoints(&RUNNING[..30]), Err(MatchError::MissingEndpoint));
        assert_eq!(endpoints(&RUNNING[..9]), Err(MatchError::MissingEndpoint));

        // OUT endpoint 1 instead of IN endpoint 1
        let mut data = RUNNING;
        data[11] = 0x01;
        assert_eq!(endpoints(&data), Err(MatchError::MissingEndpoint));
    }

    #[test]
    fn test_malformed() {
        assert_eq!(endpoints(&RUNNING[..33]), Err(MatchError::Malformed));

        let mut data = RUNNING;
        data[16] = 1;
        assert_eq!(endpoints(&data), Err(MatchError::Malformed));
    }

    #[test]
    fn test_not_interface() {
        assert_eq!(endpoints(&RUNNING[9..]), Err(MatchError::NotInterface));
        assert_eq!(endpoints(&[]), Err(MatchError::NotInterface));
        assert_eq!(endpoints(&[5, 4, 0, 0, 4]), Err(MatchError::NotInterface));

        // a truncated interface descriptor is followed by valid endpoints
        let mut data = [0; 35];
        data[..7].copy_from_slice(&[7, 4, 0, 0, 4, 0xFF, 0]);
        data[7..].copy_from_slice(&RUNNING[9..]);
        assert_eq!(endpoints(&data), Err(MatchError::NotInterface));

        // the interface class is not checked
        let mut data = RUNNING;
        data[5] = 0x03;
        assert!(endpoints(&data).is_ok());
    }
}
