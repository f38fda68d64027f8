use core::num::NonZeroU8;
use defmt::Format;
use usb_device::{UsbDirection, control::{Recipient, RequestType}};

/// An address that was assigned to a device by the host.
///
/// This type only represents assigned addresses, and thus cannot represent the special address 0.
/// Address 0 is only used to assign an address to the device, and should not be used by any drivers.
#[derive(Clone, Copy, PartialEq, Debug, Format)]
pub struct DeviceAddress(pub(crate) NonZeroU8);

impl DeviceAddress {
    /// Wraps an address assigned by the host stack. Returns `None` for address 0.
    pub fn new(address: u8) -> Option<Self> {
        NonZeroU8::new(address).map(DeviceAddress)
    }
}

impl From<DeviceAddress> for u16 {
    fn from(value: DeviceAddress) -> Self {
        u8::from(value.0) as u16
    }
}

impl From<DeviceAddress> for u8 {
    fn from(value: DeviceAddress) -> Self {
        u8::from(value.0)
    }
}

/// Identifies a pipe that was created by the host for one of the device's endpoints
#[derive(Clone, Copy, PartialEq, Debug, Format)]
pub struct PipeId(pub u8);

/// VendorId and ProductId from a device descriptor
#[derive(Clone, Copy, PartialEq, Debug, Format)]
pub struct VidPid {
    pub vendor: u16,
    pub product: u16,
}

impl VidPid {
    pub const fn new(vendor: u16, product: u16) -> Self {
        Self { vendor, product }
    }
}

/// The level at which the host stack offers a device to a driver
///
/// Host stacks first offer the whole device, then each of its interfaces one by one.
#[derive(Copy, Clone, PartialEq, Debug, Format)]
#[repr(u8)]
pub enum ClaimType {
    Device = 0,
    Interface = 1,
}

#[derive(Copy, Clone, PartialEq, Debug, Format)]
#[repr(u8)]
pub enum TransferType {
    Control = 0,
    Isochronous = 1,
    Bulk = 2,
    Interrupt = 3,
}

impl From<u8> for TransferType {
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0 => TransferType::Control,
            1 => TransferType::Isochronous,
            2 => TransferType::Bulk,
            _ => TransferType::Interrupt,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Debug, Format)]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupPacket {
    pub fn new(direction: UsbDirection, request_type: RequestType, recipient: Recipient, request: u8, value: u16, index: u16, length: u16) -> Self {
        Self {
            request_type: (recipient as u8) | ((request_type as u8) << 5) | (direction as u8),
            request,
            value,
            index,
            length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usb_device::control::Request;

    #[test]
    fn test_setup_packet_request_type() {
        let setup = SetupPacket::new(UsbDirection::Out, RequestType::Standard, Recipient::Interface, Request::SET_INTERFACE, 0, 0, 0);
        assert_eq!(setup.request_type, 0x01);
        assert_eq!(setup.request, 11);

        let setup = SetupPacket::new(UsbDirection::Out, RequestType::Vendor, Recipient::Device, 0xA0, 0x7F92, 0, 1);
        assert_eq!(setup.request_type, 0x40);
        assert_eq!(setup.value, 0x7F92);
        assert_eq!(setup.length, 1);
    }

    #[test]
    fn test_device_address() {
        assert!(DeviceAddress::new(0).is_none());
        assert_eq!(DeviceAddress::new(7).map(u8::from), Some(7));
    }

    #[test]
    fn test_transfer_type_from_attributes() {
        assert_eq!(TransferType::from(0x03), TransferType::Interrupt);
        assert_eq!(TransferType::from(0x02), TransferType::Bulk);
        assert_eq!(TransferType::from(0x0D), TransferType::Isochronous);
    }
}
