//! Types for (standard) descriptors
//!
//! The [`parse`] submodule contains functions for parsing raw descriptors into these structures.
//!
//! All descriptors have a common framing: the first two bytes contain the descriptor **length** and **type** respectively.
//! This framing is represented by the [`Descriptor`] type.
//!
//! To turn raw descriptor data into a [`Descriptor`] use the [`parse::any_descriptor`] function.
//! When a host stack offers an interface to a driver, it hands over the interface descriptor followed by all
//! of its nested descriptors (endpoint, class specific, ...). Use [`Descriptors`] to walk such a buffer.

use crate::types::TransferType;
use usb_device::UsbDirection;
use defmt::Format;

/// [`descriptor_type`](Descriptor::descriptor_type) identifying an interface descriptor
pub const TYPE_INTERFACE: u8 = 4;
/// [`descriptor_type`](Descriptor::descriptor_type) identifying an [`EndpointDescriptor`]
pub const TYPE_ENDPOINT: u8 = 5;

/// Outer framing of a descriptor
pub struct Descriptor<'a> {
    /// Total length of the descriptor, including this length byte itself and the `descriptor_type` byte
    pub length: u8,
    /// Type of descriptor. If this is a standard descriptor, it corresponds to one of the `TYPE_*` constants,
    /// otherwise it is class or vendor specific.
    pub descriptor_type: u8,
    /// Remaining data of the descriptor (`length - 2` bytes).
    pub data: &'a [u8],
}

/// Each endpoint used for an interface has its own descriptor.
#[derive(Format)]
pub struct EndpointDescriptor {
    /// The address of the endpoint on the USB device described by this descriptor.
    pub address: EndpointAddress,

    /// This field describes the endpoint’s attributes when it is configured using the bConfigurationValue.
    pub attributes: EndpointAttributes,

    /// Maximum packet size this endpoint is capable of sending or receiving when this configuration is selected.
    pub max_packet_size: u16,

    /// Interval for polling endpoint for data transfers.
    ///
    /// Expressed in frames (1 millisecond).
    pub interval: u8,
}

#[derive(Clone, Copy, Format)]
/// Address of an endpoint
///
/// Part of an [`EndpointDescriptor`].
pub struct EndpointAddress(pub u8);

impl EndpointAddress {
    /// Endpoint number
    ///
    /// Ranges from 1 to 15.
    pub fn number(&self) -> u8 {
        self.0 & 0x0F
    }

    /// Direction of the endpoint
    pub fn direction(&self) -> UsbDirection {
        self.0.into()
    }
}

#[derive(Clone, Copy, Format)]
/// Attributes of an endpoint
///
/// Part of an [`EndpointDescriptor`].
pub struct EndpointAttributes(pub u8);

impl EndpointAttributes {
    pub fn transfer_type(&self) -> TransferType {
        self.0.into()
    }
}

/// Iterator over a buffer of concatenated descriptors
///
/// Yields `Err(())` once (and then stops) if a descriptor is shorter than its own framing
/// or claims to extend past the end of the buffer.
pub struct Descriptors<'a> {
    remaining: &'a [u8],
    failed: bool,
}

impl<'a> Descriptors<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { remaining: data, failed: false }
    }
}

impl<'a> Iterator for Descriptors<'a> {
    type Item = Result<Descriptor<'a>, ()>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining.is_empty() {
            return None
        }
        match parse::any_descriptor(self.remaining) {
            Ok((rest, descriptor)) => {
                self.remaining = rest;
                Some(Ok(descriptor))
            }
            Err(_) => {
                self.failed = true;
                Some(Err(()))
            }
        }
    }
}

pub mod parse {
    use nom::IResult;
    use nom::combinator::{map, verify};
    use nom::sequence::tuple;
    use nom::bytes::streaming::take;
    use nom::number::streaming::{u8, le_u16};

    use super::*;

    /// Parse outer framing of a descriptor
    ///
    /// The resulting `data` within the descriptor can then be parsed with one of the other functions below,
    /// depending on the `type`.
    pub fn any_descriptor(input: &[u8]) -> IResult<&[u8], Descriptor<'_>> {
        let (input, (length, descriptor_type)) = tuple((verify(u8, |length: &u8| *length >= 2), u8))(input)?;
        let (input, data) = take((length - 2) as usize)(input)?;
        Ok((input, Descriptor { length, descriptor_type, data }))
    }

    /// Parse descriptor data for an endpoint
    pub fn endpoint_descriptor(input: &[u8]) -> IResult<&[u8], EndpointDescriptor> {
        map(
            tuple((u8, u8, le_u16, u8)),
            |(address, attributes, max_packet_size, interval)| {
                EndpointDescriptor {
                    address: EndpointAddress(address),
                    attributes: EndpointAttributes(attributes),
                    max_packet_size,
                    interval,
                }
            }
        )(input)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_any_descriptor() {
            let data = [8, 7, 6, 5, 4, 3, 2, 1, 0];
            let (rest, desc) = any_descriptor(&data).unwrap();
            assert_eq!(desc.length, 8);
            assert_eq!(desc.descriptor_type, 7);
            assert_eq!(desc.data, &[6, 5, 4, 3, 2, 1]);
            assert_eq!(rest, &[0]);
        }

        #[test]
        fn test_any_descriptor_rejects_short_length() {
            assert!(any_descriptor(&[0, 5, 1, 2]).is_err());
            assert!(any_descriptor(&[1, 5, 1, 2]).is_err());
        }

        #[test]
        fn test_any_descriptor_truncated() {
            assert!(any_descriptor(&[7, 5, 0x81, 3]).is_err());
        }

        #[test]
        fn test_endpoint_descriptor() {
            let (_, endpoint) = endpoint_descriptor(&[0x83, 0x03, 0x40, 0x00, 0x0A]).unwrap();
            assert_eq!(endpoint.address.number(), 3);
            assert_eq!(endpoint.address.direction(), UsbDirection::In);
            assert_eq!(endpoint.attributes.transfer_type(), TransferType::Interrupt);
            assert_eq!(endpoint.max_packet_size, 64);
            assert_eq!(endpoint.interval, 10);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptors_iterator() {
        let data = [9, 4, 0, 0, 2, 0xFF, 0, 0, 0, 7, 5, 0x81, 3, 8, 0, 10];
        let mut descriptors = Descriptors::new(&data);
        assert_eq!(descriptors.next().unwrap().unwrap().descriptor_type, TYPE_INTERFACE);
        let endpoint = descriptors.next().unwrap().unwrap();
        assert_eq!(endpoint.descriptor_type, TYPE_ENDPOINT);
        assert_eq!(endpoint.data.len(), 5);
        assert!(descriptors.next().is_none());
    }

    #[test]
    fn test_descriptors_iterator_stops_on_overrun() {
        let data = [9, 4, 0, 0, 2, 0xFF, 0, 0, 0, 9, 5, 0x81, 3];
        let mut descriptors = Descriptors::new(&data);
        assert!(descriptors.next().unwrap().is_ok());
        assert!(descriptors.next().unwrap().is_err());
        assert!(descriptors.next().is_none());
    }
}
