//! Firmware images for the EZ-USB microcontroller
//!
//! An image is a list of Intel-HEX records, terminated by an end-of-file record. Records are either
//! supplied as constant tables (built with [`HexRecord::data`] and [`HexRecord::END`]), or parsed once
//! at startup from Intel-HEX text with [`parse_hex`].

use super::protocol::MAX_INTERNAL_ADDRESS;
use defmt::{warn, Format};

/// Maximum number of data bytes in a single record
pub const MAX_RECORD_LEN: usize = 16;

#[derive(Copy, Clone, PartialEq, Debug, Format)]
#[repr(u8)]
pub enum RecordType {
    Data = 0,
    EndOfFile = 1,
}

/// Memory area of the microcontroller targeted by a record
#[derive(Copy, Clone, PartialEq, Debug, Format)]
pub enum Region {
    /// On-chip RAM, written by the EZ-USB core itself (even while the CPU is held in reset)
    Internal,
    /// Off-chip RAM, only writable while the loader firmware is running
    External,
}

#[derive(Copy, Clone, PartialEq, Debug, Format)]
pub struct HexRecord {
    pub length: u8,
    pub address: u16,
    pub record_type: RecordType,
    pub data: [u8; MAX_RECORD_LEN],
}

impl HexRecord {
    /// Terminates an image
    pub const END: HexRecord = HexRecord {
        length: 0,
        address: 0,
        record_type: RecordType::EndOfFile,
        data: [0; MAX_RECORD_LEN],
    };

    /// Build a data record at compile time
    ///
    /// Fails to compile (or panics) if `bytes` is longer than [`MAX_RECORD_LEN`].
    pub const fn data(address: u16, bytes: &[u8]) -> Self {
        assert!(bytes.len() <= MAX_RECORD_LEN);
        let mut data = [0; MAX_RECORD_LEN];
        let mut i = 0;
        while i < bytes.len() {
            data[i] = bytes[i];
            i += 1;
        }
        HexRecord {
            length: bytes.len() as u8,
            address,
            record_type: RecordType::Data,
            data,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..(self.length as usize).min(MAX_RECORD_LEN)]
    }

    pub fn region(&self) -> Region {
        if self.address <= MAX_INTERNAL_ADDRESS {
            Region::Internal
        } else {
            Region::External
        }
    }
}

/// The two images loaded into the device
///
/// `loader` runs first and provides the vendor request used to write external RAM.
/// `main` is the actual device firmware.
#[derive(Copy, Clone)]
pub struct Firmware<'fw> {
    pub loader: &'fw [HexRecord],
    pub main: &'fw [HexRecord],
}

/// Selects one of the two images of a [`Firmware`]
#[derive(Copy, Clone, PartialEq, Debug, Format)]
pub enum Stage {
    Loader,
    Main,
}

impl<'fw> Firmware<'fw> {
    pub fn image(&self, stage: Stage) -> &'fw [HexRecord] {
        match stage {
            Stage::Loader => self.loader,
            Stage::Main => self.main,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Debug, Format)]
pub enum HexError {
    /// Line is not of the form `:LLAAAATT<data>CC`
    Syntax,
    /// Record checksum does not match
    Checksum,
    /// Record carries more than [`MAX_RECORD_LEN`] bytes
    RecordTooLong,
    /// Record type other than data or end-of-file
    UnsupportedType(u8),
    /// The output table is too small
    TooManyRecords,
    /// Text ended without an end-of-file record
    MissingEnd,
}

pub mod parse {
    use nom::IResult;
    use nom::bytes::complete::take_while_m_n;
    use nom::character::complete::char;
    use nom::combinator::map_res;
    use nom::multi::fill;
    use nom::sequence::tuple;

    use super::*;

    /// Two hexadecimal digits
    pub fn hex_byte(input: &str) -> IResult<&str, u8> {
        map_res(
            take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()),
            |digits: &str| u8::from_str_radix(digits, 16),
        )(input)
    }

    /// Start code, byte count, address and record type
    pub fn header(input: &str) -> IResult<&str, (u8, u16, u8)> {
        let (input, _) = char(':')(input)?;
        let (input, (length, address_high, address_low, record_type)) =
            tuple((hex_byte, hex_byte, hex_byte, hex_byte))(input)?;
        Ok((input, (length, u16::from_be_bytes([address_high, address_low]), record_type)))
    }

    /// Parse a single line of Intel-HEX text
    pub fn record(line: &str) -> Result<HexRecord, HexError> {
        let (rest, (length, address, record_type)) = header(line.trim_end()).map_err(|_| HexError::Syntax)?;
        if length as usize > MAX_RECORD_LEN {
            return Err(HexError::RecordTooLong)
        }
        let mut data = [0; MAX_RECORD_LEN];
        let (rest, ()) = fill(hex_byte, &mut data[..length as usize])(rest).map_err(|_| HexError::Syntax)?;
        let (rest, checksum) = hex_byte(rest).map_err(|_| HexError::Syntax)?;
        if !rest.is_empty() {
            return Err(HexError::Syntax)
        }

        let [address_high, address_low] = address.to_be_bytes();
        let sum = [length, address_high, address_low, record_type, checksum]
            .iter()
            .chain(&data[..length as usize])
            .fold(0u8, |sum, byte| sum.wrapping_add(*byte));
        if sum != 0 {
            return Err(HexError::Checksum)
        }

        let record_type = match record_type {
            0 => RecordType::Data,
            1 => RecordType::EndOfFile,
            other => return Err(HexError::UnsupportedType(other)),
        };
        Ok(HexRecord { length, address, record_type, data })
    }
}

/// Parse Intel-HEX text into `records`
///
/// Blank lines are skipped. Parsing stops at the end-of-file record, which is stored as well.
/// Returns the number of records written.
pub fn parse_hex(text: &str, records: &mut [HexRecord]) -> Result<usize, HexError> {
    let mut count = 0;
    for (number, line) in text.lines().enumerate().filter(|(_, line)| !line.trim().is_empty()) {
        let record = parse::record(line.trim()).map_err(|error| {
            warn!("invalid Intel-HEX record on line {}: {}", number + 1, error);
            error
        })?;
        let slot = records.get_mut(count).ok_or(HexError::TooManyRecords)?;
        *slot = record;
        count += 1;
        if record.record_type == RecordType::EndOfFile {
            return Ok(count)
        }
    }
    Err(HexError::MissingEnd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record() {
        let record = parse::record(":0300000002004BB0").unwrap();
        assert_eq!(record.record_type, RecordType::Data);
        assert_eq!(record.address, 0);
        assert_eq!(record.payload(), &[0x02, 0x00, 0x4B]);
        assert_eq!(record.region(), Region::Internal);

        let record = parse::record(":041B4000DEADBEEF69\r\n").unwrap();
        assert_eq!(record.address, 0x1B40);
        assert_eq!(record.payload(), &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(record.region(), Region::External);

        assert_eq!(parse::record(":00000001FF"), Ok(HexRecord::END));
    }

    #[test]
    fn test_parse_record_errors() {
        assert_eq!(parse::record("0300000002004BB0"), Err(HexError::Syntax));
        assert_eq!(parse::record(":0300000002004BB1"), Err(HexError::Checksum));
        assert_eq!(parse::record(":0300000002004B"), Err(HexError::Syntax));
        assert_eq!(parse::record(":0300000002004BB0FF"), Err(HexError::Syntax));
        assert_eq!(parse::record(":020000040000FA"), Err(HexError::UnsupportedType(4)));
        assert_eq!(parse::record(":11000000"), Err(HexError::RecordTooLong));
        assert_eq!(parse::record(":03+000000"), Err(HexError::Syntax));
    }

    #[test]
    fn test_parse_hex() {
        let text = ":0300000002004BB0\n\n:041B4000DEADBEEF69\n:00000001FF\n:027F92000102EA\n";
        let mut records = [HexRecord::END; 4];
        assert_eq!(parse_hex(text, &mut records), Ok(3));
        assert_eq!(records[1].address, 0x1B40);
        assert_eq!(records[2], HexRecord::END);
    }

    #[test]
    fn test_parse_hex_limits() {
        let mut records = [HexRecord::END; 1];
        assert_eq!(parse_hex(":0300000002004BB0\n:00000001FF\n", &mut records), Err(HexError::TooManyRecords));
        let mut records = [HexRecord::END; 4];
        assert_eq!(parse_hex(":0300000002004BB0\n", &mut records), Err(HexError::MissingEnd));
    }

    #[test]
    fn test_const_record() {
        const RECORD: HexRecord = HexRecord::data(0x7F92, &[1, 2]);
        assert_eq!(RECORD, parse::record(":027F92000102EA").unwrap());
        assert_eq!(RECORD.region(), Region::External);
    }
}
