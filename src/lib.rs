//! USB host driver for IntelliKeys keyboards
//!
//! The crate does not drive a USB controller by itself. It plugs into an existing host stack through two traits:
//! - [`Host`] is implemented for the host stack, and gives the driver access to control transfers,
//!   interrupt pipes and a per-device timer.
//! - [`Driver`] is implemented by [`IntelliKeys`], and is called by the host stack whenever a device is offered,
//!   a transfer completes or the timer expires.
//!
//! See [`driver::intellikeys`] for details on the device, and [`driver::log::LogHandler`] for a minimal [`Handler`].
#![cfg_attr(not(test), no_std)]

pub mod types;
pub mod host;
pub mod descriptor;
pub mod driver;

pub use host::{Host, TransferError};
pub use types::{ClaimType, DeviceAddress, PipeId, SetupPacket, VidPid};
pub use driver::Driver;
pub use driver::intellikeys::{CommandError, ConnectionState, Handler, IntelliKeys};
pub use driver::intellikeys::firmware::{Firmware, HexRecord};
pub use driver::intellikeys::protocol::Led;

#[cfg(test)]
mod test_logger {
    #[defmt::global_logger]
    struct Logger;

    unsafe impl defmt::Logger for Logger {
        fn acquire() {}
        unsafe fn flush() {}
        unsafe fn release() {}
        unsafe fn write(_bytes: &[u8]) {}
    }

    defmt::timestamp!("{=u32}", 0);
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_readme_matches_package() {
        let readme = include_str!("../README.md");
        assert!(readme.starts_with(concat!("# ", env!("CARGO_PKG_NAME"), "\n")));
    }
}
