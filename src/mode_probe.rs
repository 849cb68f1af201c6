//! Classifies an open USB handle without ever mutating device state.

use crate::transfer::Transfer;
use crate::transport::UsbTransport;

/// What we believe the MCU is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    /// The on-chip ROM monitor, identified by its "WestBridge" product string.
    Bootloader,
    /// A small RAM-resident flash-programmer helper, identified by the
    /// `"FX3PROG"` magic response.
    FlashProgrammer,
    /// Neither of the above -- the device's normal application firmware.
    Application,
    /// No probe has run yet for this record.
    Unknown,
}

const PRODUCT_STRING_INDEX: u8 = 2;
const BOOTLOADER_PRODUCT_PREFIX: &str = "WestBridge";
const HELPER_PROBE_REQUEST: u8 = 0xB0;
const HELPER_PROBE_LEN: u16 = 8;
const HELPER_MAGIC: &[u8] = b"FX3PROG";

/// Reads USB string descriptors and issues a magic-probe control IN to
/// decide which of the three modes a device is in. Side-effect-free and
/// idempotent: any I/O failure along the way just narrows the classification
/// down further rather than propagating, so a stray third-party device on
/// the bus can never abort enumeration.
pub fn classify<T: UsbTransport>(transport: &mut T) -> DeviceMode {
    if let Ok(product) = transport.read_string_descriptor_ascii(PRODUCT_STRING_INDEX) {
        if product.starts_with(BOOTLOADER_PRODUCT_PREFIX) {
            return DeviceMode::Bootloader;
        }
    }

    let mut xfer = Transfer::new(transport);
    if let Ok(response) = xfer.control_in(HELPER_PROBE_REQUEST, 0, 0, HELPER_PROBE_LEN) {
        if response.len() == HELPER_PROBE_LEN as usize && &response[..HELPER_MAGIC.len()] == HELPER_MAGIC {
            return DeviceMode::FlashProgrammer;
        }
    }

    DeviceMode::Application
}
