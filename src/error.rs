//! The error taxonomy surfaced by every core operation.

use std::path::PathBuf;

use thiserror::Error;

/// Every way a core operation (upload, program, verify, discover) can fail.
#[derive(Debug, Error)]
pub enum FxError {
    #[error("failed to initialize the USB library")]
    UsbInitFailure(#[source] rusb::Error),

    #[error("failed to enumerate USB devices")]
    EnumerationFailure(#[source] rusb::Error),

    #[error("device index {0} is not present in the current device table")]
    InvalidDeviceIndex(usize),

    #[error("could not read firmware image {path:?}")]
    FileIOFailure {
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("image is missing the 'CY' header")]
    InvalidHeader,

    #[error("image is not marked as executable code")]
    NotExecutable,

    #[error("unsupported image type 0x{0:02x}, expected 0xb0")]
    UnsupportedImageType(u8),

    #[error("image ended before an entry record, without a short section")]
    TruncatedImage,

    #[error("USB transfer failed at offset 0x{offset:x}")]
    TransferError {
        offset: u64,
        #[source]
        cause: TransferFailure,
    },

    #[error("EEPROM verify mismatch in slave {slave} at offset {offset}")]
    VerifyMismatch { slave: u32, offset: u32 },

    #[error("device is in application mode; set the hardware mode jumper and power-cycle to enter the bootloader")]
    NotInBootloader,

    #[error("flash-programmer helper image could not be located (set FX3_FLASH_PROG or place it next to the binary)")]
    HelperImageMissing,

    #[error("flash-programmer helper did not enumerate after {attempts} attempts")]
    HelperNotEnumerated { attempts: u32 },
}

/// Why a single chunked transfer failed: either the bus rejected it, or it
/// "succeeded" but moved fewer bytes than the caller asked for, which
/// callers that need byte-exactness treat as a failure just the same.
#[derive(Debug, Error)]
pub enum TransferFailure {
    #[error(transparent)]
    Usb(#[from] rusb::Error),

    #[error("transferred only {actual} of {expected} bytes")]
    ShortTransfer { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, FxError>;
