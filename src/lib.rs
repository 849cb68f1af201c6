//! Core, hardware-facing logic for provisioning a Cypress FX3 USB 3.0
//! peripheral controller: parsing vendor firmware images, downloading them
//! to RAM, bringing up the flash-programmer helper, and programming the
//! attached I²C EEPROM.
//!
//! Everything that talks to a real bus does so through the [`transport`]
//! seam, so the rest of the crate can be exercised without hardware
//! attached.

#![warn(missing_debug_implementations, rust_2018_idioms)]

pub mod config;
pub mod descriptor;
pub mod device_table;
pub mod downloader;
pub mod eeprom_io;
pub mod error;
pub mod helper_loader;
pub mod image;
pub mod mode_probe;
pub mod transfer;
pub mod transport;

pub use device_table::{DeviceRecord, DeviceTable};
pub use error::{FxError, Result};
pub use helper_loader::{HelperLoader, RetryPolicy};
pub use mode_probe::DeviceMode;
