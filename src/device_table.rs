//! Enumerates candidate MCU devices and owns every open USB handle.
//!
//! The table is the sole owner of USB handles in this crate: nothing else
//! opens or closes one. `discover()` replaces the whole table, closing
//! every previously held handle first.

use log::{info, warn};
use rusb::UsbContext;

use crate::error::FxError;
use crate::mode_probe::{self, DeviceMode};
use crate::transport::{RusbTransport, UsbTransport};

/// Cypress vendor ID: matches the bootloader and the flash-programmer
/// helper regardless of product ID.
pub const VENDOR_FX3: u16 = 0x04B4;
/// Domesday Duplicator's own vendor ID, used only in application mode.
pub const VENDOR_DOMESDAY: u16 = 0x1D50;
pub const PRODUCT_DOMESDAY_APPLICATION: u16 = 0x603B;

/// Fixed table capacity; additional matching devices are skipped at
/// discover-time rather than growing the table unboundedly.
pub const CAPACITY: usize = 16;

fn is_allowed(vid: u16, pid: u16) -> bool {
    vid == VENDOR_FX3 || (vid == VENDOR_DOMESDAY && pid == PRODUCT_DOMESDAY_APPLICATION)
}

/// One discovered, currently-open candidate device.
///
/// Generic over the transport rather than tied to `RusbTransport` directly,
/// so the state machines built on top of it (`HelperLoader`) can be driven
/// against [`crate::transport::FakeTransport`] in tests the same way
/// `Transfer`/`ModeProbe`/`EepromIO` already are.
pub struct DeviceRecord<U: UsbTransport> {
    pub transport: U,
    pub vid: u16,
    pub pid: u16,
    pub bus: u8,
    pub address: u8,
    pub mode: DeviceMode,
    /// Stable slot position for the lifetime of this discovery round.
    pub index: usize,
}

impl<U: UsbTransport> std::fmt::Debug for DeviceRecord<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRecord")
            .field("vid", &self.vid)
            .field("pid", &self.pid)
            .field("bus", &self.bus)
            .field("address", &self.address)
            .field("mode", &self.mode)
            .field("index", &self.index)
            .finish()
    }
}

/// A collection of candidate devices that can be (re-)enumerated and whose
/// handles can be released, without committing callers to the real `rusb`
/// transport.
///
/// [`DeviceTable`] is the production implementation; test code implements
/// this trait over a `Vec<DeviceRecord<FakeTransport>>` to drive
/// `HelperLoader`'s state machine without hardware.
pub trait DeviceDirectory {
    type Transport: UsbTransport;

    fn records(&self) -> &[DeviceRecord<Self::Transport>];
    fn get(&self, index: usize) -> Result<&DeviceRecord<Self::Transport>, FxError>;
    fn get_mut(&mut self, index: usize) -> Result<&mut DeviceRecord<Self::Transport>, FxError>;
    fn discover(&mut self) -> Result<usize, FxError>;
    fn close_all(&mut self);
}

/// The value-typed replacement for the reference tool's process-wide
/// `fx3_devices[16]` global array (§9).
pub struct DeviceTable<T: UsbContext> {
    context: T,
    records: Vec<DeviceRecord<RusbTransport<T>>>,
}

impl<T: UsbContext> std::fmt::Debug for DeviceTable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceTable")
            .field("records", &self.records)
            .finish_non_exhaustive()
    }
}

impl DeviceTable<rusb::Context> {
    pub fn new() -> Result<Self, FxError> {
        let context = rusb::Context::new().map_err(FxError::UsbInitFailure)?;
        Ok(Self {
            context,
            records: Vec::new(),
        })
    }
}

impl<T: UsbContext> DeviceTable<T> {
    /// Re-enumerates the bus, replacing the current table. All handles held
    /// by the previous table are closed before the new scan begins.
    pub fn discover(&mut self) -> Result<usize, FxError> {
        self.close_all();

        let list = self.context.devices().map_err(FxError::EnumerationFailure)?;

        for device in list.iter() {
            if self.records.len() >= CAPACITY {
                warn!("device table is full ({CAPACITY} entries); ignoring further matches");
                break;
            }

            let desc = match device.device_descriptor() {
                Ok(d) => d,
                Err(_) => continue,
            };
            let (vid, pid) = (desc.vendor_id(), desc.product_id());
            if !is_allowed(vid, pid) {
                continue;
            }

            let bus = device.bus_number();
            let address = device.address();
            let handle = match device.open() {
                Ok(h) => h,
                Err(e) => {
                    warn!("failed to open {vid:04x}:{pid:04x} at {bus:03}:{address:03}: {e}");
                    continue;
                }
            };

            let mut transport = RusbTransport::new(handle);
            let mode = mode_probe::classify(&mut transport);
            let index = self.records.len();
            info!("discovered {vid:04x}:{pid:04x} bus={bus} addr={address} mode={mode:?}");
            self.records.push(DeviceRecord {
                transport,
                vid,
                pid,
                bus,
                address,
                mode,
                index,
            });
        }

        Ok(self.records.len())
    }

    pub fn records(&self) -> &[DeviceRecord<RusbTransport<T>>] {
        &self.records
    }

    pub fn get(&self, index: usize) -> Result<&DeviceRecord<RusbTransport<T>>, FxError> {
        self.records.get(index).ok_or(FxError::InvalidDeviceIndex(index))
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut DeviceRecord<RusbTransport<T>>, FxError> {
        self.records
            .get_mut(index)
            .ok_or(FxError::InvalidDeviceIndex(index))
    }

    /// Closes every open handle. Each `DeviceRecord`'s handle is closed
    /// exactly once, via `Drop`, when it is removed from the table here.
    pub fn close_all(&mut self) {
        if !self.records.is_empty() {
            info!("closing {} open device handle(s)", self.records.len());
        }
        self.records.clear();
    }
}

impl<T: UsbContext> DeviceDirectory for DeviceTable<T> {
    type Transport = RusbTransport<T>;

    fn records(&self) -> &[DeviceRecord<Self::Transport>] {
        DeviceTable::records(self)
    }

    fn get(&self, index: usize) -> Result<&DeviceRecord<Self::Transport>, FxError> {
        DeviceTable::get(self, index)
    }

    fn get_mut(&mut self, index: usize) -> Result<&mut DeviceRecord<Self::Transport>, FxError> {
        DeviceTable::get_mut(self, index)
    }

    fn discover(&mut self) -> Result<usize, FxError> {
        DeviceTable::discover(self)
    }

    fn close_all(&mut self) {
        DeviceTable::close_all(self)
    }
}

impl<T: UsbContext> Drop for DeviceTable<T> {
    fn drop(&mut self) {
        self.close_all();
    }
}
