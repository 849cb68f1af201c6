//! Ensures a flash-programmer helper is running on the target MCU,
//! downloading and waiting for re-enumeration if it isn't already (§4.6).

use std::thread::sleep;
use std::time::Duration;

use log::info;

use crate::config;
use crate::device_table::{DeviceDirectory, VENDOR_FX3};
use crate::downloader;
use crate::error::FxError;
use crate::mode_probe::DeviceMode;

/// How long and how many times to wait for the helper to re-enumerate
/// after a RAM download. No exponential backoff (§9: an optional, not
/// mandatory, refinement) -- just a fixed linear wait, made configurable
/// rather than hard-coded.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
pub struct HelperLoader {
    retry: RetryPolicy,
}

impl Default for HelperLoader {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl HelperLoader {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Ensures the device at `index` is running the flash-programmer
    /// helper, returning the index of the record that now speaks the
    /// helper protocol (which may differ from `index` if a rebind
    /// happened).
    pub fn ensure<D: DeviceDirectory>(&self, table: &mut D, index: usize) -> Result<usize, FxError> {
        let mode = table.get(index)?.mode;

        match mode {
            DeviceMode::FlashProgrammer => {
                info!("device {index} is already running the flash-programmer helper");
                Ok(index)
            }
            DeviceMode::Application => Err(FxError::NotInBootloader),
            DeviceMode::Unknown => Err(FxError::NotInBootloader),
            DeviceMode::Bootloader => self.download_and_rebind(table, index),
        }
    }

    fn download_and_rebind<D: DeviceDirectory>(
        &self,
        table: &mut D,
        index: usize,
    ) -> Result<usize, FxError> {
        let helper_path = config::resolve_helper_image_path()?;
        let image = std::fs::read(&helper_path).map_err(|cause| FxError::FileIOFailure {
            path: helper_path.clone(),
            cause,
        })?;

        info!("downloading flash-programmer helper from {helper_path:?}");
        {
            let record = table.get_mut(index)?;
            downloader::download(&mut record.transport, &image)?;
        }

        // The device is about to detach and come back on a new address;
        // every handle we hold is now stale.
        table.close_all();

        for attempt in 1..=self.retry.attempts {
            sleep(self.retry.delay);
            let count = table.discover()?;
            info!("rediscover attempt {attempt}/{}: {count} device(s) found", self.retry.attempts);

            if let Some(found) = table
                .records()
                .iter()
                .find(|r| r.vid == VENDOR_FX3 && r.mode == DeviceMode::FlashProgrammer)
            {
                return Ok(found.index);
            }
        }

        Err(FxError::HelperNotEnumerated {
            attempts: self.retry.attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_table::DeviceRecord;
    use crate::transport::FakeTransport;

    /// A minimal [`DeviceDirectory`] backed by [`FakeTransport`], so
    /// `HelperLoader`'s state machine can be driven without a real USB bus.
    #[derive(Default)]
    struct FakeDeviceTable {
        records: Vec<DeviceRecord<FakeTransport>>,
        /// What `discover()` should populate the table with, consumed once.
        next_discovery: Vec<DeviceRecord<FakeTransport>>,
    }

    impl DeviceDirectory for FakeDeviceTable {
        type Transport = FakeTransport;

        fn records(&self) -> &[DeviceRecord<FakeTransport>] {
            &self.records
        }

        fn get(&self, index: usize) -> Result<&DeviceRecord<FakeTransport>, FxError> {
            self.records.get(index).ok_or(FxError::InvalidDeviceIndex(index))
        }

        fn get_mut(&mut self, index: usize) -> Result<&mut DeviceRecord<FakeTransport>, FxError> {
            self.records
                .get_mut(index)
                .ok_or(FxError::InvalidDeviceIndex(index))
        }

        fn discover(&mut self) -> Result<usize, FxError> {
            self.records = std::mem::take(&mut self.next_discovery);
            Ok(self.records.len())
        }

        fn close_all(&mut self) {
            self.records.clear();
        }
    }

    fn record(vid: u16, mode: DeviceMode, index: usize) -> DeviceRecord<FakeTransport> {
        DeviceRecord {
            transport: FakeTransport::default(),
            vid,
            pid: 0,
            bus: 1,
            address: 1,
            mode,
            index,
        }
    }

    #[test]
    fn default_retry_policy_matches_the_spec() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 10);
        assert_eq!(policy.delay, Duration::from_secs(1));
    }

    #[test]
    fn helper_already_running_returns_the_existing_index_with_no_transfers() {
        let mut table = FakeDeviceTable {
            records: vec![record(VENDOR_FX3, DeviceMode::FlashProgrammer, 0)],
            next_discovery: Vec::new(),
        };

        let loader = HelperLoader::default();
        let index = loader.ensure(&mut table, 0).unwrap();

        assert_eq!(index, 0);
        assert!(table.records()[0].transport.calls.is_empty());
    }

    #[test]
    fn application_mode_is_rejected_without_any_transfer() {
        let mut table = FakeDeviceTable {
            records: vec![record(VENDOR_FX3, DeviceMode::Application, 0)],
            next_discovery: Vec::new(),
        };

        let loader = HelperLoader::default();
        let err = loader.ensure(&mut table, 0).unwrap_err();

        assert!(matches!(err, FxError::NotInBootloader));
        assert!(table.records()[0].transport.calls.is_empty());
    }

    #[test]
    fn unknown_mode_is_rejected_the_same_as_application_mode() {
        let mut table = FakeDeviceTable {
            records: vec![record(VENDOR_FX3, DeviceMode::Unknown, 0)],
            next_discovery: Vec::new(),
        };

        let loader = HelperLoader::default();
        let err = loader.ensure(&mut table, 0).unwrap_err();

        assert!(matches!(err, FxError::NotInBootloader));
    }

    /// A minimal image: no sections, just an entry record, so `download()`
    /// parses and "sends" it without requiring any section bytes.
    fn minimal_helper_image() -> Vec<u8> {
        let mut buf = vec![b'C', b'Y', 0x00, 0xB0];
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0x4000_0000u32.to_le_bytes());
        buf
    }

    /// Both scenarios below point `FX3_FLASH_PROG` at a real file, so they
    /// run in one test function rather than two -- the env var is
    /// process-global, and cargo runs tests on separate threads by default.
    #[test]
    fn bootloader_mode_downloads_the_helper_and_then_rediscovers() {
        let helper_file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(helper_file.path(), minimal_helper_image()).unwrap();
        std::env::set_var(config::HELPER_IMAGE_ENV_VAR, helper_file.path());

        let loader = HelperLoader::new(RetryPolicy {
            attempts: 2,
            delay: Duration::from_millis(1),
        });

        let mut exhausted = FakeDeviceTable {
            records: vec![record(VENDOR_FX3, DeviceMode::Bootloader, 0)],
            // Rediscovery never finds a FlashProgrammer-mode device.
            next_discovery: Vec::new(),
        };
        let err = loader.ensure(&mut exhausted, 0).unwrap_err();
        assert!(matches!(err, FxError::HelperNotEnumerated { attempts: 2 }));

        let mut rebinds = FakeDeviceTable {
            records: vec![record(VENDOR_FX3, DeviceMode::Bootloader, 0)],
            next_discovery: vec![record(VENDOR_FX3, DeviceMode::FlashProgrammer, 0)],
        };
        let index = loader.ensure(&mut rebinds, 0).unwrap();
        assert_eq!(index, 0);

        std::env::remove_var(config::HELPER_IMAGE_ENV_VAR);
    }
}
