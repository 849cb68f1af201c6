//! Drives the section stream from [`crate::image`] into MCU RAM.

use log::{info, warn};

use crate::error::{FxError, TransferFailure};
use crate::image::{ImageReader, StreamItem};
use crate::transfer::{lsw, msw, Transfer, MAX_TRANSFER_LEN};
use crate::transport::UsbTransport;

/// Vendor request used both for RAM writes and for the entry-point jump.
pub const DOWNLOAD_REQUEST: u8 = 0xA0;

/// What happened over the course of one RAM download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Total payload bytes successfully written across all sections.
    pub bytes_sent: u64,
    /// `false` if the image's section stream ended before an entry record
    /// was seen -- the RAM write itself still happened, but there was
    /// nothing to jump to. See §9: this is a warning, not a hard error.
    pub complete: bool,
    pub entry_address: Option<u32>,
}

/// Writes an entire parsed image to RAM and triggers the jump to its entry
/// point.
pub fn download<T: UsbTransport>(transport: &mut T, image: &[u8]) -> Result<DownloadOutcome, FxError> {
    let reader = ImageReader::new(image)?;
    let mut xfer = Transfer::new(transport);
    let mut bytes_sent: u64 = 0;
    let mut entry_address = None;

    for item in reader {
        match item? {
            StreamItem::Section(section) => {
                let mut offset = 0usize;
                for chunk in section.payload.chunks(MAX_TRANSFER_LEN) {
                    let addr = section.address.wrapping_add(offset as u32);
                    let n = xfer
                        .control_out(DOWNLOAD_REQUEST, lsw(addr), msw(addr), chunk)
                        .map_err(|cause| FxError::TransferError {
                            offset: bytes_sent,
                            cause: TransferFailure::Usb(cause),
                        })?;
                    if n != chunk.len() {
                        return Err(FxError::TransferError {
                            offset: bytes_sent,
                            cause: TransferFailure::ShortTransfer {
                                expected: chunk.len(),
                                actual: n,
                            },
                        });
                    }
                    offset += chunk.len();
                    bytes_sent += chunk.len() as u64;
                }
            }
            StreamItem::Entry(entry) => {
                entry_address = Some(entry.entry_address);
                match xfer.control_out(
                    DOWNLOAD_REQUEST,
                    lsw(entry.entry_address),
                    msw(entry.entry_address),
                    &[],
                ) {
                    Ok(_) => info!(
                        "entry transfer to 0x{:08x} accepted; device should re-enumerate",
                        entry.entry_address
                    ),
                    Err(e) => warn!(
                        "entry-point transfer failed ({e}); normal if the device already detached"
                    ),
                }
            }
        }
    }

    if entry_address.is_none() {
        warn!("image ended without an entry record; RAM was written but nothing was started");
    }

    Ok(DownloadOutcome {
        bytes_sent,
        complete: entry_address.is_some(),
        entry_address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{FakeTransport, RecordedCall};

    fn minimal_image() -> Vec<u8> {
        let mut buf = vec![b'C', b'Y', 0x00, 0xB0];
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&0x4000_1000u32.to_le_bytes());
        buf.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]);
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0x4000_2000u32.to_le_bytes());
        buf
    }

    #[test]
    fn minimal_image_issues_the_two_transfers_the_spec_requires() {
        let mut fake = FakeTransport::default();
        let image = minimal_image();
        let outcome = download(&mut fake, &image).unwrap();

        assert_eq!(outcome.bytes_sent, 4);
        assert!(outcome.complete);
        assert_eq!(outcome.entry_address, Some(0x4000_2000));

        assert_eq!(
            fake.calls,
            vec![
                RecordedCall::Out {
                    request: 0xA0,
                    value: 0x1000,
                    index: 0x4000,
                    payload: vec![0xAA, 0xBB, 0xCC, 0xDD],
                },
                RecordedCall::Out {
                    request: 0xA0,
                    value: 0x2000,
                    index: 0x4000,
                    payload: vec![],
                },
            ]
        );
    }

    #[test]
    fn oversize_section_is_chunked_at_2048_bytes() {
        let mut fake = FakeTransport::default();
        let mut buf = vec![b'C', b'Y', 0x00, 0xB0];
        let payload = vec![0x5Au8; 6000];
        buf.extend_from_slice(&((payload.len() / 4) as u32).to_le_bytes());
        buf.extend_from_slice(&0x4000_0000u32.to_le_bytes());
        buf.extend_from_slice(&payload);
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());

        download(&mut fake, &buf).unwrap();

        let out_calls: Vec<_> = fake
            .calls
            .iter()
            .filter_map(|c| match c {
                RecordedCall::Out { value, index, payload, .. } => Some((*value, *index, payload.len())),
                _ => None,
            })
            .collect();

        assert_eq!(
            out_calls,
            vec![
                (0x0000, 0x4000, 2048),
                (0x0800, 0x4000, 2048),
                (0x1000, 0x4000, 1904),
                (0x0000, 0x0000, 0), // the entry jump
            ]
        );
        for (_, _, len) in &out_calls {
            assert!(*len <= MAX_TRANSFER_LEN);
        }
    }

    #[test]
    fn bad_magic_issues_no_transfers() {
        let mut fake = FakeTransport::default();
        let image = [0x58, 0x59, 0x00, 0xB0];
        let err = download(&mut fake, &image).unwrap_err();
        assert!(matches!(err, FxError::InvalidHeader));
        assert!(fake.calls.is_empty());
    }

    #[test]
    fn failed_entry_jump_does_not_fail_the_download() {
        let mut fake = FakeTransport::default();
        fake.push_out_result(Ok(4)); // section write succeeds
        fake.push_out_result(Err(rusb::Error::NoDevice)); // entry jump "fails"
        let image = minimal_image();
        let outcome = download(&mut fake, &image).unwrap();
        assert!(outcome.complete);
    }

    #[test]
    fn short_section_write_is_a_transfer_error() {
        let mut fake = FakeTransport::default();
        fake.push_out_result(Ok(2)); // short write: only 2 of 4 bytes
        let image = minimal_image();
        let err = download(&mut fake, &image).unwrap_err();
        assert!(matches!(
            err,
            FxError::TransferError {
                cause: TransferFailure::ShortTransfer { expected: 4, actual: 2 },
                ..
            }
        ));
    }

    #[test]
    fn image_with_no_entry_record_reports_incomplete_not_an_error() {
        let mut fake = FakeTransport::default();
        let mut buf = vec![b'C', b'Y', 0x00, 0xB0];
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&0x1000u32.to_le_bytes());
        buf.extend_from_slice(&[1, 2, 3, 4]);
        let outcome = download(&mut fake, &buf).unwrap();
        assert!(!outcome.complete);
        assert_eq!(outcome.entry_address, None);
    }
}
