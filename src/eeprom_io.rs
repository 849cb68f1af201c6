//! The flash-programmer helper's I²C EEPROM write/read-verify protocol.
//!
//! Addresses roll over into a new 64 KiB "slave" every 64 KiB, and every
//! window is fully written and then fully verified before the next window
//! starts (§5) -- never a bulk-write-then-bulk-verify. `write` and `verify`
//! share the exact same window/chunk planning code, which is what makes the
//! write/verify tuple-equality property in §8 true by construction rather
//! than by coincidence.

use crate::error::{FxError, TransferFailure};
use crate::transfer::{Transfer, MAX_TRANSFER_LEN};
use crate::transport::UsbTransport;

pub const I2C_WRITE_REQUEST: u8 = 0xBA;
pub const I2C_READ_REQUEST: u8 = 0xBB;

/// I²C EEPROM page size; images are zero-padded up to a multiple of this
/// before programming.
pub const PAGE_SIZE: usize = 64;

/// Size of one addressable "slave" window.
pub const SLAVE_WINDOW_SIZE: usize = 64 * 1024;

/// Zero-pads `data` up to the next multiple of [`PAGE_SIZE`]. Returns the
/// input unchanged (by value) if it is already page-aligned.
pub fn pad_to_page(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    let remainder = out.len() % PAGE_SIZE;
    if remainder != 0 {
        out.resize(out.len() + (PAGE_SIZE - remainder), 0);
    }
    out
}

/// `(slave_base, start-offset-in-buffer, window-length)` for every 64 KiB
/// window in a buffer of `padded_len` bytes, in ascending `slave_base` order.
fn window_bounds(padded_len: usize) -> Vec<(u32, usize, usize)> {
    let mut windows = Vec::new();
    let mut remaining = padded_len;
    let mut start = 0usize;
    let mut slave = 0u32;
    while remaining > 0 {
        let len = remaining.min(SLAVE_WINDOW_SIZE);
        windows.push((slave, start, len));
        start += len;
        remaining -= len;
        slave += 1;
    }
    windows
}

/// `(address_within_slave, chunk-length)` for every transfer-sized chunk
/// within one window, in ascending address order.
fn chunk_offsets(window_len: usize) -> Vec<(u16, u16)> {
    let mut chunks = Vec::new();
    let mut within = 0usize;
    while within < window_len {
        let len = (window_len - within).min(MAX_TRANSFER_LEN);
        chunks.push((within as u16, len as u16));
        within += len;
    }
    chunks
}

fn write_window<T: UsbTransport>(
    transport: &mut T,
    padded: &[u8],
    window: (u32, usize, usize),
) -> Result<(), FxError> {
    let (slave, start, len) = window;
    let mut xfer = Transfer::new(transport);
    for (offset, chunk_len) in chunk_offsets(len) {
        let buf_pos = start + offset as usize;
        let bytes = &padded[buf_pos..buf_pos + chunk_len as usize];
        let n = xfer
            .control_out(I2C_WRITE_REQUEST, slave as u16, offset, bytes)
            .map_err(|cause| FxError::TransferError {
                offset: buf_pos as u64,
                cause: TransferFailure::Usb(cause),
            })?;
        if n != bytes.len() {
            return Err(FxError::TransferError {
                offset: buf_pos as u64,
                cause: TransferFailure::ShortTransfer {
                    expected: bytes.len(),
                    actual: n,
                },
            });
        }
    }
    Ok(())
}

fn verify_window<T: UsbTransport>(
    transport: &mut T,
    padded: &[u8],
    window: (u32, usize, usize),
) -> Result<(), FxError> {
    let (slave, start, len) = window;
    let mut xfer = Transfer::new(transport);
    for (offset, chunk_len) in chunk_offsets(len) {
        let buf_pos = start + offset as usize;
        let expected = &padded[buf_pos..buf_pos + chunk_len as usize];
        let actual = xfer
            .control_in(I2C_READ_REQUEST, slave as u16, offset, chunk_len)
            .map_err(|cause| FxError::TransferError {
                offset: buf_pos as u64,
                cause: TransferFailure::Usb(cause),
            })?;
        if actual.len() != expected.len() {
            return Err(FxError::TransferError {
                offset: buf_pos as u64,
                cause: TransferFailure::ShortTransfer {
                    expected: expected.len(),
                    actual: actual.len(),
                },
            });
        }
        if let Some(i) = expected.iter().zip(actual.iter()).position(|(a, b)| a != b) {
            return Err(FxError::VerifyMismatch {
                slave,
                offset: offset as u32 + i as u32,
            });
        }
    }
    Ok(())
}

/// Writes `data` (zero-padded to a page boundary) to the EEPROM, without
/// reading it back.
pub fn write<T: UsbTransport>(transport: &mut T, data: &[u8]) -> Result<(), FxError> {
    let padded = pad_to_page(data);
    for window in window_bounds(padded.len()) {
        write_window(transport, &padded, window)?;
    }
    Ok(())
}

/// Reads the EEPROM back and compares it against `data` (zero-padded the
/// same way `write` would), using the identical window/chunk partitioning.
pub fn verify<T: UsbTransport>(transport: &mut T, data: &[u8]) -> Result<(), FxError> {
    let padded = pad_to_page(data);
    for window in window_bounds(padded.len()) {
        verify_window(transport, &padded, window)?;
    }
    Ok(())
}

/// Writes then immediately verifies each window before advancing to the
/// next, per the ordering guarantee in §5.
pub fn program<T: UsbTransport>(transport: &mut T, data: &[u8]) -> Result<(), FxError> {
    let padded = pad_to_page(data);
    for window in window_bounds(padded.len()) {
        write_window(transport, &padded, window)?;
        verify_window(transport, &padded, window)?;
    }
    Ok(())
}
