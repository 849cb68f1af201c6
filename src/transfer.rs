//! Vendor control transfers and the single transport-level invariant THE CORE
//! enforces: a transfer's payload never exceeds [`MAX_TRANSFER_LEN`] bytes.

use crate::transport::UsbTransport;

/// Per-transfer payload cap. Larger logical writes are split by callers
/// (`Downloader`, `EepromIO`), never by this module.
pub const MAX_TRANSFER_LEN: usize = 2048;

/// Low 16 bits of a 32-bit address.
pub fn lsw(addr: u32) -> u16 {
    (addr & 0xFFFF) as u16
}

/// High 16 bits of a 32-bit address.
pub fn msw(addr: u32) -> u16 {
    (addr >> 16) as u16
}

/// A single vendor control transfer issued over an [`UsbTransport`].
///
/// This type does no chunking and no retrying; it exists purely to pin the
/// request type, timeout, and size cap in one place so every caller goes
/// through the same discipline.
pub struct Transfer<'a, T: UsbTransport> {
    transport: &'a mut T,
}

impl<'a, T: UsbTransport> std::fmt::Debug for Transfer<'a, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transfer").finish_non_exhaustive()
    }
}

impl<'a, T: UsbTransport> Transfer<'a, T> {
    pub fn new(transport: &'a mut T) -> Self {
        Self { transport }
    }

    /// Issues a vendor control OUT transfer and returns the number of bytes
    /// actually written. A short write is not itself treated as an error
    /// here -- callers that need byte-exactness compare the return value
    /// against `payload.len()`.
    pub fn control_out(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        payload: &[u8],
    ) -> Result<usize, rusb::Error> {
        assert!(
            payload.len() <= MAX_TRANSFER_LEN,
            "control_out payload of {} bytes exceeds the {}-byte transfer cap",
            payload.len(),
            MAX_TRANSFER_LEN
        );
        self.transport.control_out(request, value, index, payload)
    }

    /// Issues a vendor control IN transfer and returns exactly the bytes the
    /// device sent back (which may be shorter than `length`).
    pub fn control_in(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        length: u16,
    ) -> Result<Vec<u8>, rusb::Error> {
        assert!(
            length as usize <= MAX_TRANSFER_LEN,
            "control_in length of {} bytes exceeds the {}-byte transfer cap",
            length,
            MAX_TRANSFER_LEN
        );
        self.transport.control_in(request, value, index, length)
    }
}
