//! The thin seam between the protocol logic and an actual USB bus.
//!
//! Everything in this crate that needs to talk to hardware does so through
//! [`UsbTransport`] rather than `rusb::DeviceHandle` directly, so the
//! chunking/ordering/classification logic can be exercised against an
//! in-memory double in tests.

use std::time::Duration;

/// The subset of USB operations THE CORE needs.
///
/// All requests use the vendor request type on endpoint 0, per §6 of the
/// protocol: there is deliberately no generality here beyond what the FX3
/// vendor protocol actually uses.
pub trait UsbTransport {
    /// Issues a vendor control OUT transfer, returning the number of bytes
    /// actually written.
    fn control_out(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        payload: &[u8],
    ) -> Result<usize, rusb::Error>;

    /// Issues a vendor control IN transfer, returning exactly the bytes
    /// the device returned (which may be shorter than `length`).
    fn control_in(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        length: u16,
    ) -> Result<Vec<u8>, rusb::Error>;

    /// Reads a USB string descriptor (by index) as ASCII, in the
    /// first US-English language ID the device advertises.
    fn read_string_descriptor_ascii(&mut self, index: u8) -> Result<String, rusb::Error>;
}

/// Every transfer uses this timeout; there is no variable or exponential
/// backoff anywhere in THE CORE (§5).
pub const TRANSFER_TIMEOUT: Duration = Duration::from_secs(5);

const VENDOR_OUT: u8 = 0x40; // LIBUSB_REQUEST_TYPE_VENDOR | LIBUSB_ENDPOINT_OUT
const VENDOR_IN: u8 = 0xC0; // LIBUSB_REQUEST_TYPE_VENDOR | LIBUSB_ENDPOINT_IN | LIBUSB_RECIPIENT_DEVICE

/// [`UsbTransport`] backed by a real `rusb` device handle.
pub struct RusbTransport<T: rusb::UsbContext> {
    handle: rusb::DeviceHandle<T>,
}

impl<T: rusb::UsbContext> RusbTransport<T> {
    pub fn new(handle: rusb::DeviceHandle<T>) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &rusb::DeviceHandle<T> {
        &self.handle
    }

    pub fn into_handle(self) -> rusb::DeviceHandle<T> {
        self.handle
    }
}

impl<T: rusb::UsbContext> std::fmt::Debug for RusbTransport<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RusbTransport").finish_non_exhaustive()
    }
}

impl<T: rusb::UsbContext> UsbTransport for RusbTransport<T> {
    fn control_out(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        payload: &[u8],
    ) -> Result<usize, rusb::Error> {
        self.handle
            .write_control(VENDOR_OUT, request, value, index, payload, TRANSFER_TIMEOUT)
    }

    fn control_in(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        length: u16,
    ) -> Result<Vec<u8>, rusb::Error> {
        let mut buf = vec![0u8; length as usize];
        let n = self
            .handle
            .read_control(VENDOR_IN, request, value, index, &mut buf, TRANSFER_TIMEOUT)?;
        buf.truncate(n);
        Ok(buf)
    }

    fn read_string_descriptor_ascii(&mut self, index: u8) -> Result<String, rusb::Error> {
        let languages = self.handle.read_languages(TRANSFER_TIMEOUT)?;
        let language = languages.first().copied().ok_or(rusb::Error::NotFound)?;
        self.handle
            .read_string_descriptor(language, index, TRANSFER_TIMEOUT)
    }
}

/// A single recorded call, kept for the write/verify tuple-equality and
/// chunk-discipline property tests in §8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Out {
        request: u8,
        value: u16,
        index: u16,
        payload: Vec<u8>,
    },
    In {
        request: u8,
        value: u16,
        index: u16,
        length: u16,
    },
}

/// An in-memory [`UsbTransport`] double used by this crate's own test suite.
///
/// Scripted IN responses are consumed in FIFO order; OUT calls always
/// "succeed" with the full payload length unless a forced failure has been
/// queued for that request.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct FakeTransport {
    pub calls: Vec<RecordedCall>,
    pub in_responses: std::collections::VecDeque<Result<Vec<u8>, rusb::Error>>,
    pub out_failures: std::collections::VecDeque<Result<usize, rusb::Error>>,
    pub strings: std::collections::HashMap<u8, String>,
}

#[cfg(test)]
impl FakeTransport {
    pub fn push_in(&mut self, response: Vec<u8>) {
        self.in_responses.push_back(Ok(response));
    }

    pub fn push_string(&mut self, index: u8, value: impl Into<String>) {
        self.strings.insert(index, value.into());
    }

    pub fn push_out_result(&mut self, result: Result<usize, rusb::Error>) {
        self.out_failures.push_back(result);
    }
}

#[cfg(test)]
impl UsbTransport for FakeTransport {
    fn control_out(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        payload: &[u8],
    ) -> Result<usize, rusb::Error> {
        self.calls.push(RecordedCall::Out {
            request,
            value,
            index,
            payload: payload.to_vec(),
        });
        self.out_failures
            .pop_front()
            .unwrap_or(Ok(payload.len()))
    }

    fn control_in(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        length: u16,
    ) -> Result<Vec<u8>, rusb::Error> {
        self.calls.push(RecordedCall::In {
            request,
            value,
            index,
            length,
        });
        self.in_responses
            .pop_front()
            .unwrap_or(Err(rusb::Error::NoDevice))
    }

    fn read_string_descriptor_ascii(&mut self, index: u8) -> Result<String, rusb::Error> {
        self.strings
            .get(&index)
            .cloned()
            .ok_or(rusb::Error::NotFound)
    }
}
