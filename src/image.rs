//! Parses the vendor firmware image format into a stream of sections
//! terminated by an entry record.
//!
//! Decoding never aliases the byte buffer as `u32`s -- every multi-byte
//! field goes through an explicit little-endian load, so this is correct on
//! big-endian hosts too (§9's "raw pointer walking" redesign flag).

use crate::error::FxError;

const MAGIC: [u8; 2] = *b"CY";
const IMAGE_TYPE_NORMAL_WITH_CHECKSUM: u8 = 0xB0;

/// One `{address, payload}` record in the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub address: u32,
    pub payload: Vec<u8>,
}

/// The terminal record: jump target for the just-downloaded code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRecord {
    pub entry_address: u32,
}

/// One item from the section stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    Section(Section),
    Entry(EntryRecord),
}

/// A lazy reader over an immutable image buffer.
///
/// Yields `Section`s, then exactly one `Entry`, then ends. If the buffer
/// runs out before the next `len` field or before the terminal entry
/// address, the stream ends silently (`None`) -- matching the reference
/// tool's behavior of simply stopping. If the buffer runs out in the middle
/// of a section (a short address or a short payload), that is a hard
/// [`FxError::TruncatedImage`].
pub struct ImageReader<'a> {
    buf: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> ImageReader<'a> {
    /// Validates the header and returns a reader positioned at the first
    /// section record.
    pub fn new(buf: &'a [u8]) -> Result<Self, FxError> {
        if buf.len() < 4 || buf[0..2] != MAGIC {
            return Err(FxError::InvalidHeader);
        }
        let image_ctl = buf[2];
        if image_ctl & 0x01 != 0 {
            return Err(FxError::NotExecutable);
        }
        let image_type = buf[3];
        if image_type != IMAGE_TYPE_NORMAL_WITH_CHECKSUM {
            return Err(FxError::UnsupportedImageType(image_type));
        }
        Ok(Self {
            buf,
            pos: 4,
            done: false,
        })
    }

    fn take_u32(&mut self) -> Option<u32> {
        let end = self.pos.checked_add(4)?;
        let bytes = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(u32::from_le_bytes(bytes.try_into().unwrap()))
    }
}

impl<'a> Iterator for ImageReader<'a> {
    type Item = Result<StreamItem, FxError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let len = match self.take_u32() {
            Some(len) => len,
            None => {
                // Ran out of stream before the next length field: silent stop.
                self.done = true;
                return None;
            }
        };

        if len == 0 {
            self.done = true;
            return self.take_u32().map(|entry_address| {
                Ok(StreamItem::Entry(EntryRecord { entry_address }))
            });
            // `None` here (entry address itself missing) is also a silent
            // stop, per §9: the final step is forgiven, not a hard error.
        }

        let address = match self.take_u32() {
            Some(address) => address,
            None => {
                self.done = true;
                return Some(Err(FxError::TruncatedImage));
            }
        };

        let byte_len = len as usize * 4;
        let end = match self.pos.checked_add(byte_len) {
            Some(end) if end <= self.buf.len() => end,
            _ => {
                self.done = true;
                return Some(Err(FxError::TruncatedImage));
            }
        };
        let payload = self.buf[self.pos..end].to_vec();
        self.pos = end;

        Some(Ok(StreamItem::Section(Section { address, payload })))
    }
}
