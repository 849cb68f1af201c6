//! Builds the USB String Descriptor the device side of this protocol
//! answers a `GET_DESCRIPTOR(STRING)` request with (§4.8).
//!
//! This has no callers elsewhere in the crate -- it exists so a test
//! harness (or a firmware author) can assert the exact wire bytes this tool
//! expects to see, without depending on anything else in the core.

const DESCRIPTOR_TYPE_STRING: u8 = 0x03;
const MAX_DESCRIPTOR_LEN: usize = 64;

/// Encodes `"Domesday Duplicator (<commit>)"` as a USB String Descriptor
/// body, truncating (at a UTF-16 code-unit boundary) if the header plus
/// body would exceed 64 bytes.
pub fn build_string_descriptor(commit: &str) -> Vec<u8> {
    let text = format!("Domesday Duplicator ({commit})");
    let units: Vec<u16> = text.encode_utf16().collect();

    let max_units = (MAX_DESCRIPTOR_LEN - 2) / 2;
    let truncated = &units[..units.len().min(max_units)];

    let mut out = Vec::with_capacity(2 + truncated.len() * 2);
    out.push((2 + truncated.len() * 2) as u8);
    out.push(DESCRIPTOR_TYPE_STRING);
    for unit in truncated {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_commit_fits_without_truncation() {
        let desc = build_string_descriptor("abc1234");
        assert_eq!(desc[1], DESCRIPTOR_TYPE_STRING);
        assert_eq!(desc[0] as usize, desc.len());
        assert!(desc.len() <= MAX_DESCRIPTOR_LEN);

        let body: Vec<u16> = desc[2..]
            .chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .collect();
        let text = String::from_utf16(&body).unwrap();
        assert_eq!(text, "Domesday Duplicator (abc1234)");
    }

    #[test]
    fn long_commit_is_truncated_to_64_bytes() {
        let commit = "a".repeat(100);
        let desc = build_string_descriptor(&commit);
        assert!(desc.len() <= MAX_DESCRIPTOR_LEN);
        assert_eq!(desc[0] as usize, desc.len());
        assert_eq!((desc.len() - 2) % 2, 0);
    }
}
