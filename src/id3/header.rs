//! The 10-byte ID3v2 tag header.
//!
//! Structure:
//! bytes\[0..3]  => "ID3"
//! bytes\[3]     => major version (2, 3 or 4)
//! bytes\[4]     => revision, never 0xFF
//! bytes\[5]     => flags (0x80 unsync, 0x40 extended header, 0x10 footer)
//! bytes\[6..10] => synchsafe size of everything after the header,
//!                  excluding the footer

use super::TagVersion;

/// Length of the tag header (and of the v2.4 footer).
pub const HEADER_LEN: usize = 10;

/// Largest value a 28-bit synchsafe integer holds.
pub const SYNCHSAFE_MAX: u32 = 0x0FFF_FFFF;

const FLAG_UNSYNCHRONISATION: u8 = 0x80;
const FLAG_EXTENDED_HEADER: u8 = 0x40;
const FLAG_FOOTER: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagHeader {
    pub major: u8,
    pub revision: u8,
    pub flags: u8,
    /// Bytes after the header, footer excluded.
    pub size: u32,
}

impl TagHeader {
    /// Parse a header from the start of `bytes`.
    ///
    /// Returns `None` when the bytes do not begin with a valid header, which
    /// callers treat as "no tag".
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN || &bytes[0..3] != b"ID3" {
            return None;
        }
        let major = bytes[3];
        let revision = bytes[4];
        if !(2..=4).contains(&major) || revision == 0xFF {
            return None;
        }
        let size = decode_synchsafe([bytes[6], bytes[7], bytes[8], bytes[9]])?;
        Some(Self {
            major,
            revision,
            flags: bytes[5],
            size,
        })
    }

    /// Build the header for a tag body of `size` bytes.
    ///
    /// `size` must not exceed [`SYNCHSAFE_MAX`].
    pub fn new(version: TagVersion, size: u32) -> Self {
        Self {
            major: version.major(),
            revision: 0,
            flags: 0,
            size,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let size = encode_synchsafe(self.size);
        [
            b'I',
            b'D',
            b'3',
            self.major,
            self.revision,
            self.flags,
            size[0],
            size[1],
            size[2],
            size[3],
        ]
    }

    pub fn is_unsynchronised(&self) -> bool {
        self.flags & FLAG_UNSYNCHRONISATION != 0
    }

    pub fn has_extended_header(&self) -> bool {
        self.flags & FLAG_EXTENDED_HEADER != 0
    }

    /// Only v2.4 defines a footer.
    pub fn has_footer(&self) -> bool {
        self.major == 4 && self.flags & FLAG_FOOTER != 0
    }

    /// Total bytes the tag occupies at the start of the file.
    pub fn region_len(&self) -> u64 {
        let footer = if self.has_footer() { HEADER_LEN } else { 0 };
        (HEADER_LEN + footer) as u64 + u64::from(self.size)
    }
}

/// Decode a 4-byte synchsafe integer. `None` if any byte has its high bit set.
pub fn decode_synchsafe(bytes: [u8; 4]) -> Option<u32> {
    if bytes.iter().any(|b| b & 0x80 != 0) {
        return None;
    }
    Some(
        (u32::from(bytes[0]) << 21)
            | (u32::from(bytes[1]) << 14)
            | (u32::from(bytes[2]) << 7)
            | u32::from(bytes[3]),
    )
}

/// Encode the low 28 bits of `value` as a synchsafe integer.
pub fn encode_synchsafe(value: u32) -> [u8; 4] {
    [
        ((value >> 21) & 0x7F) as u8,
        ((value >> 14) & 0x7F) as u8,
        ((value >> 7) & 0x7F) as u8,
        (value & 0x7F) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synchsafe_known_values() {
        assert_eq!(encode_synchsafe(0), [0, 0, 0, 0]);
        assert_eq!(encode_synchsafe(127), [0, 0, 0, 0x7F]);
        assert_eq!(encode_synchsafe(128), [0, 0, 1, 0]);
        assert_eq!(encode_synchsafe(SYNCHSAFE_MAX), [0x7F; 4]);
        assert_eq!(decode_synchsafe([0, 0, 0x02, 0x01]), Some(257));
        assert_eq!(decode_synchsafe([0, 0, 0x80, 0]), None);
    }

    #[test]
    fn test_parse_header() {
        let bytes = [b'I', b'D', b'3', 3, 0, 0x40, 0, 0, 0x02, 0x01];
        let header = TagHeader::parse(&bytes).unwrap();
        assert_eq!(header.major, 3);
        assert_eq!(header.size, 257);
        assert!(header.has_extended_header());
        assert!(!header.is_unsynchronised());
        assert_eq!(header.region_len(), 267);
    }

    #[test]
    fn test_parse_rejects_non_tags() {
        assert!(TagHeader::parse(b"ID3").is_none());
        assert!(TagHeader::parse(&[0xFF, 0xFB, 0x90, 0, 0, 0, 0, 0, 0, 0]).is_none());
        // Major version 5 is not ID3v2
        assert!(TagHeader::parse(&[b'I', b'D', b'3', 5, 0, 0, 0, 0, 0, 0]).is_none());
        // Revision 0xFF is reserved
        assert!(TagHeader::parse(&[b'I', b'D', b'3', 3, 0xFF, 0, 0, 0, 0, 0]).is_none());
        // Size byte with the high bit set
        assert!(TagHeader::parse(&[b'I', b'D', b'3', 3, 0, 0, 0, 0, 0x80, 0]).is_none());
    }

    #[test]
    fn test_footer_only_counts_for_v24() {
        let v24 = TagHeader::parse(&[b'I', b'D', b'3', 4, 0, 0x10, 0, 0, 0, 20]).unwrap();
        assert_eq!(v24.region_len(), 40);
        let v23 = TagHeader::parse(&[b'I', b'D', b'3', 3, 0, 0x10, 0, 0, 0, 20]).unwrap();
        assert_eq!(v23.region_len(), 30);
    }

    #[test]
    fn test_header_bytes_roundtrip() {
        let header = TagHeader::new(TagVersion::V24, 4096);
        let parsed = TagHeader::parse(&header.to_bytes()).unwrap();
        assert_eq!(parsed, header);
    }
}
