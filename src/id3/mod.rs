//! ID3v2 tag model and binary codec.
//!
//! Only the parts of ID3v2 needed to edit cover art are understood:
//! picture (`APIC`) frames are decoded, every other frame is carried through
//! a rewrite byte for byte.
//!
//! # Layout
//!
//! - [`header`]: the 10-byte tag header and synchsafe integers
//! - [`picture`]: `APIC` payload encode/decode and loading images from disk
//! - [`codec`]: whole-tag parse/serialize and the read/write/delete operations
//! - [`storage`]: the file-access abstraction the codec writes through

pub mod codec;
pub mod header;
pub mod picture;
pub mod storage;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use codec::{DeleteOutcome, delete_tag, read_tag, replace_tag_region, write_tag};
pub use picture::{MimeType, PictureFrame, PictureType};
pub use storage::{DiskFile, RegionFile};

/// Size of a v2.3/v2.4 frame header (id, size, flags).
pub const FRAME_HEADER_LEN: usize = 10;

/// ID3v2 versions this crate reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TagVersion {
    #[default]
    #[serde(rename = "2.3")]
    V23,
    #[serde(rename = "2.4")]
    V24,
}

impl TagVersion {
    /// Major version byte as stored in the header.
    pub fn major(self) -> u8 {
        match self {
            TagVersion::V23 => 3,
            TagVersion::V24 => 4,
        }
    }

    pub fn from_major(major: u8) -> Option<Self> {
        match major {
            3 => Some(TagVersion::V23),
            4 => Some(TagVersion::V24),
            _ => None,
        }
    }
}

impl fmt::Display for TagVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "2.{}", self.major())
    }
}

impl FromStr for TagVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "2.3" | "3" | "v2.3" => Ok(TagVersion::V23),
            "2.4" | "4" | "v2.4" => Ok(TagVersion::V24),
            other => Err(format!("unsupported ID3v2 version: {other}")),
        }
    }
}

/// What `write_tag` does when the file already has a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictAction {
    /// Replace the existing tag region.
    #[default]
    Replace,
    /// Leave the file alone and report [`Error::TagExists`](crate::error::Error::TagExists).
    Fail,
}

/// Options for serializing and writing a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    pub version: TagVersion,
    pub conflict: ConflictAction,
    /// Zero bytes appended after the last frame.
    pub padding: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            version: TagVersion::V23,
            conflict: ConflictAction::Replace,
            padding: 1024,
        }
    }
}

/// Why tag or frame bytes could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("no ID3v2 header")]
    MissingHeader,

    #[error("unexpected end of data while reading {0}")]
    Truncated(&'static str),

    #[error("ID3v2.{0} tags are not supported")]
    UnsupportedVersion(u8),

    #[error("unsynchronised tags are not supported")]
    Unsynchronised,

    #[error("invalid synchsafe size in {0}")]
    InvalidSize(&'static str),

    #[error("frame {id} overruns the tag region")]
    FrameOverrun { id: String },

    #[error("unknown text encoding {0:#04x}")]
    UnknownEncoding(u8),

    #[error("{0} is not terminated")]
    Unterminated(&'static str),

    #[error("invalid {0} text")]
    InvalidText(&'static str),

    #[error("picture frame has no image data")]
    EmptyImage,
}

/// An ID3v2 tag: a version and its frames in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub version: TagVersion,
    pub frames: Vec<Frame>,
}

impl Tag {
    /// An empty tag.
    pub fn new(version: TagVersion) -> Self {
        Self {
            version,
            frames: Vec::new(),
        }
    }

    /// Picture frames in order.
    pub fn pictures(&self) -> impl Iterator<Item = &PictureFrame> {
        self.frames.iter().filter_map(|frame| match frame {
            Frame::Picture(picture) => Some(picture),
            Frame::Other(_) => None,
        })
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// One frame of a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Picture(PictureFrame),
    Other(OtherFrame),
}

impl Frame {
    /// The four character frame id.
    pub fn id(&self) -> &str {
        match self {
            Frame::Picture(_) => "APIC",
            Frame::Other(other) => other.id_str(),
        }
    }
}

impl From<PictureFrame> for Frame {
    fn from(picture: PictureFrame) -> Self {
        Frame::Picture(picture)
    }
}

impl From<OtherFrame> for Frame {
    fn from(other: OtherFrame) -> Self {
        Frame::Other(other)
    }
}

// Status flags (first flag byte), in v2.3 and v2.4 positions.
const V23_STATUS_FLAGS: [u8; 3] = [0x80, 0x40, 0x20];
const V24_STATUS_FLAGS: [u8; 3] = [0x40, 0x20, 0x10];

/// A frame this crate does not interpret, kept byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtherFrame {
    pub id: [u8; 4],
    /// Raw flags as laid out in `version`.
    pub flags: u16,
    pub data: Vec<u8>,
    /// Version the flags were read in.
    pub version: TagVersion,
}

impl OtherFrame {
    pub fn new(id: [u8; 4], data: Vec<u8>, version: TagVersion) -> Self {
        Self {
            id,
            flags: 0,
            data,
            version,
        }
    }

    pub fn id_str(&self) -> &str {
        // Frame ids are validated as [A-Z0-9] when parsed
        std::str::from_utf8(&self.id).unwrap_or("????")
    }

    /// The flags to write when serializing as `target`.
    ///
    /// Status flags move to their position in the target version. Format
    /// flags describe how `data` is stored (compression, encryption, ...) and
    /// only mean the same thing in the version they were read in.
    pub fn flags_for(&self, target: TagVersion) -> crate::error::Result<u16> {
        if target == self.version {
            return Ok(self.flags);
        }
        let [status, format] = self.flags.to_be_bytes();
        if format != 0 {
            return Err(crate::error::Error::encode(
                self.id_str(),
                format!(
                    "format flags {format:#04x} from ID3v{} cannot be written as ID3v{target}",
                    self.version
                ),
            ));
        }
        let (from, to) = match self.version {
            TagVersion::V23 => (V23_STATUS_FLAGS, V24_STATUS_FLAGS),
            TagVersion::V24 => (V24_STATUS_FLAGS, V23_STATUS_FLAGS),
        };
        let translated = from
            .iter()
            .zip(to.iter())
            .filter(|(bit, _)| status & **bit != 0)
            .fold(0u8, |acc, (_, to_bit)| acc | to_bit);
        Ok(u16::from_be_bytes([translated, 0]))
    }
}

/// Frame ids are four characters from `A-Z0-9`.
pub fn is_valid_frame_id(id: &[u8]) -> bool {
    id.len() == 4 && id.iter().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}
