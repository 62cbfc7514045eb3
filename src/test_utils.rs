//! Test utilities and fixtures for coverdrop tests.
//!
//! This module provides fixture builders for tags, images and MP3 files, and
//! [`MemoryFile`], an in-memory [`RegionFile`] that can be told to fail
//! specific writes.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::{MemoryFile, fake_audio};
//!
//! let mut file = MemoryFile::new("song.mp3", fake_audio()).failing_writes([1]);
//! // write #0 succeeds, write #1 fails, write #2 succeeds
//! ```

use std::collections::BTreeSet;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::id3::codec::serialize_tag;
use crate::id3::{Frame, MimeType, OtherFrame, PictureFrame, RegionFile, Tag, TagVersion};

/// A few MPEG audio frame headers followed by silence.
pub fn fake_audio() -> Vec<u8> {
    let mut audio = Vec::with_capacity(3 * 417);
    for _ in 0..3 {
        audio.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x64]);
        audio.extend(std::iter::repeat_n(0u8, 413));
    }
    audio
}

/// A tiny byte string that starts and ends like a JPEG.
pub fn jpeg_bytes() -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];
    bytes.extend_from_slice(&[0x00; 16]);
    bytes.extend_from_slice(&[0xFF, 0xD9]);
    bytes
}

/// A tiny byte string that starts like a PNG.
pub fn png_bytes() -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(b"\x00\x00\x00\x0DIHDR");
    bytes.extend_from_slice(&[0x00; 13]);
    bytes
}

/// A front cover whose image bytes are `marker` repeated.
pub fn cover(mime_type: MimeType, marker: u8) -> PictureFrame {
    PictureFrame::front_cover(mime_type, vec![marker; 32])
}

/// A Latin-1 text frame.
pub fn text_frame(id: &str, text: &str) -> Frame {
    let mut data = vec![0u8];
    data.extend_from_slice(text.as_bytes());
    let id: [u8; 4] = id.as_bytes().try_into().expect("frame ids are 4 bytes");
    OtherFrame::new(id, data, TagVersion::V23).into()
}

/// A v2.3 tag with a title frame, the given covers, then an artist frame.
pub fn tag_with_covers(covers: &[PictureFrame]) -> Tag {
    let mut tag = Tag::new(TagVersion::V23);
    tag.push(text_frame("TIT2", "Test Track"));
    for picture in covers {
        tag.push(picture.clone().into());
    }
    tag.push(text_frame("TPE1", "Test Artist"));
    tag
}

/// Write `bytes` to `dir/name` and return the path.
pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("Failed to write fixture");
    path
}

/// Write an MP3 fixture: the tag (without padding) if any, then [`fake_audio`].
pub fn write_mp3(dir: &Path, name: &str, tag: Option<&Tag>) -> PathBuf {
    write_file(dir, name, &mp3_bytes(tag))
}

pub fn mp3_bytes(tag: Option<&Tag>) -> Vec<u8> {
    let mut bytes = match tag {
        Some(tag) => serialize_tag(tag, tag.version, 0).expect("Failed to serialize fixture tag"),
        None => Vec::new(),
    };
    bytes.extend_from_slice(&fake_audio());
    bytes
}

/// An in-memory [`RegionFile`].
///
/// Writes are numbered from zero; the ones listed with
/// [`failing_writes`](Self::failing_writes) fail without changing `bytes`.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    path: PathBuf,
    pub bytes: Vec<u8>,
    writes: usize,
    failing: BTreeSet<usize>,
}

impl MemoryFile {
    pub fn new(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            bytes,
            writes: 0,
            failing: BTreeSet::new(),
        }
    }

    /// A file holding `tag` (no padding) followed by [`fake_audio`].
    pub fn with_tag(path: impl Into<PathBuf>, tag: &Tag) -> Self {
        Self::new(path, mp3_bytes(Some(tag)))
    }

    pub fn failing_writes(mut self, writes: impl IntoIterator<Item = usize>) -> Self {
        self.failing.extend(writes);
        self
    }

    /// Number of write attempts so far, failed ones included.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl RegionFile for MemoryFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn read_region(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let start = (offset as usize).min(self.bytes.len());
        let end = start.saturating_add(len).min(self.bytes.len());
        Ok(self.bytes[start..end].to_vec())
    }

    fn replace_region(&mut self, range: Range<u64>, bytes: &[u8]) -> Result<()> {
        let index = self.writes;
        self.writes += 1;
        if self.failing.contains(&index) {
            return Err(Error::write(
                &self.path,
                std::io::Error::other(format!("injected failure on write #{index}")),
            ));
        }
        self.bytes
            .splice(range.start as usize..range.end as usize, bytes.iter().copied());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_audio_is_not_a_tag() {
        let audio = fake_audio();
        assert_eq!(&audio[..2], &[0xFF, 0xFB]);
        assert_ne!(&audio[..3], b"ID3");
    }

    #[test]
    fn test_memory_file_injected_failures() {
        let mut file = MemoryFile::new("song.mp3", b"audio".to_vec()).failing_writes([1]);

        file.replace_region(0..0, b"A").unwrap();
        let err = file.replace_region(0..0, b"B").unwrap_err();
        assert!(matches!(err, Error::Write { .. }));
        file.replace_region(0..1, b"C").unwrap();

        assert_eq!(file.bytes, b"Caudio");
        assert_eq!(file.writes(), 3);
    }

    #[test]
    fn test_tag_with_covers_layout() {
        let tag = tag_with_covers(&[cover(MimeType::Jpeg, 1), cover(MimeType::Png, 2)]);
        let ids: Vec<_> = tag.frames.iter().map(|f| f.id()).collect();
        assert_eq!(ids, vec!["TIT2", "APIC", "APIC", "TPE1"]);
    }
}
