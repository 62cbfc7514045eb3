//! Whole-tag parsing and serialization.
//!
//! [`read_tag`], [`write_tag`] and [`delete_tag`] work on the tag region at
//! the start of a [`RegionFile`]; the audio after it is never rewritten by
//! anything but a shift. A new tag region is always built completely in
//! memory before a single region replace.

use std::borrow::Cow;
use std::ops::Range;

use tracing::{debug, info, warn};

use super::header::{HEADER_LEN, SYNCHSAFE_MAX, TagHeader, decode_synchsafe, encode_synchsafe};
use super::picture::{PICTURE_FRAME_ID, PictureFrame};
use super::storage::RegionFile;
use super::{
    ConflictAction, DecodeError, FRAME_HEADER_LEN, Frame, OtherFrame, Tag, TagVersion,
    WriteOptions, is_valid_frame_id,
};
use crate::error::{Error, Result};

/// Result of [`delete_tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The tag region was removed.
    Deleted { bytes: u64 },
    /// There was no tag.
    NoOp,
}

/// Find the tag header at the start of the file, if there is one.
pub fn locate_tag<F: RegionFile + ?Sized>(file: &mut F) -> Result<Option<TagHeader>> {
    let head = file.read_region(0, HEADER_LEN)?;
    Ok(TagHeader::parse(&head))
}

/// Read the ID3v2 tag at the start of the file.
///
/// A file without a valid header has no tag: that is `Ok(None)`, not an
/// error. A header that is valid but followed by frames we cannot walk
/// safely is a [`Error::Decode`], so callers stop before rewriting it.
pub fn read_tag<F: RegionFile + ?Sized>(file: &mut F) -> Result<Option<Tag>> {
    let Some(header) = locate_tag(file)? else {
        debug!(path = %file.path().display(), "No ID3v2 tag");
        return Ok(None);
    };

    let region = file.read_region(0, header.region_len() as usize)?;
    let tag = parse_tag(&region).map_err(|e| Error::decode(file.path(), e))?;
    debug!(
        path = %file.path().display(),
        version = %tag.version,
        frames = tag.frames.len(),
        pictures = tag.pictures().count(),
        "Read ID3v2 tag"
    );
    Ok(Some(tag))
}

/// Serialize `tag` and put it at the start of the file.
///
/// With [`ConflictAction::Replace`] an existing tag region is replaced as a
/// whole; with [`ConflictAction::Fail`] an existing tag is left alone and
/// [`Error::TagExists`] returned.
pub fn write_tag<F: RegionFile + ?Sized>(
    file: &mut F,
    tag: &Tag,
    options: &WriteOptions,
) -> Result<()> {
    let bytes = serialize_tag(tag, options.version, options.padding)?;

    let range = match locate_tag(file)? {
        Some(_) if options.conflict == ConflictAction::Fail => {
            return Err(Error::TagExists(file.path().to_path_buf()));
        }
        Some(existing) => 0..existing.region_len(),
        None => 0..0,
    };

    replace_tag_region(file, range, &bytes)?;
    debug!(
        version = %options.version,
        frames = tag.frames.len(),
        "Wrote ID3v2 tag"
    );
    Ok(())
}

/// Put an already serialized tag region in place of `range`.
///
/// Unlike [`write_tag`] this does not look for a tag header, so a caller
/// that knows where its own region lies never touches the bytes after it.
pub fn replace_tag_region<F: RegionFile + ?Sized>(
    file: &mut F,
    range: Range<u64>,
    bytes: &[u8],
) -> Result<()> {
    file.replace_region(range.clone(), bytes)?;
    info!(
        path = %file.path().display(),
        old_bytes = range.end - range.start,
        new_bytes = bytes.len(),
        "Replaced tag region"
    );
    Ok(())
}

/// Remove the tag region, moving the audio to the start of the file.
pub fn delete_tag<F: RegionFile + ?Sized>(file: &mut F) -> Result<DeleteOutcome> {
    let Some(header) = locate_tag(file)? else {
        return Ok(DeleteOutcome::NoOp);
    };
    let bytes = header.region_len();
    file.replace_region(0..bytes, &[])?;
    info!(path = %file.path().display(), bytes, "Deleted ID3v2 tag");
    Ok(DeleteOutcome::Deleted { bytes })
}

/// Parse a complete tag region (header first).
pub fn parse_tag(bytes: &[u8]) -> std::result::Result<Tag, DecodeError> {
    let header = TagHeader::parse(bytes).ok_or(DecodeError::MissingHeader)?;
    let version =
        TagVersion::from_major(header.major).ok_or(DecodeError::UnsupportedVersion(header.major))?;
    if header.is_unsynchronised() {
        return Err(DecodeError::Unsynchronised);
    }

    let end = HEADER_LEN + header.size as usize;
    if bytes.len() < end {
        return Err(DecodeError::Truncated("tag body"));
    }

    let mut pos = HEADER_LEN;
    if header.has_extended_header() {
        pos += extended_header_len(&bytes[pos..end], version)?;
        if pos > end {
            return Err(DecodeError::Truncated("extended header"));
        }
    }

    let mut frames = Vec::new();
    while pos + FRAME_HEADER_LEN <= end {
        let head = &bytes[pos..pos + FRAME_HEADER_LEN];
        if !is_valid_frame_id(&head[..4]) {
            if head[0] != 0 {
                warn!(offset = pos, "Invalid frame id, treating the rest of the tag as padding");
            }
            break;
        }

        let id = [head[0], head[1], head[2], head[3]];
        let size_bytes = [head[4], head[5], head[6], head[7]];
        let size = match version {
            TagVersion::V23 => u32::from_be_bytes(size_bytes),
            TagVersion::V24 => {
                decode_synchsafe(size_bytes).ok_or(DecodeError::InvalidSize("frame header"))?
            }
        };
        let flags = u16::from_be_bytes([head[8], head[9]]);

        let data_start = pos + FRAME_HEADER_LEN;
        let data_end = data_start
            .checked_add(size as usize)
            .filter(|&e| e <= end)
            .ok_or_else(|| DecodeError::FrameOverrun {
                id: String::from_utf8_lossy(&id).into_owned(),
            })?;

        frames.push(decode_frame(id, flags, &bytes[data_start..data_end], version));
        pos = data_end;
    }

    Ok(Tag { version, frames })
}

/// Bytes taken by the extended header, including its size field.
fn extended_header_len(
    bytes: &[u8],
    version: TagVersion,
) -> std::result::Result<usize, DecodeError> {
    let size_bytes: [u8; 4] = bytes
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or(DecodeError::Truncated("extended header"))?;
    match version {
        // The v2.3 size excludes the size field itself
        TagVersion::V23 => Ok(u32::from_be_bytes(size_bytes) as usize + 4),
        TagVersion::V24 => decode_synchsafe(size_bytes)
            .map(|size| size as usize)
            .ok_or(DecodeError::InvalidSize("extended header")),
    }
}

/// True when the frame's data is stored as is (no compression, encryption, ...).
fn is_plain(flags: u16, version: TagVersion) -> bool {
    let [_, format] = flags.to_be_bytes();
    match version {
        TagVersion::V23 => format & 0xE0 == 0,
        TagVersion::V24 => format & 0x4F == 0,
    }
}

fn decode_frame(id: [u8; 4], flags: u16, data: &[u8], version: TagVersion) -> Frame {
    if id == PICTURE_FRAME_ID && is_plain(flags, version) {
        match PictureFrame::decode(data) {
            Ok(picture) => return Frame::Picture(picture),
            Err(e) => debug!("Keeping undecodable APIC frame as is: {}", e),
        }
    }
    Frame::Other(OtherFrame {
        id,
        flags,
        data: data.to_vec(),
        version,
    })
}

/// Serialize a tag region: header, frames in order, then `padding` zero bytes.
pub fn serialize_tag(tag: &Tag, version: TagVersion, padding: usize) -> Result<Vec<u8>> {
    let mut body = Vec::new();

    for frame in &tag.frames {
        let (id, flags, data): ([u8; 4], u16, Cow<'_, [u8]>) = match frame {
            Frame::Picture(picture) => (PICTURE_FRAME_ID, 0, Cow::Owned(picture.encode())),
            Frame::Other(other) => (other.id, other.flags_for(version)?, Cow::Borrowed(&other.data)),
        };

        let size = u32::try_from(data.len())
            .ok()
            .filter(|&s| version == TagVersion::V23 || s <= SYNCHSAFE_MAX)
            .ok_or_else(|| Error::encode(frame.id(), format!("{} bytes is too large", data.len())))?;
        let size_bytes = match version {
            TagVersion::V23 => size.to_be_bytes(),
            TagVersion::V24 => encode_synchsafe(size),
        };

        body.extend_from_slice(&id);
        body.extend_from_slice(&size_bytes);
        body.extend_from_slice(&flags.to_be_bytes());
        body.extend_from_slice(&data);
    }

    let total = body.len().saturating_add(padding);
    let size = u32::try_from(total)
        .ok()
        .filter(|&s| s <= SYNCHSAFE_MAX)
        .ok_or_else(|| Error::encode("tag", format!("{} bytes exceeds the ID3v2 limit", total)))?;
    body.resize(total, 0);

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&TagHeader::new(version, size).to_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}
