//! Attached picture (`APIC`) frames.
//!
//! Payload layout:
//! - text encoding byte
//! - MIME type, Latin-1, NUL terminated
//! - picture type byte
//! - description in the declared encoding, terminated
//! - image bytes up to the end of the frame

use std::fmt;
use std::path::Path;

use tracing::debug;

use super::DecodeError;
use crate::error::{Error, Result};

/// Frame id of attached pictures in v2.3/v2.4.
pub const PICTURE_FRAME_ID: [u8; 4] = *b"APIC";

const ENCODING_LATIN1: u8 = 0;
const ENCODING_UTF16: u8 = 1;
const ENCODING_UTF16BE: u8 = 2;
const ENCODING_UTF8: u8 = 3;

/// The role of a picture, according to ID3v2 APIC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PictureType {
    Other,
    FileIcon,
    OtherFileIcon,
    FrontCover,
    BackCover,
    Leaflet,
    Media,
    LeadArtist,
    Artist,
    Conductor,
    Band,
    Composer,
    Lyricist,
    RecordingLocation,
    DuringRecording,
    DuringPerformance,
    ScreenCapture,
    BrightFish,
    Illustration,
    BandLogo,
    PublisherLogo,
    /// A type byte outside 0x00..=0x14, kept as is.
    Undefined(u8),
}

impl PictureType {
    const NAMED: [PictureType; 21] = [
        PictureType::Other,
        PictureType::FileIcon,
        PictureType::OtherFileIcon,
        PictureType::FrontCover,
        PictureType::BackCover,
        PictureType::Leaflet,
        PictureType::Media,
        PictureType::LeadArtist,
        PictureType::Artist,
        PictureType::Conductor,
        PictureType::Band,
        PictureType::Composer,
        PictureType::Lyricist,
        PictureType::RecordingLocation,
        PictureType::DuringRecording,
        PictureType::DuringPerformance,
        PictureType::ScreenCapture,
        PictureType::BrightFish,
        PictureType::Illustration,
        PictureType::BandLogo,
        PictureType::PublisherLogo,
    ];

    pub fn from_u8(byte: u8) -> Self {
        Self::NAMED
            .get(usize::from(byte))
            .copied()
            .unwrap_or(PictureType::Undefined(byte))
    }

    pub fn as_u8(self) -> u8 {
        match self {
            PictureType::Undefined(byte) => byte,
            named => Self::NAMED
                .iter()
                .position(|t| *t == named)
                .map(|i| i as u8)
                .unwrap_or(0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PictureType::Other => "other",
            PictureType::FileIcon => "file icon",
            PictureType::OtherFileIcon => "other file icon",
            PictureType::FrontCover => "front cover",
            PictureType::BackCover => "back cover",
            PictureType::Leaflet => "leaflet",
            PictureType::Media => "media",
            PictureType::LeadArtist => "lead artist",
            PictureType::Artist => "artist",
            PictureType::Conductor => "conductor",
            PictureType::Band => "band",
            PictureType::Composer => "composer",
            PictureType::Lyricist => "lyricist",
            PictureType::RecordingLocation => "recording location",
            PictureType::DuringRecording => "during recording",
            PictureType::DuringPerformance => "during performance",
            PictureType::ScreenCapture => "screen capture",
            PictureType::BrightFish => "bright coloured fish",
            PictureType::Illustration => "illustration",
            PictureType::BandLogo => "band logotype",
            PictureType::PublisherLogo => "publisher logotype",
            PictureType::Undefined(_) => "undefined",
        }
    }
}

impl fmt::Display for PictureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PictureType::Undefined(byte) => write!(f, "undefined ({byte:#04x})"),
            named => f.write_str(named.as_str()),
        }
    }
}

/// MIME type of a picture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MimeType {
    Jpeg,
    Png,
    /// `image/`: the placeholder used for images of unknown format.
    Generic,
    /// Any other value read from an existing frame, kept verbatim.
    Other(String),
}

impl MimeType {
    /// Exact match on the canonical strings; anything else is kept as is.
    pub fn parse(mime: &str) -> Self {
        match mime {
            "image/jpeg" => MimeType::Jpeg,
            "image/png" => MimeType::Png,
            "image/" => MimeType::Generic,
            other => MimeType::Other(other.to_owned()),
        }
    }

    /// MIME type for an image file, from its extension (case-insensitive).
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("png") => MimeType::Png,
            Some("jpg") | Some("jpeg") => MimeType::Jpeg,
            _ => MimeType::Generic,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MimeType::Jpeg => "image/jpeg",
            MimeType::Png => "image/png",
            MimeType::Generic => "image/",
            MimeType::Other(other) => other,
        }
    }

    /// File extension to use when saving the image.
    pub fn extension(&self) -> &'static str {
        match self {
            MimeType::Jpeg => "jpg",
            MimeType::Png => "png",
            MimeType::Generic | MimeType::Other(_) => "bin",
        }
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An embedded picture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureFrame {
    pub picture_type: PictureType,
    pub mime_type: MimeType,
    /// Free text. NUL characters cannot be stored and are dropped on encode.
    pub description: String,
    /// Raw image bytes, never empty.
    pub data: Vec<u8>,
}

impl PictureFrame {
    /// A front cover with an empty description.
    pub fn front_cover(mime_type: MimeType, data: Vec<u8>) -> Self {
        Self {
            picture_type: PictureType::FrontCover,
            mime_type,
            description: String::new(),
            data,
        }
    }

    /// Build a front cover from an image file.
    ///
    /// The MIME type comes from the file extension: `.png` is `image/png`,
    /// `.jpg`/`.jpeg` is `image/jpeg`, anything else gets the generic
    /// `image/` placeholder.
    pub fn load_from_image_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|source| Error::LoadImage {
            path: path.to_path_buf(),
            source,
        })?;
        if data.is_empty() {
            return Err(Error::EmptyImage(path.to_path_buf()));
        }
        let mime_type = MimeType::from_path(path);
        debug!(path = %path.display(), %mime_type, bytes = data.len(), "Loaded cover image");
        Ok(Self::front_cover(mime_type, data))
    }

    /// Decode an `APIC` payload.
    pub fn decode(payload: &[u8]) -> std::result::Result<Self, DecodeError> {
        let (&encoding, rest) = payload
            .split_first()
            .ok_or(DecodeError::Truncated("picture encoding"))?;
        if encoding > ENCODING_UTF8 {
            return Err(DecodeError::UnknownEncoding(encoding));
        }

        let mime_end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeError::Unterminated("MIME type"))?;
        let mime: String = rest[..mime_end].iter().map(|&b| char::from(b)).collect();
        let rest = &rest[mime_end + 1..];

        let (&type_byte, rest) = rest
            .split_first()
            .ok_or(DecodeError::Truncated("picture type"))?;

        let (description, data) = split_text(encoding, rest)?;
        if data.is_empty() {
            return Err(DecodeError::EmptyImage);
        }

        Ok(Self {
            picture_type: PictureType::from_u8(type_byte),
            mime_type: MimeType::parse(&mime),
            description,
            data: data.to_vec(),
        })
    }

    /// Encode as an `APIC` payload.
    ///
    /// Descriptions that fit Latin-1 are written as Latin-1, others as UTF-16
    /// with a byte order mark, which both v2.3 and v2.4 accept.
    pub fn encode(&self) -> Vec<u8> {
        // NUL terminates both strings, so it must not appear inside them
        let description: String = self.description.chars().filter(|&c| c != '\0').collect();
        let latin1 = description.chars().all(|c| u32::from(c) <= 0xFF);
        let mut out = Vec::with_capacity(
            self.mime_type.as_str().len() + description.len() * 2 + self.data.len() + 8,
        );

        out.push(if latin1 {
            ENCODING_LATIN1
        } else {
            ENCODING_UTF16
        });
        out.extend(
            self.mime_type
                .as_str()
                .chars()
                .filter(|&c| c != '\0')
                .map(latin1_byte),
        );
        out.push(0);
        out.push(self.picture_type.as_u8());

        if latin1 {
            out.extend(description.chars().map(latin1_byte));
            out.push(0);
        } else {
            out.extend_from_slice(&[0xFF, 0xFE]);
            for unit in description.encode_utf16() {
                out.extend_from_slice(&unit.to_le_bytes());
            }
            out.extend_from_slice(&[0, 0]);
        }

        out.extend_from_slice(&self.data);
        out
    }
}

fn latin1_byte(c: char) -> u8 {
    u8::try_from(u32::from(c)).unwrap_or(b'?')
}

/// Split a terminated string in `encoding` off the front of `bytes`.
fn split_text(encoding: u8, bytes: &[u8]) -> std::result::Result<(String, &[u8]), DecodeError> {
    match encoding {
        ENCODING_LATIN1 | ENCODING_UTF8 => {
            let end = bytes
                .iter()
                .position(|&b| b == 0)
                .ok_or(DecodeError::Unterminated("description"))?;
            let text = if encoding == ENCODING_LATIN1 {
                bytes[..end].iter().map(|&b| char::from(b)).collect()
            } else {
                String::from_utf8(bytes[..end].to_vec())
                    .map_err(|_| DecodeError::InvalidText("UTF-8"))?
            };
            Ok((text, &bytes[end + 1..]))
        }
        ENCODING_UTF16 | ENCODING_UTF16BE => {
            let end = bytes
                .chunks_exact(2)
                .position(|pair| pair == [0, 0])
                .map(|i| i * 2)
                .ok_or(DecodeError::Unterminated("description"))?;
            let text = decode_utf16(encoding, &bytes[..end])?;
            Ok((text, &bytes[end + 2..]))
        }
        other => Err(DecodeError::UnknownEncoding(other)),
    }
}

fn decode_utf16(encoding: u8, bytes: &[u8]) -> std::result::Result<String, DecodeError> {
    let (little_endian, body) = match bytes {
        [0xFF, 0xFE, body @ ..] if encoding == ENCODING_UTF16 => (true, body),
        [0xFE, 0xFF, body @ ..] if encoding == ENCODING_UTF16 => (false, body),
        // A missing BOM is read as big-endian
        body => (false, body),
    };
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| {
            if little_endian {
                u16::from_le_bytes([pair[0], pair[1]])
            } else {
                u16::from_be_bytes([pair[0], pair[1]])
            }
        })
        .collect();
    String::from_utf16(&units).map_err(|_| DecodeError::InvalidText("UTF-16"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{jpeg_bytes, png_bytes, write_file};
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn test_encode_known_layout() {
        let picture = PictureFrame {
            picture_type: PictureType::FrontCover,
            mime_type: MimeType::Jpeg,
            description: "cover".to_string(),
            data: vec![0xFF, 0xD8],
        };
        let mut expected = vec![0u8];
        expected.extend_from_slice(b"image/jpeg\0");
        expected.push(3);
        expected.extend_from_slice(b"cover\0");
        expected.extend_from_slice(&[0xFF, 0xD8]);
        assert_eq!(picture.encode(), expected);
    }

    #[test]
    fn test_decode_utf16_big_endian_description() {
        let mut payload = vec![ENCODING_UTF16];
        payload.extend_from_slice(b"image/png\0");
        payload.push(4);
        payload.extend_from_slice(&[0xFE, 0xFF, 0x00, b'B', 0x00, b'k', 0, 0]);
        payload.extend_from_slice(&[0x89, b'P']);

        let picture = PictureFrame::decode(&payload).unwrap();
        assert_eq!(picture.picture_type, PictureType::BackCover);
        assert_eq!(picture.mime_type, MimeType::Png);
        assert_eq!(picture.description, "Bk");
        assert_eq!(picture.data, vec![0x89, b'P']);
    }

    #[test]
    fn test_decode_utf8_description() {
        let mut payload = vec![ENCODING_UTF8];
        payload.extend_from_slice(b"image/jpeg\0");
        payload.push(3);
        payload.extend_from_slice("café\0".as_bytes());
        payload.push(0xAA);

        let picture = PictureFrame::decode(&payload).unwrap();
        assert_eq!(picture.description, "café");
        assert_eq!(picture.data, vec![0xAA]);
    }

    #[test]
    fn test_decode_rejects_malformed_payloads() {
        assert_eq!(
            PictureFrame::decode(&[]),
            Err(DecodeError::Truncated("picture encoding"))
        );
        assert_eq!(
            PictureFrame::decode(&[9, b'x', 0]),
            Err(DecodeError::UnknownEncoding(9))
        );
        assert_eq!(
            PictureFrame::decode(b"\0image/jpeg"),
            Err(DecodeError::Unterminated("MIME type"))
        );
        assert_eq!(
            PictureFrame::decode(b"\0image/jpeg\0"),
            Err(DecodeError::Truncated("picture type"))
        );
        assert_eq!(
            PictureFrame::decode(b"\0image/jpeg\0\x03no terminator"),
            Err(DecodeError::Unterminated("description"))
        );
        assert_eq!(
            PictureFrame::decode(b"\0image/jpeg\0\x03desc\0"),
            Err(DecodeError::EmptyImage)
        );
    }

    #[test]
    fn test_unknown_mime_and_type_are_kept() {
        let picture = PictureFrame {
            picture_type: PictureType::Undefined(0x42),
            mime_type: MimeType::Other("-->".to_string()),
            description: String::new(),
            data: b"http://example.com/cover.jpg".to_vec(),
        };
        let decoded = PictureFrame::decode(&picture.encode()).unwrap();
        assert_eq!(decoded, picture);
        assert_eq!(decoded.mime_type.extension(), "bin");
    }

    #[test]
    fn test_nul_in_text_does_not_shift_image_bytes() {
        let picture = PictureFrame {
            picture_type: PictureType::FrontCover,
            mime_type: MimeType::Other("image/x\0y".to_string()),
            description: "a\0b".to_string(),
            data: jpeg_bytes(),
        };
        let decoded = PictureFrame::decode(&picture.encode()).unwrap();
        assert_eq!(decoded.mime_type, MimeType::Other("image/xy".to_string()));
        assert_eq!(decoded.description, "ab");
        assert_eq!(decoded.data, jpeg_bytes());

        let wide = PictureFrame {
            description: "\u{263A}\0!".to_string(),
            ..picture
        };
        let decoded = PictureFrame::decode(&wide.encode()).unwrap();
        assert_eq!(decoded.description, "\u{263A}!");
        assert_eq!(decoded.data, jpeg_bytes());
    }

    #[test]
    fn test_mime_from_extension() {
        assert_eq!(MimeType::from_path(Path::new("a.png")), MimeType::Png);
        assert_eq!(MimeType::from_path(Path::new("a.PNG")), MimeType::Png);
        assert_eq!(MimeType::from_path(Path::new("a.jpg")), MimeType::Jpeg);
        assert_eq!(MimeType::from_path(Path::new("a.JPEG")), MimeType::Jpeg);
        assert_eq!(MimeType::from_path(Path::new("a.gif")), MimeType::Generic);
        assert_eq!(MimeType::from_path(Path::new("cover")), MimeType::Generic);
        assert_eq!(MimeType::Generic.as_str(), "image/");
    }

    #[test]
    fn test_picture_type_bytes() {
        assert_eq!(PictureType::from_u8(3), PictureType::FrontCover);
        assert_eq!(PictureType::FrontCover.as_u8(), 3);
        assert_eq!(PictureType::PublisherLogo.as_u8(), 0x14);
        assert_eq!(PictureType::from_u8(0x15), PictureType::Undefined(0x15));
        assert_eq!(PictureType::Undefined(0x15).as_u8(), 0x15);
    }

    #[test]
    fn test_load_from_image_file() {
        let temp = TempDir::new().unwrap();
        let path = write_file(temp.path(), "Cover.PNG", &png_bytes());

        let picture = PictureFrame::load_from_image_file(&path).unwrap();
        assert_eq!(picture.picture_type, PictureType::FrontCover);
        assert_eq!(picture.mime_type, MimeType::Png);
        assert!(picture.description.is_empty());
        assert_eq!(picture.data, png_bytes());

        let jpeg = write_file(temp.path(), "front.jpeg", &jpeg_bytes());
        assert_eq!(
            PictureFrame::load_from_image_file(&jpeg).unwrap().mime_type,
            MimeType::Jpeg
        );
    }

    #[test]
    fn test_load_from_missing_or_empty_file() {
        let temp = TempDir::new().unwrap();

        let missing = temp.path().join("missing.jpg");
        let err = PictureFrame::load_from_image_file(&missing).unwrap_err();
        assert!(matches!(err, Error::LoadImage { .. }));

        let empty = write_file(temp.path(), "empty.jpg", &[]);
        let err = PictureFrame::load_from_image_file(&empty).unwrap_err();
        assert!(matches!(err, Error::EmptyImage(_)));
        assert!(err.is_load_error());
    }

    fn arbitrary_mime() -> impl Strategy<Value = MimeType> {
        prop_oneof![
            Just(MimeType::Jpeg),
            Just(MimeType::Png),
            Just(MimeType::Generic),
            "[a-z/+.-]{0,20}"
                .prop_filter("canonical strings decode to named variants", |s| {
                    !matches!(s.as_str(), "image/jpeg" | "image/png" | "image/")
                })
                .prop_map(MimeType::Other),
        ]
    }

    fn arbitrary_picture() -> impl Strategy<Value = PictureFrame> {
        (
            any::<u8>(),
            arbitrary_mime(),
            // Any text without NUL, which terminates the description
            "[^\\x00]{0,24}",
            proptest::collection::vec(any::<u8>(), 1..256),
        )
            .prop_map(|(kind, mime_type, description, data)| PictureFrame {
                picture_type: PictureType::from_u8(kind),
                mime_type,
                description,
                data,
            })
    }

    proptest! {
        /// Decoding an encoded picture gives back the same picture
        #[test]
        fn picture_roundtrip(picture in arbitrary_picture()) {
            let decoded = PictureFrame::decode(&picture.encode());
            prop_assert_eq!(decoded, Ok(picture));
        }

        /// Decoding never panics on arbitrary bytes
        #[test]
        fn decode_arbitrary_bytes(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = PictureFrame::decode(&bytes);
        }
    }
}
