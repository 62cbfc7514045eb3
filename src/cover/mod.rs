//! Cover art editing on an in-memory [`Tag`].
//!
//! [`CoverArtEditor`] reads, clears and appends picture frames; nothing here
//! touches the audio file. Writing the result back, with rollback, is the job
//! of [`TagTransaction`].
//!
//! # Design Principles
//!
//! - **All-or-nothing appends**: every image of a batch is loaded before the
//!   tag is touched
//! - **Other frames are untouched**: only `APIC` frames are added or removed
//! - **No global state**: the allowed image extensions are passed in at
//!   construction

pub mod recovery;
pub mod transaction;

pub use transaction::{
    CoverArtSnapshot, EditOp, Outcome, Summary, TagTransaction, TransactionOptions,
    TransactionState, run,
};

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::ImagesConfig;
use crate::error::{Error, Result};
use crate::id3::{Frame, PictureFrame, Tag};

/// Image extensions accepted when nothing is configured.
pub const DEFAULT_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Reads and rewrites the cover list of a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverArtEditor {
    allowed_extensions: Vec<String>,
}

impl Default for CoverArtEditor {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS)
    }
}

impl CoverArtEditor {
    /// Create an editor accepting images with the given extensions.
    ///
    /// Extensions are compared case-insensitively, with or without a
    /// leading dot.
    pub fn new<I, S>(allowed_extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed_extensions = allowed_extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { allowed_extensions }
    }

    pub fn from_config(config: &ImagesConfig) -> Self {
        Self::new(&config.allowed_extensions)
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    /// Whether `path` has one of the allowed image extensions.
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.allowed_extensions.iter().any(|allowed| *allowed == ext)
            })
            .unwrap_or(false)
    }

    /// Check image paths before any file is opened for writing.
    ///
    /// Reports the first path with a disallowed extension or that does not
    /// exist.
    pub fn validate_sources(&self, paths: &[PathBuf]) -> Result<()> {
        for path in paths {
            if !self.accepts(path) {
                return Err(Error::UnsupportedImage(path.clone()));
            }
            if !path.is_file() {
                return Err(Error::not_found(path));
            }
        }
        Ok(())
    }

    /// The tag's covers in order.
    pub fn get_covers<'t>(&self, tag: &'t Tag) -> Vec<&'t PictureFrame> {
        tag.pictures().collect()
    }

    /// Remove every cover, keeping all other frames. Returns how many were removed.
    pub fn clear_covers(&self, tag: &mut Tag) -> usize {
        let before = tag.frames.len();
        tag.frames.retain(|frame| !matches!(frame, Frame::Picture(_)));
        let removed = before - tag.frames.len();
        debug!(removed, "Cleared covers");
        removed
    }

    /// Load `images` in order and append them after the existing covers.
    ///
    /// The first image that cannot be loaded aborts the batch and the tag is
    /// left exactly as it was. Returns how many covers were appended.
    pub fn append_covers(&self, tag: &mut Tag, images: &[PathBuf]) -> Result<usize> {
        let mut loaded = Vec::with_capacity(images.len());
        for path in images {
            if !self.accepts(path) {
                return Err(Error::UnsupportedImage(path.clone()));
            }
            loaded.push(PictureFrame::load_from_image_file(path)?);
        }

        let added = loaded.len();
        tag.frames.extend(loaded.into_iter().map(Frame::from));
        debug!(added, "Appended covers");
        Ok(added)
    }
}

/// Lowercase hex SHA-256 of a cover's image bytes.
pub fn cover_digest(picture: &PictureFrame) -> String {
    format!("{:x}", Sha256::digest(&picture.data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id3::{MimeType, PictureType, TagVersion};
    use crate::test_utils::{cover, jpeg_bytes, png_bytes, tag_with_covers, text_frame, write_file};
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn test_accepts_is_case_insensitive() {
        let editor = CoverArtEditor::default();
        assert!(editor.accepts(Path::new("/covers/front.JPG")));
        assert!(editor.accepts(Path::new("front.jpeg")));
        assert!(editor.accepts(Path::new("front.Png")));
        assert!(!editor.accepts(Path::new("front.gif")));
        assert!(!editor.accepts(Path::new("front")));
    }

    #[test]
    fn test_configured_extensions_are_normalized() {
        let editor = CoverArtEditor::new([".GIF", " webp ", ""]);
        assert_eq!(editor.allowed_extensions(), &["gif", "webp"]);
        assert!(editor.accepts(Path::new("cover.gif")));
        assert!(!editor.accepts(Path::new("cover.jpg")));
    }

    #[test]
    fn test_validate_sources() {
        let temp = TempDir::new().unwrap();
        let editor = CoverArtEditor::default();
        let jpg = write_file(temp.path(), "front.jpg", &jpeg_bytes());
        let gif = write_file(temp.path(), "front.gif", b"GIF89a");

        editor.validate_sources(std::slice::from_ref(&jpg)).unwrap();

        let err = editor.validate_sources(&[jpg.clone(), gif]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedImage(_)));

        let missing = temp.path().join("missing.png");
        let err = editor.validate_sources(&[jpg, missing]).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_clear_keeps_other_frames() {
        let editor = CoverArtEditor::default();
        let mut tag = tag_with_covers(&[cover(MimeType::Jpeg, 1), cover(MimeType::Png, 2)]);

        assert_eq!(editor.clear_covers(&mut tag), 2);
        let ids: Vec<_> = tag.frames.iter().map(|f| f.id()).collect();
        assert_eq!(ids, vec!["TIT2", "TPE1"]);
        assert_eq!(editor.clear_covers(&mut tag), 0);
    }

    #[test]
    fn test_append_preserves_order() {
        let temp = TempDir::new().unwrap();
        let editor = CoverArtEditor::default();
        let existing = [cover(MimeType::Jpeg, 1), cover(MimeType::Jpeg, 2)];
        let mut tag = tag_with_covers(&existing);

        let a = write_file(temp.path(), "a.png", &png_bytes());
        let b = write_file(temp.path(), "b.jpg", &jpeg_bytes());
        let c = write_file(temp.path(), "c.JPEG", &[9; 8]);
        let added = editor.append_covers(&mut tag, &[a, b, c]).unwrap();
        assert_eq!(added, 3);

        let covers = editor.get_covers(&tag);
        assert_eq!(covers.len(), 5);
        assert_eq!(covers[0], &existing[0]);
        assert_eq!(covers[1], &existing[1]);
        assert_eq!(covers[2].data, png_bytes());
        assert_eq!(covers[3].data, jpeg_bytes());
        assert_eq!(covers[4].data, vec![9; 8]);
        assert_eq!(covers[4].mime_type, MimeType::Jpeg);
        assert!(covers[2..].iter().all(|c| c.picture_type == PictureType::FrontCover));
    }

    #[test]
    fn test_append_failure_leaves_tag_untouched() {
        let temp = TempDir::new().unwrap();
        let editor = CoverArtEditor::default();
        let good = write_file(temp.path(), "good.jpg", &jpeg_bytes());
        let empty = write_file(temp.path(), "empty.png", b"");
        let missing = temp.path().join("missing.jpg");
        let original = tag_with_covers(&[cover(MimeType::Png, 7)]);

        for bad in [empty, missing] {
            for k in 0..3 {
                let mut images = vec![good.clone(); 3];
                images[k] = bad.clone();
                let mut tag = original.clone();

                let err = editor.append_covers(&mut tag, &images).unwrap_err();
                assert!(err.is_load_error() || matches!(err, Error::NotFound(_)));
                assert_eq!(tag, original);
            }
        }
    }

    #[test]
    fn test_append_rejects_disallowed_extension() {
        let temp = TempDir::new().unwrap();
        let editor = CoverArtEditor::default();
        let gif = write_file(temp.path(), "cover.gif", b"GIF89a");
        let mut tag = Tag::new(TagVersion::V23);

        let err = editor.append_covers(&mut tag, &[gif]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedImage(_)));
        assert!(tag.is_empty());
    }

    #[test]
    fn test_cover_digest() {
        let picture = PictureFrame::front_cover(MimeType::Jpeg, b"abc".to_vec());
        assert_eq!(
            cover_digest(&picture),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    fn arbitrary_tag() -> impl Strategy<Value = Tag> {
        proptest::collection::vec((any::<bool>(), 1u8..=255), 0..8).prop_map(|layout| {
            let mut tag = Tag::new(TagVersion::V23);
            for (is_cover, marker) in layout {
                if is_cover {
                    tag.push(cover(MimeType::Jpeg, marker).into());
                } else {
                    tag.push(text_frame("TXXX", &marker.to_string()));
                }
            }
            tag
        })
    }

    proptest! {
        /// Clearing twice is the same as clearing once
        #[test]
        fn clear_is_idempotent(tag in arbitrary_tag()) {
            let editor = CoverArtEditor::default();
            let mut once = tag.clone();
            editor.clear_covers(&mut once);
            let mut twice = once.clone();
            editor.clear_covers(&mut twice);

            prop_assert_eq!(&once, &twice);
            prop_assert_eq!(once.pictures().count(), 0);
            prop_assert_eq!(
                once.frames.len(),
                tag.frames.len() - tag.pictures().count()
            );
        }
    }
}
