//! Application-wide error types.
//!
//! Library modules return [`Error`] via `thiserror`, while the CLI and
//! `main` use `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error`]: Top-level error enum for tag and cover operations
//! - [`DecodeError`](crate::id3::DecodeError) for malformed tag bytes
//! - Only [`Error::PermissionDenied`] is worth retrying (see [`Error::is_retryable`])
//!
//! # Example
//!
//! ```ignore
//! use coverdrop::error::{Error, Result};
//!
//! fn covers_of(path: &Path) -> Result<usize> {
//!     let mut file = DiskFile::open_read_only(path)?;
//!     let tag = codec::read_tag(&mut file)?;
//!     Ok(tag.map(|t| t.pictures().count()).unwrap_or(0))
//! }
//! ```

use std::path::PathBuf;

use crate::id3::DecodeError;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The file exists but cannot be opened or replaced with our rights.
    #[error("Permission denied for {path}: {source}")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading the audio file failed
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Replacing the tag region failed
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The existing tag cannot be parsed safely
    #[error("Malformed ID3v2 tag in {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    /// A frame cannot be represented in the requested tag version
    #[error("Cannot encode frame {frame}: {message}")]
    Encode { frame: String, message: String },

    /// An image file could not be read
    #[error("Failed to load image {path}: {source}")]
    LoadImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An image file has no content
    #[error("Image file is empty: {0}")]
    EmptyImage(PathBuf),

    /// An image file has an extension outside the allowed list
    #[error("Unsupported image extension: {0}")]
    UnsupportedImage(PathBuf),

    /// File not found
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// A tag already exists and the write was not allowed to replace it
    #[error("An ID3v2 tag already exists in {0}")]
    TagExists(PathBuf),

    /// Operation called in a state that does not allow it
    #[error("Cannot {operation} a transaction that is {state}")]
    InvalidTransition {
        operation: &'static str,
        state: &'static str,
    },

    /// Commit failed and so did the rollback that followed it.
    ///
    /// The on-disk tag is indeterminate. `recovery` points at a directory
    /// holding the covers that were present before the transaction, when
    /// they could be saved.
    #[error(
        "Writing the tag failed ({write}) and restoring the original covers also failed ({rollback})"
    )]
    DualFailure {
        write: Box<Error>,
        rollback: Box<Error>,
        recovery: Option<PathBuf>,
    },

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Map an I/O error raised while reading `path`.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path, source },
            std::io::ErrorKind::NotFound => Self::NotFound(path),
            _ => Self::Read { path, source },
        }
    }

    /// Map an I/O error raised while writing `path`.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied { path, source }
        } else {
            Self::Write { path, source }
        }
    }

    /// Create a decode error for `path`.
    pub fn decode(path: impl Into<PathBuf>, source: DecodeError) -> Self {
        Self::Decode {
            path: path.into(),
            source,
        }
    }

    /// Create an encode error.
    pub fn encode(frame: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Encode {
            frame: frame.into(),
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound(path.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// Strip any [`Error::WithContext`] wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether a caller may retry after acquiring more rights.
    ///
    /// Privilege escalation is the caller's business; this crate only
    /// reports the condition.
    pub fn is_retryable(&self) -> bool {
        matches!(self.root(), Self::PermissionDenied { .. })
    }

    /// Bad input image: the operation aborts before anything is written.
    pub fn is_load_error(&self) -> bool {
        matches!(
            self.root(),
            Self::LoadImage { .. } | Self::EmptyImage(_) | Self::UnsupportedImage(_)
        )
    }

    /// Both the commit and its rollback failed.
    pub fn is_dual_failure(&self) -> bool {
        matches!(self.root(), Self::DualFailure { .. })
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}
