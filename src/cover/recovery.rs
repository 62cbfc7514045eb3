//! Saving covers after a failed rollback.
//!
//! When neither the new tag nor the original covers could be written, the
//! snapshot is the only copy of the original images left. They are written
//! to `<dir>/<audio file stem>/NN-<sha256 prefix>.<ext>` so they can be
//! re-added by hand.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use super::cover_digest;
use super::transaction::CoverArtSnapshot;
use crate::error::{Error, Result};

/// Hex digits of the digest kept in file names.
const DIGEST_PREFIX: usize = 12;

/// Directory used when the configuration does not name one.
pub fn default_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local"))
        .join("coverdrop")
        .join("recovery")
}

/// Write every snapshot cover to its own file and return the directory.
pub fn dump_snapshot(dir: &Path, audio_path: &Path, snapshot: &CoverArtSnapshot) -> Result<PathBuf> {
    let stem = audio_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string());
    let target = dir.join(stem);
    fs::create_dir_all(&target).map_err(|e| Error::write(&target, e))?;

    for (index, picture) in snapshot.covers.iter().enumerate() {
        let digest = cover_digest(picture);
        let name = format!(
            "{:02}-{}.{}",
            index + 1,
            &digest[..DIGEST_PREFIX],
            picture.mime_type.extension()
        );
        let path = target.join(name);
        fs::write(&path, &picture.data).map_err(|e| Error::write(&path, e))?;
    }

    info!(
        dir = %target.display(),
        covers = snapshot.len(),
        "Saved original covers for recovery"
    );
    Ok(target)
}
