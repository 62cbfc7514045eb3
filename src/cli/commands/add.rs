//! Cover adding command.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::info;

use super::check_mp3;
use crate::config::{Config, CoverMode};
use crate::cover::{self, CoverArtEditor, EditOp, Outcome, Summary};
use crate::id3::DiskFile;

/// Add `images` to the MP3 file and return the message to show.
pub fn cmd_add(
    config: &Config,
    mp3: &Path,
    images: &[PathBuf],
    mode: CoverMode,
) -> anyhow::Result<String> {
    check_mp3(mp3)?;
    let editor = CoverArtEditor::from_config(&config.images);
    editor.validate_sources(images).with_context(|| {
        format!(
            "Some of the given images cannot be used (allowed extensions: {})",
            editor.allowed_extensions().join(", ")
        )
    })?;

    let mut file = DiskFile::open(mp3)?;
    let ops = match mode {
        CoverMode::Replace => vec![EditOp::Clear, EditOp::Append(images.to_vec())],
        CoverMode::Append => vec![EditOp::Append(images.to_vec())],
    };
    info!(path = %mp3.display(), images = images.len(), ?mode, "Adding covers");

    finish(mp3, cover::run(&mut file, &editor, config.transaction_options(), ops))
}

/// Turn a transaction outcome into the user message or an error.
pub(crate) fn finish(mp3: &Path, outcome: Outcome) -> anyhow::Result<String> {
    match outcome {
        Outcome::Committed(summary) => Ok(success_message(mp3, &summary)),
        Outcome::RolledBack { reason } => Err(anyhow::Error::new(reason)
            .context("Failed to write covers to the MP3 file; the original covers were restored")),
        Outcome::Failed {
            reason,
            dual_failure: true,
        } => Err(anyhow::Error::new(reason).context(
            "Failed to write covers to the MP3 file and failed to restore the original covers",
        )),
        Outcome::Failed { reason, .. } => Err(reason.into()),
    }
}

fn success_message(mp3: &Path, summary: &Summary) -> String {
    let path = mp3.display();
    if summary.removed > 0 {
        format!(
            "Removed {} cover(s) and added {} cover(s) to \"{}\".",
            summary.removed, summary.added, path
        )
    } else if summary.total > summary.added {
        format!(
            "Added {} cover(s), now there are {} covers in \"{}\".",
            summary.added, summary.total, path
        )
    } else {
        format!("Added {} cover(s) to \"{}\".", summary.added, path)
    }
}
