//! Cover removal command.

use std::path::Path;

use super::check_mp3;
use crate::config::Config;
use crate::cover::{self, CoverArtEditor, EditOp, Outcome};
use crate::id3::DiskFile;

/// Remove every cover from the MP3 file
pub fn cmd_clear(config: &Config, mp3: &Path) -> anyhow::Result<String> {
    check_mp3(mp3)?;
    let editor = CoverArtEditor::from_config(&config.images);
    let mut file = DiskFile::open(mp3)?;

    match cover::run(
        &mut file,
        &editor,
        config.transaction_options(),
        vec![EditOp::Clear],
    ) {
        Outcome::Committed(summary) => Ok(format!(
            "Removed {} cover(s) from \"{}\".",
            summary.removed,
            mp3.display()
        )),
        other => super::add::finish(mp3, other),
    }
}
