//! Cover listing command.

use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;

use super::{OutputFormat, check_mp3};
use crate::config::Config;
use crate::cover::{CoverArtEditor, cover_digest};
use crate::id3::{DiskFile, PictureFrame, read_tag};

/// One embedded cover, as reported by `list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverEntry {
    pub index: usize,
    pub picture_type: String,
    pub mime_type: String,
    pub description: String,
    pub size: usize,
    pub sha256: String,
}

impl CoverEntry {
    fn new(index: usize, picture: &PictureFrame) -> Self {
        Self {
            index,
            picture_type: picture.picture_type.to_string(),
            mime_type: picture.mime_type.to_string(),
            description: picture.description.clone(),
            size: picture.data.len(),
            sha256: cover_digest(picture),
        }
    }
}

/// List the covers embedded in the MP3 file
pub fn cmd_list(config: &Config, mp3: &Path, format: OutputFormat) -> anyhow::Result<String> {
    check_mp3(mp3)?;
    let editor = CoverArtEditor::from_config(&config.images);
    let mut file = DiskFile::open_read_only(mp3)?;
    let tag = read_tag(&mut file)?;

    let entries: Vec<CoverEntry> = tag
        .iter()
        .flat_map(|tag| editor.get_covers(tag))
        .enumerate()
        .map(|(i, picture)| CoverEntry::new(i + 1, picture))
        .collect();

    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text => {
            let Some(tag) = tag else {
                return Ok(format!("No ID3v2 tag in \"{}\".", mp3.display()));
            };
            let mut out = format!(
                "\"{}\": ID3v{} tag, {} cover(s)",
                mp3.display(),
                tag.version,
                entries.len()
            );
            for entry in &entries {
                write!(
                    out,
                    "\n  {:>2}. {} ({}, {} bytes) sha256:{}",
                    entry.index,
                    entry.picture_type,
                    entry.mime_type,
                    entry.size,
                    &entry.sha256[..16]
                )?;
                if !entry.description.is_empty() {
                    write!(out, " \"{}\"", entry.description)?;
                }
            }
            Ok(out)
        }
    }
}
