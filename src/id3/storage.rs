//! File access for tag rewrites.
//!
//! The codec never touches `std::fs` directly: it reads and replaces byte
//! ranges through [`RegionFile`]. [`DiskFile`] is the real implementation;
//! tests substitute an in-memory file that can fail on demand.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Byte-range access to one audio file.
pub trait RegionFile {
    /// Path used in error messages and logs.
    fn path(&self) -> &Path;

    /// Read up to `len` bytes at `offset`. Fewer bytes are returned at end of file.
    fn read_region(&mut self, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Replace the bytes in `range` with `bytes`, shifting everything after it.
    ///
    /// Either the whole replacement lands or the file is left as it was.
    fn replace_region(&mut self, range: Range<u64>, bytes: &[u8]) -> Result<()>;
}

/// An audio file on disk.
///
/// A region replace writes the complete new file next to the original and
/// renames it into place; the handle is reopened lazily afterwards.
#[derive(Debug)]
pub struct DiskFile {
    path: PathBuf,
    file: Option<File>,
    writable: bool,
}

impl DiskFile {
    /// Open for reading and writing.
    ///
    /// A file we may not write is reported as [`Error::PermissionDenied`]
    /// here, before anything else happens.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::read(&path, e))?;
        debug!(path = %path.display(), "Opened for read-write");
        Ok(Self {
            path,
            file: Some(file),
            writable: true,
        })
    }

    /// Open for reading only; any replace fails with `PermissionDenied`.
    pub fn open_read_only(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::open(&path).map_err(|e| Error::read(&path, e))?;
        Ok(Self {
            path,
            file: Some(file),
            writable: false,
        })
    }

    fn handle(&mut self) -> Result<&mut File> {
        if self.file.is_none() {
            let file = OpenOptions::new()
                .read(true)
                .write(self.writable)
                .open(&self.path)
                .map_err(|e| Error::read(&self.path, e))?;
            self.file = Some(file);
        }
        self.file
            .as_mut()
            .ok_or_else(|| Error::not_found(&self.path))
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".coverdrop.tmp");
        self.path.with_file_name(name)
    }
}

impl RegionFile for DiskFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn read_region(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let path = self.path.clone();
        let file = self.handle()?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| Error::read(&path, e))?;
        let mut buf = Vec::with_capacity(len);
        (&mut *file)
            .take(len as u64)
            .read_to_end(&mut buf)
            .map_err(|e| Error::read(&path, e))?;
        Ok(buf)
    }

    fn replace_region(&mut self, range: Range<u64>, bytes: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(Error::PermissionDenied {
                path: self.path.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "file was opened read-only",
                ),
            });
        }

        let path = self.path.clone();
        let file = self.handle()?;
        let mut content = Vec::new();
        file.seek(SeekFrom::Start(0))
            .map_err(|e| Error::read(&path, e))?;
        file.read_to_end(&mut content)
            .map_err(|e| Error::read(&path, e))?;
        let permissions = file
            .metadata()
            .map_err(|e| Error::read(&path, e))?
            .permissions();

        let (start, end) = (range.start as usize, range.end as usize);
        if start > end || end > content.len() {
            return Err(Error::write(
                &path,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!(
                        "region {start}..{end} is outside a {} byte file",
                        content.len()
                    ),
                ),
            ));
        }

        let mut replaced = Vec::with_capacity(content.len() - (end - start) + bytes.len());
        replaced.extend_from_slice(&content[..start]);
        replaced.extend_from_slice(bytes);
        replaced.extend_from_slice(&content[end..]);

        // Some platforms refuse to rename over a file that is still open
        self.file = None;

        let temp_path = self.temp_path();
        let written = fs::write(&temp_path, &replaced)
            .and_then(|()| fs::set_permissions(&temp_path, permissions))
            .and_then(|()| fs::rename(&temp_path, &path));
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&temp_path) {
                warn!(path = %temp_path.display(), "Could not remove temp file: {}", cleanup);
            }
            return Err(Error::write(&path, e));
        }

        debug!(
            path = %path.display(),
            old_len = end - start,
            new_len = bytes.len(),
            "Replaced tag region"
        );
        Ok(())
    }
}
