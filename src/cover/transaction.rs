//! Atomic, recoverable cover edits.
//!
//! A [`TagTransaction`] owns the file for its lifetime and moves through
//!
//! ```text
//! Idle -> Snapshotted -> Mutated -> Committed
//!                               \-> RolledBack
//! (any) -> Failed
//! ```
//!
//! `begin` snapshots the covers on disk, `mutate` edits an in-memory copy of
//! the tag, and `commit` replaces the tag region. When the write fails the
//! snapshot is written back; when that fails too the result is a dual
//! failure and the snapshot covers are saved to the recovery directory.

use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use super::CoverArtEditor;
use super::recovery;
use crate::error::{Error, Result, ResultExt};
use crate::id3::codec::{locate_tag, serialize_tag};
use crate::id3::{
    ConflictAction, Frame, PictureFrame, RegionFile, Tag, WriteOptions, delete_tag, read_tag,
    replace_tag_region, write_tag,
};

/// Where a transaction is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Snapshotted,
    Mutated,
    Committed,
    RolledBack,
    Failed,
}

impl TransactionState {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionState::Idle => "idle",
            TransactionState::Snapshotted => "snapshotted",
            TransactionState::Mutated => "mutated",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled back",
            TransactionState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::RolledBack | TransactionState::Failed
        )
    }
}

/// One edit applied by [`TagTransaction::mutate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    /// Remove every cover.
    Clear,
    /// Load these images, in order, and append them as front covers.
    Append(Vec<PathBuf>),
}

/// The covers present when the transaction began.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverArtSnapshot {
    pub covers: Vec<PictureFrame>,
}

impl CoverArtSnapshot {
    pub fn capture(tag: &Tag) -> Self {
        Self {
            covers: tag.pictures().cloned().collect(),
        }
    }

    /// Replace the covers of `tag` with the snapshot, keeping other frames.
    pub fn restore_into(&self, tag: &mut Tag) {
        tag.frames.retain(|frame| !matches!(frame, Frame::Picture(_)));
        tag.frames
            .extend(self.covers.iter().cloned().map(Frame::from));
    }

    pub fn len(&self) -> usize {
        self.covers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.covers.is_empty()
    }
}

/// Settings a transaction writes with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Version and padding for a synthesized tag. Existing tags keep their
    /// own version; `conflict` is ignored, commits always replace.
    pub write: WriteOptions,
    /// Where snapshot covers are saved after a dual failure.
    pub recovery_dir: Option<PathBuf>,
}

/// What a committed transaction changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// New covers now in the tag.
    pub added: usize,
    /// Covers from before the transaction that are gone.
    pub removed: usize,
    /// Covers in the written tag.
    pub total: usize,
}

/// How a transaction ended.
#[derive(Debug)]
pub enum Outcome {
    Committed(Summary),
    /// The commit failed and the original covers were restored.
    RolledBack { reason: Error },
    /// The transaction could not complete. With `dual_failure` set, the
    /// restore failed as well and the on-disk tag is indeterminate.
    Failed { reason: Error, dual_failure: bool },
}

impl Outcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Outcome::Committed(_))
    }
}

/// A single cover edit of one file.
pub struct TagTransaction<'a, F: RegionFile + ?Sized> {
    file: &'a mut F,
    editor: &'a CoverArtEditor,
    options: TransactionOptions,
    state: TransactionState,
    tag: Option<Tag>,
    /// Length of this transaction's tag region at the start of the file;
    /// zero while it is deleted. Bytes after it are never written.
    region_len: u64,
    snapshot: CoverArtSnapshot,
    original_remaining: usize,
    added: usize,
}

impl<'a, F: RegionFile + ?Sized> TagTransaction<'a, F> {
    pub fn new(file: &'a mut F, editor: &'a CoverArtEditor, options: TransactionOptions) -> Self {
        Self {
            file,
            editor,
            options,
            state: TransactionState::Idle,
            tag: None,
            region_len: 0,
            snapshot: CoverArtSnapshot::default(),
            original_remaining: 0,
            added: 0,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn snapshot(&self) -> &CoverArtSnapshot {
        &self.snapshot
    }

    /// The in-memory tag being edited, once the transaction has begun.
    pub fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    fn expect_state(&self, operation: &'static str, allowed: &[TransactionState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                operation,
                state: self.state.as_str(),
            })
        }
    }

    fn fail(&mut self, err: Error) -> Error {
        self.state = TransactionState::Failed;
        err
    }

    /// Read the tag and snapshot its covers.
    ///
    /// A file without a tag gets an empty one written immediately, so every
    /// later step works on an existing tag region.
    pub fn begin(&mut self) -> Result<()> {
        self.expect_state("begin", &[TransactionState::Idle])?;

        let tag = match read_tag(self.file) {
            Ok(Some(tag)) => tag,
            Ok(None) => {
                let tag = Tag::new(self.options.write.version);
                let options = WriteOptions {
                    conflict: ConflictAction::Fail,
                    ..self.options.write
                };
                if let Err(e) = write_tag(self.file, &tag, &options)
                    .with_context("Failed to create an empty tag")
                {
                    return Err(self.fail(e));
                }
                info!(path = %self.file.path().display(), version = %tag.version, "Created empty ID3v2 tag");
                tag
            }
            Err(e) => return Err(self.fail(e)),
        };
        self.region_len = match locate_tag(self.file) {
            Ok(header) => header.map_or(0, |h| h.region_len()),
            Err(e) => return Err(self.fail(e)),
        };

        self.snapshot = CoverArtSnapshot::capture(&tag);
        self.original_remaining = self.snapshot.len();
        debug!(
            path = %self.file.path().display(),
            covers = self.snapshot.len(),
            "Snapshotted covers"
        );
        self.tag = Some(tag);
        self.state = TransactionState::Snapshotted;
        Ok(())
    }

    /// Apply one edit to the in-memory tag. Nothing is written.
    ///
    /// An image that cannot be loaded fails the transaction with the disk
    /// as `begin` left it.
    pub fn mutate(&mut self, op: EditOp) -> Result<()> {
        self.expect_state(
            "mutate",
            &[TransactionState::Snapshotted, TransactionState::Mutated],
        )?;
        let Some(tag) = self.tag.as_mut() else {
            return Err(self.fail(Error::InvalidTransition {
                operation: "mutate",
                state: "missing its tag",
            }));
        };

        match op {
            EditOp::Clear => {
                self.editor.clear_covers(tag);
                self.original_remaining = 0;
                self.added = 0;
            }
            EditOp::Append(images) => match self.editor.append_covers(tag, &images) {
                Ok(added) => self.added += added,
                Err(e) => {
                    warn!(path = %self.file.path().display(), "Cover edit aborted: {}", e);
                    return Err(self.fail(e));
                }
            },
        }

        self.state = TransactionState::Mutated;
        Ok(())
    }

    fn write_options(&self, tag: &Tag) -> WriteOptions {
        WriteOptions {
            version: tag.version,
            conflict: ConflictAction::Replace,
            padding: self.options.write.padding,
        }
    }

    /// Replace the on-disk tag with the edited one.
    ///
    /// The new region is serialized before the old one is deleted, so an
    /// encode error leaves the disk untouched. `Err` is only returned when
    /// the transaction is not in the `Mutated` state; every write problem
    /// is reported through the [`Outcome`].
    pub fn commit(&mut self) -> Result<Outcome> {
        self.expect_state("commit", &[TransactionState::Mutated])?;
        let Some(tag) = self.tag.as_ref() else {
            return Err(self.fail(Error::InvalidTransition {
                operation: "commit",
                state: "missing its tag",
            }));
        };

        let options = self.write_options(tag);
        let total = tag.pictures().count();
        let serialized = serialize_tag(tag, options.version, options.padding);
        let written = serialized.and_then(|bytes| self.replace_region(&bytes));

        match written {
            Ok(()) => {
                let summary = Summary {
                    added: self.added,
                    removed: self.snapshot.len() - self.original_remaining,
                    total,
                };
                info!(
                    path = %self.file.path().display(),
                    added = summary.added,
                    removed = summary.removed,
                    total = summary.total,
                    "Committed cover edit"
                );
                self.state = TransactionState::Committed;
                Ok(Outcome::Committed(summary))
            }
            Err(write_err) => {
                warn!(
                    path = %self.file.path().display(),
                    "Tag write failed, restoring original covers: {}", write_err
                );
                match self.restore() {
                    Ok(()) => {
                        self.state = TransactionState::RolledBack;
                        Ok(Outcome::RolledBack { reason: write_err })
                    }
                    Err(rollback_err) => {
                        self.state = TransactionState::Failed;
                        let recovery = self.save_recovery();
                        error!(
                            path = %self.file.path().display(),
                            write = %write_err,
                            rollback = %rollback_err,
                            recovery = ?recovery,
                            "Commit and rollback both failed"
                        );
                        Ok(Outcome::Failed {
                            reason: Error::DualFailure {
                                write: Box::new(write_err),
                                rollback: Box::new(rollback_err),
                                recovery,
                            },
                            dual_failure: true,
                        })
                    }
                }
            }
        }
    }

    /// Delete the old tag region, then insert `bytes` where it was.
    fn replace_region(&mut self, bytes: &[u8]) -> Result<()> {
        if self.region_len > 0 {
            delete_tag(self.file)?;
            self.region_len = 0;
        }
        replace_tag_region(self.file, 0..0, bytes)?;
        self.region_len = bytes.len() as u64;
        Ok(())
    }

    /// Abandon the edit and make sure the file carries the snapshot covers.
    pub fn rollback(&mut self) -> Result<()> {
        self.expect_state(
            "roll back",
            &[TransactionState::Snapshotted, TransactionState::Mutated],
        )?;
        match self.restore() {
            Ok(()) => {
                self.state = TransactionState::RolledBack;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Write a tag holding exactly the snapshot covers.
    ///
    /// Skipped when the file already carries them, e.g. when the commit
    /// failed before its first write landed.
    fn restore(&mut self) -> Result<()> {
        let mut restored = self
            .tag
            .clone()
            .unwrap_or_else(|| Tag::new(self.options.write.version));
        self.snapshot.restore_into(&mut restored);

        if self.region_len > 0 {
            match read_tag(self.file) {
                Ok(Some(on_disk)) if CoverArtSnapshot::capture(&on_disk) == self.snapshot => {
                    debug!(path = %self.file.path().display(), "Original covers still on disk");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => debug!("Could not read tag before restoring: {}", e),
            }
        }

        let options = self.write_options(&restored);
        let bytes = match serialize_tag(&restored, options.version, options.padding) {
            Err(Error::Encode { .. }) if options.padding > 0 => {
                serialize_tag(&restored, options.version, 0)?
            }
            other => other?,
        };
        replace_tag_region(self.file, 0..self.region_len, &bytes)?;
        self.region_len = bytes.len() as u64;
        info!(
            path = %self.file.path().display(),
            covers = self.snapshot.len(),
            "Restored original covers"
        );
        self.tag = Some(restored);
        Ok(())
    }

    fn save_recovery(&self) -> Option<PathBuf> {
        let dir = self.options.recovery_dir.as_ref()?;
        if self.snapshot.is_empty() {
            return None;
        }
        match recovery::dump_snapshot(dir, self.file.path(), &self.snapshot) {
            Ok(saved) => Some(saved),
            Err(e) => {
                error!("Could not save covers for recovery: {}", e);
                None
            }
        }
    }
}

/// Run a whole transaction: begin, apply `ops` in order, commit.
///
/// Every failure, including a bad image or an unreadable tag, is reported
/// as an [`Outcome`].
pub fn run<F: RegionFile + ?Sized>(
    file: &mut F,
    editor: &CoverArtEditor,
    options: TransactionOptions,
    ops: Vec<EditOp>,
) -> Outcome {
    let mut transaction = TagTransaction::new(file, editor, options);
    let result = transaction.begin().and_then(|()| {
        for op in ops {
            transaction.mutate(op)?;
        }
        transaction.commit()
    });
    match result {
        Ok(outcome) => outcome,
        Err(reason) => Outcome::Failed {
            reason,
            dual_failure: false,
        },
    }
}
