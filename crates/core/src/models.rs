//! Data types that travel through the conflict pipeline.
//!
//! A [`ConflictFile`] is a proposed write: the absolute destination path, the
//! proposed bytes (or `None` for a deletion) and the side-channel fields the
//! conflicter fills in while deciding what to do with it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Disposition of a proposed write.
///
/// Transitions only move forward:
/// `<unset> -> {Create | Identical | Conflict} -> {Force | Skip | Ignore}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConflictStatus {
    /// Nothing exists on disk at the target path.
    Create,
    /// On-disk state matches the proposal.
    Identical,
    /// On-disk state differs and nobody has decided yet.
    Conflict,
    /// Write unconditionally.
    Force,
    /// Do not write.
    Skip,
    /// Do not write, and remember the decision in the override file.
    Ignore,
    /// The file was only inspected; nothing is written.
    Diff,
    /// A status outside the known set, passed through untouched.
    Other(String),
}

impl ConflictStatus {
    /// Level used for the per-file status line. `Ignore` is reported as `Skip`.
    pub fn log_level(&self) -> ConflictStatus {
        match self {
            Self::Ignore => Self::Skip,
            other => other.clone(),
        }
    }

    /// Whether downstream stages must drop the pending write.
    pub fn clears_pending_write(&self) -> bool {
        matches!(self, Self::Skip | Self::Diff | Self::Ignore)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Create => "create",
            Self::Identical => "identical",
            Self::Conflict => "conflict",
            Self::Force => "force",
            Self::Skip => "skip",
            Self::Ignore => "ignore",
            Self::Diff => "diff",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "create" => Self::Create,
            "identical" => Self::Identical,
            "conflict" => Self::Conflict,
            "force" => Self::Force,
            "skip" => Self::Skip,
            "ignore" => Self::Ignore,
            "diff" => Self::Diff,
            other => Self::Other(other.to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// Pending write state
// ---------------------------------------------------------------------------

/// What a downstream writer will do with the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    Modified,
    Deleted,
}

// ---------------------------------------------------------------------------
// Diff bookkeeping
// ---------------------------------------------------------------------------

/// Tag of a diff hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Removed,
    Unchanged,
}

/// A run of text sharing the same [`ChangeKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeHunk {
    pub kind: ChangeKind,
    pub value: String,
}

impl ChangeHunk {
    pub fn new(kind: ChangeKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn is_change(&self) -> bool {
        self.kind != ChangeKind::Unchanged
    }
}

/// Permission change between the on-disk file and the proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeChange {
    pub old: u32,
    pub new: u32,
}

// ---------------------------------------------------------------------------
// ConflictFile
// ---------------------------------------------------------------------------

/// A proposed write flowing through the pipeline.
#[derive(Debug, Clone)]
pub struct ConflictFile {
    /// Absolute destination path.
    pub path: PathBuf,
    /// Proposed bytes. `None` proposes deleting the file.
    pub contents: Option<Vec<u8>>,
    /// Proposed mode bits, if the producer cares about them.
    pub mode: Option<u32>,
    /// Pending write for downstream stages.
    pub state: Option<PendingState>,
    /// Disposition. Once set, detection never touches it again.
    pub status: Option<ConflictStatus>,
    /// Classification kept for logging after a coercion to `Skip`.
    pub classification: Option<ConflictStatus>,
    /// Set by a dry run when the content differed from disk.
    pub changes_detected: bool,
    /// Memoized binary classification.
    pub binary: Option<bool>,
    /// Diff hunks, kept only when a textual difference was found.
    pub changes: Option<Vec<ChangeHunk>>,
    pub mode_change: Option<ModeChange>,
}

impl ConflictFile {
    /// A pending modification of `path` with the given contents.
    pub fn new(path: impl Into<PathBuf>, contents: Option<Vec<u8>>) -> Self {
        let state = if contents.is_some() {
            PendingState::Modified
        } else {
            PendingState::Deleted
        };
        Self {
            path: path.into(),
            contents,
            mode: None,
            state: Some(state),
            status: None,
            classification: None,
            changes_detected: false,
            binary: None,
            changes: None,
            mode_change: None,
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_status(mut self, status: ConflictStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Path relative to `cwd`, or the absolute path when outside it.
    pub fn relative_to(&self, cwd: &Path) -> PathBuf {
        self.path
            .strip_prefix(cwd)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| self.path.clone())
    }

    /// Proposed contents with deletion read as empty content.
    pub fn contents_or_empty(&self) -> &[u8] {
        self.contents.as_deref().unwrap_or_default()
    }

    /// Drop the pending write so downstream stages never commit it.
    pub fn clear_state(&mut self) {
        self.state = None;
    }

    /// Remove the detection bookkeeping. The status fields stay so later
    /// stages can report the decision.
    pub fn strip_bookkeeping(&mut self) {
        self.binary = None;
        self.changes = None;
        self.mode_change = None;
    }
}
