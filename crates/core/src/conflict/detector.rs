//! Conflict detection logic.
//!
//! Compares a proposed write against what is on disk: directories always
//! conflict, mode changes conflict on their own, binary content is compared
//! byte for byte and text content goes through the diff engine. Text that
//! is not valid UTF-8 on either side is also compared byte for byte.

use std::fs::Metadata;

use tracing::debug;

use crate::diff::{classify_binary, compute_text_diff, DiffOptions};
use crate::errors::ConflicterError;
use crate::models::{ConflictFile, ModeChange};

/// Bits of a mode that describe permissions rather than file type.
const PERMISSION_BITS: u32 = 0o7777;

/// Stateless comparison of proposed files against the filesystem.
#[derive(Debug, Clone, Default)]
pub struct ConflictDetector {
    ignore_whitespace: bool,
    diff_options: DiffOptions,
}

impl ConflictDetector {
    pub fn new(ignore_whitespace: bool, diff_options: DiffOptions) -> Self {
        Self {
            ignore_whitespace,
            diff_options,
        }
    }

    /// Whether `file` differs from the on-disk file at its path.
    ///
    /// Fills in `binary` (once), `mode_change` and, when the text differs,
    /// `changes`. The caller must already know that the path exists.
    pub async fn detect(&self, file: &mut ConflictFile) -> Result<bool, ConflicterError> {
        file.changes = None;
        file.mode_change = None;

        let metadata = tokio::fs::metadata(&file.path)
            .await
            .map_err(|e| ConflicterError::io(&file.path, e))?;
        if metadata.is_dir() {
            debug!(path = %file.path.display(), "target is a directory");
            return Ok(true);
        }

        file.mode_change = mode_change(file.mode, &metadata);
        if let Some(change) = file.mode_change {
            debug!(
                path = %file.path.display(),
                old = format_args!("{:o}", change.old),
                new = format_args!("{:o}", change.new),
                "file mode differs"
            );
        }

        let actual = tokio::fs::read(&file.path)
            .await
            .map_err(|e| ConflicterError::io(&file.path, e))?;

        let binary = match file.binary {
            Some(binary) => binary,
            None => {
                let binary =
                    classify_binary(&file.path, Some(&actual), Some(file.contents_or_empty()));
                file.binary = Some(binary);
                binary
            }
        };

        let modified = if binary {
            actual.as_slice() != file.contents_or_empty()
        } else {
            match (
                std::str::from_utf8(&actual),
                std::str::from_utf8(file.contents_or_empty()),
            ) {
                (Ok(old), Ok(new)) => {
                    let diff =
                        compute_text_diff(old, new, self.ignore_whitespace, &self.diff_options);
                    if diff.modified {
                        file.changes = Some(diff.hunks);
                    }
                    diff.modified
                }
                _ => {
                    let modified = actual.as_slice() != file.contents_or_empty();
                    if modified {
                        debug!(path = %file.path.display(), "text is not UTF-8, compared bytes");
                        let old = String::from_utf8_lossy(&actual);
                        let new = String::from_utf8_lossy(file.contents_or_empty());
                        let diff = compute_text_diff(&old, &new, false, &self.diff_options);
                        file.changes = Some(diff.hunks);
                    }
                    modified
                }
            }
        };

        debug!(
            path = %file.path.display(),
            binary,
            modified,
            "conflict detection finished"
        );
        Ok(modified || file.mode_change.is_some())
    }
}

/// Mode difference between the proposal and the on-disk file, if any.
///
/// A proposed mode without file-type bits is compared to the permission bits
/// of the on-disk mode only. A zero proposed mode means "unspecified".
fn mode_change(proposed: Option<u32>, metadata: &Metadata) -> Option<ModeChange> {
    let proposed = proposed.filter(|mode| *mode != 0)?;
    let disk = disk_mode(metadata)?;
    let disk = if proposed & !PERMISSION_BITS == 0 {
        disk & PERMISSION_BITS
    } else {
        disk
    };
    (disk != proposed).then_some(ModeChange {
        old: disk,
        new: proposed,
    })
}

#[cfg(unix)]
fn disk_mode(metadata: &Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode())
}

#[cfg(not(unix))]
fn disk_mode(_metadata: &Metadata) -> Option<u32> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChangeKind;

    fn detector() -> ConflictDetector {
        ConflictDetector::default()
    }

    #[tokio::test]
    async fn test_identical_text_is_not_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "same\n").unwrap();

        let mut file = ConflictFile::new(&path, Some(b"same\n".to_vec()));
        assert!(!detector().detect(&mut file).await.unwrap());
        assert_eq!(file.binary, Some(false));
        assert!(file.changes.is_none());
    }

    #[tokio::test]
    async fn test_text_difference_keeps_hunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "a\nb\n").unwrap();

        let mut file = ConflictFile::new(&path, Some(b"a\nc\n".to_vec()));
        assert!(detector().detect(&mut file).await.unwrap());
        let changes = file.changes.unwrap();
        assert!(changes.iter().any(|h| h.kind == ChangeKind::Removed));
        assert!(changes.iter().any(|h| h.kind == ChangeKind::Added));
    }

    #[tokio::test]
    async fn test_whitespace_tolerance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "a\nb\n").unwrap();

        let mut file = ConflictFile::new(&path, Some(b"a\n  b\n".to_vec()));
        let lenient = ConflictDetector::new(true, DiffOptions::default());
        assert!(!lenient.detect(&mut file).await.unwrap());
        assert!(file.changes.is_none());
        assert!(detector().detect(&mut file).await.unwrap());
    }

    #[tokio::test]
    async fn test_non_utf8_text_compared_by_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readme.txt");
        std::fs::write(&path, b"caf\xe9\n").unwrap();

        let mut latin1 = ConflictFile::new(&path, Some(b"caf\xe8\n".to_vec()));
        assert!(detector().detect(&mut latin1).await.unwrap());
        assert_eq!(latin1.binary, Some(false));
        assert!(latin1.changes.is_some());

        let mut same = ConflictFile::new(&path, Some(b"caf\xe9\n".to_vec()));
        assert!(!detector().detect(&mut same).await.unwrap());
        assert!(same.changes.is_none());
    }

    #[tokio::test]
    async fn test_directory_always_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = ConflictFile::new(dir.path(), Some(b"x".to_vec()));
        assert!(detector().detect(&mut file).await.unwrap());
    }

    #[tokio::test]
    async fn test_binary_compared_by_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.png");
        std::fs::write(&path, [0u8, 1, 2, 3]).unwrap();

        let mut same = ConflictFile::new(&path, Some(vec![0, 1, 2, 3]));
        assert!(!detector().detect(&mut same).await.unwrap());
        assert_eq!(same.binary, Some(true));

        let mut different = ConflictFile::new(&path, Some(vec![0, 1, 2, 4]));
        assert!(detector().detect(&mut different).await.unwrap());
        assert!(different.changes.is_none());
    }

    #[tokio::test]
    async fn test_deletion_compares_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "").unwrap();
        let mut file = ConflictFile::new(&path, None);
        assert!(!detector().detect(&mut file).await.unwrap());

        std::fs::write(&path, "old\n").unwrap();
        assert!(detector().detect(&mut file).await.unwrap());
        let changes = file.changes.unwrap();
        assert!(changes.iter().all(|h| h.kind == ChangeKind::Removed));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_mode_only_change_conflicts() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.sh");
        std::fs::write(&path, "echo hi\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let mut file = ConflictFile::new(&path, Some(b"echo hi\n".to_vec())).with_mode(0o755);
        assert!(detector().detect(&mut file).await.unwrap());
        assert_eq!(
            file.mode_change,
            Some(ModeChange {
                old: 0o644,
                new: 0o755
            })
        );
        assert!(file.changes.is_none());

        let mut matching = ConflictFile::new(&path, Some(b"echo hi\n".to_vec())).with_mode(0o644);
        assert!(!detector().detect(&mut matching).await.unwrap());
        assert!(matching.mode_change.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_mode_only_change_on_identical_binary() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool.bin");
        std::fs::write(&path, [0x7fu8, b'E', b'L', b'F', 0, 0]).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let mut file =
            ConflictFile::new(&path, Some(vec![0x7f, b'E', b'L', b'F', 0, 0])).with_mode(0o755);
        assert!(detector().detect(&mut file).await.unwrap());
        assert_eq!(file.binary, Some(true));
        assert_eq!(
            file.mode_change,
            Some(ModeChange {
                old: 0o644,
                new: 0o755
            })
        );
        assert!(file.changes.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = ConflictFile::new(dir.path().join("missing.txt"), Some(b"x".to_vec()));
        let err = detector().detect(&mut file).await.unwrap_err();
        assert!(matches!(err, ConflicterError::Io { .. }));
    }
}
