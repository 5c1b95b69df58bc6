//! `conflicter apply`: propose a staging tree as writes onto a destination.
//!
//! Every regular file under the staging directory becomes a proposed write
//! at the same relative path under the destination. The proposals go
//! through the force-yo-files, override-rule and collision stages; whatever
//! comes out the other end is committed to disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tracing::{debug, info};

use conflicter_core::adapter::{Adapter, QueuedAdapter};
use conflicter_core::config::ConflicterConfig;
use conflicter_core::conflict::Conflicter;
use conflicter_core::models::{ConflictFile, ConflictStatus, PendingState};
use conflicter_core::transform::{force_yo_files, pipeline, ConflicterTransform, FileTransform};
use conflicter_core::yo_resolve::YoResolve;

use crate::style;
use crate::terminal::TerminalAdapter;

/// What happened to a forwarded file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub relative_path: String,
    pub status: ConflictStatus,
    pub action: CommitAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitAction {
    Written,
    Deleted,
}

impl std::fmt::Display for CommitAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Written => write!(f, "written"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// Run the apply command with an interactive terminal adapter.
pub async fn run_apply(staging: &Path, dest: &Path, config: ConflicterConfig) -> Result<()> {
    let adapter = Arc::new(QueuedAdapter::new(TerminalAdapter::new()));
    let result = apply_with_adapter(staging, dest, config, adapter.clone()).await;
    adapter.close();

    let (checked, committed) = result?;
    print_summary(checked, &committed);
    Ok(())
}

/// Propose `staging` onto `dest`, resolve, and commit. Returns the number of
/// proposals checked and what was committed.
pub async fn apply_with_adapter(
    staging: &Path,
    dest: &Path,
    mut config: ConflicterConfig,
    adapter: Arc<dyn Adapter>,
) -> Result<(usize, Vec<Committed>)> {
    let dest = absolute(dest)?;
    let cwd = config.conflicter.cwd.get_or_insert_with(|| dest.clone()).clone();

    let files = collect_proposals(staging, &dest)
        .with_context(|| format!("failed to read staging directory {}", staging.display()))?;
    let checked = files.len();
    info!(staging = %staging.display(), dest = %dest.display(), files = checked, "applying staging tree");

    let conflicter = Arc::new(
        Conflicter::new(adapter, &config.conflicter).context("failed to set up conflicter")?,
    );
    let force = force_yo_files(&cwd);
    let resolve = YoResolve::with_file_name(config.resolve.file_name.clone());
    let check = ConflicterTransform::with_rules_file_name(conflicter, config.resolve.file_name.clone());
    let stages: [&dyn FileTransform; 3] = [&force, &resolve, &check];

    let output = pipeline(files, &stages, config.pipeline.concurrency).await?;

    let mut committed = Vec::new();
    for file in output {
        if let Some(entry) = commit(&file, &cwd).await? {
            committed.push(entry);
        }
    }
    Ok((checked, committed))
}

// ---------------------------------------------------------------------------
// Proposals
// ---------------------------------------------------------------------------

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let base = std::env::current_dir().context("failed to read current directory")?;
    Ok(base.join(path))
}

/// Every regular file under `staging`, re-rooted at `dest`, in path order.
fn collect_proposals(staging: &Path, dest: &Path) -> Result<Vec<ConflictFile>> {
    let mut sources = Vec::new();
    walk(staging, &mut sources)?;
    sources.sort();

    let mut files = Vec::with_capacity(sources.len());
    for source in sources {
        let relative = source.strip_prefix(staging).unwrap_or(&source);
        let contents = std::fs::read(&source)
            .with_context(|| format!("failed to read {}", source.display()))?;
        let mut file = ConflictFile::new(dest.join(relative), Some(contents));
        file.mode = source_mode(&source)?;
        debug!(path = %file.path.display(), "proposed write");
        files.push(file);
    }
    Ok(files)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, out)?;
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(unix)]
fn source_mode(path: &Path) -> Result<Option<u32>> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?;
    Ok(Some(metadata.permissions().mode() & 0o7777))
}

#[cfg(not(unix))]
fn source_mode(_path: &Path) -> Result<Option<u32>> {
    Ok(None)
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

async fn commit(file: &ConflictFile, cwd: &Path) -> Result<Option<Committed>> {
    let relative_path = file.relative_to(cwd).to_string_lossy().into_owned();
    let status = file.status.clone().unwrap_or(ConflictStatus::Create);

    let action = match file.state {
        None => return Ok(None),
        Some(PendingState::Deleted) => {
            match tokio::fs::remove_file(&file.path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("failed to delete {}", file.path.display()))
                }
            }
            CommitAction::Deleted
        }
        Some(PendingState::Modified) => {
            if tokio::fs::metadata(&file.path).await.is_ok_and(|m| m.is_dir()) {
                anyhow::bail!("refusing to replace directory {} with a file", file.path.display());
            }
            if let Some(parent) = file.path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            tokio::fs::write(&file.path, file.contents_or_empty())
                .await
                .with_context(|| format!("failed to write {}", file.path.display()))?;
            set_mode(&file.path, file.mode).await?;
            CommitAction::Written
        }
    };

    debug!(path = %file.path.display(), %action, "committed");
    Ok(Some(Committed {
        relative_path,
        status,
        action,
    }))
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = mode.filter(|mode| *mode != 0) {
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))
            .await
            .with_context(|| format!("failed to set mode on {}", path.display()))?;
    }
    Ok(())
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: Option<u32>) -> Result<()> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

fn print_summary(checked: usize, committed: &[Committed]) {
    println!();
    if committed.is_empty() {
        println!("{}", style::warn(&format!("{checked} file(s) checked, nothing written")));
        println!();
        return;
    }

    println!("{}", style::header(&format!("Committed ({} of {checked})", committed.len())));
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["File", "Status", "Action"]);
    for entry in committed {
        table.add_row(vec![
            Cell::new(&entry.relative_path),
            Cell::new(entry.status.as_str()),
            Cell::new(entry.action.to_string()),
        ]);
    }
    println!("{table}");
    println!("{}", style::success("done"));
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use conflicter_core::adapter::testing::TestAdapter;
    use conflicter_core::conflict::ConflicterAction;

    fn write(path: &Path, contents: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn test_apply_writes_new_and_overwritten_files() {
        let staging = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        write(&staging.path().join("src/new.txt"), "new\n");
        write(&staging.path().join("changed.txt"), "theirs\n");
        write(&staging.path().join("same.txt"), "same\n");
        write(&dest.path().join("changed.txt"), "mine\n");
        write(&dest.path().join("same.txt"), "same\n");

        let adapter = Arc::new(TestAdapter::new().with_action(ConflicterAction::Write));
        let (checked, committed) = apply_with_adapter(
            staging.path(),
            dest.path(),
            ConflicterConfig::default(),
            adapter.clone(),
        )
        .await
        .unwrap();

        assert_eq!(checked, 3);
        let written: Vec<_> = committed.iter().map(|c| c.relative_path.as_str()).collect();
        assert_eq!(written, vec!["changed.txt", "src/new.txt"]);
        assert_eq!(
            std::fs::read_to_string(dest.path().join("changed.txt")).unwrap(),
            "theirs\n"
        );
        assert_eq!(
            std::fs::read_to_string(dest.path().join("src/new.txt")).unwrap(),
            "new\n"
        );
        assert_eq!(adapter.prompt_count(), 1);
    }

    #[tokio::test]
    async fn test_apply_dry_run_writes_nothing() {
        let staging = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        write(&staging.path().join("a.txt"), "new\n");

        let mut config = ConflicterConfig::default();
        config.conflicter.dry_run = true;
        let adapter = Arc::new(TestAdapter::new());
        let (checked, committed) =
            apply_with_adapter(staging.path(), dest.path(), config, adapter)
                .await
                .unwrap();

        assert_eq!(checked, 1);
        assert!(committed.is_empty());
        assert!(!dest.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_apply_ignore_writes_rules_file() {
        let staging = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        write(&staging.path().join("a.txt"), "theirs\n");
        write(&dest.path().join("a.txt"), "mine\n");

        let adapter = Arc::new(TestAdapter::new().with_action(ConflicterAction::Ignore));
        let (_, committed) = apply_with_adapter(
            staging.path(),
            dest.path(),
            ConflicterConfig::default(),
            adapter,
        )
        .await
        .unwrap();

        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].relative_path, ".yo-resolve");
        assert_eq!(
            std::fs::read_to_string(dest.path().join(".yo-resolve")).unwrap(),
            "a.txt skip\n"
        );
        assert_eq!(
            std::fs::read_to_string(dest.path().join("a.txt")).unwrap(),
            "mine\n"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_apply_preserves_mode() {
        use std::os::unix::fs::PermissionsExt;

        let staging = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let script = staging.path().join("run.sh");
        write(&script, "echo hi\n");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let adapter = Arc::new(TestAdapter::new());
        apply_with_adapter(staging.path(), dest.path(), ConflicterConfig::default(), adapter)
            .await
            .unwrap();

        let mode = std::fs::metadata(dest.path().join("run.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
