//! Pipeline stages and the primitive that runs them.
//!
//! A stage consumes a [`ConflictFile`] and forwards it (possibly changed)
//! or drops it. Stages may also emit synthetic files once the stream ends
//! through [`FileTransform::flush`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use crate::conflict::Conflicter;
use crate::errors::ConflicterError;
use crate::models::{ConflictFile, ConflictStatus};
use crate::yo_resolve::{escape_pattern, DEFAULT_YO_RESOLVE_FILE_NAME};

/// Pattern matching the generator's own configuration files.
pub const YO_FILES_PATTERN: &str = "**/{.yo-rc.json,.yo-resolve,.yo-rc-global.json}";

/// One stage of a file pipeline.
#[async_trait]
pub trait FileTransform: Send + Sync {
    /// Forward `file`, or `None` to drop it.
    async fn transform(&self, file: ConflictFile) -> Result<Option<ConflictFile>, ConflicterError>;

    /// Files to emit once every input has gone through this stage.
    async fn flush(&self) -> Result<Vec<ConflictFile>, ConflicterError> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run `files` through `stages` with up to `concurrency` files in flight.
///
/// Output keeps input order. After the stream ends each stage is flushed in
/// turn and the flushed files continue through the stages after it. The
/// first error fails the whole pipeline.
pub async fn pipeline(
    files: Vec<ConflictFile>,
    stages: &[&dyn FileTransform],
    concurrency: usize,
) -> Result<Vec<ConflictFile>, ConflicterError> {
    let total = files.len();
    let mut output: Vec<ConflictFile> = stream::iter(files)
        .map(|file| run_stages(file, stages))
        .buffered(concurrency.max(1))
        .try_collect::<Vec<_>>()
        .await?
        .into_iter()
        .flatten()
        .collect();

    for (index, stage) in stages.iter().enumerate() {
        for file in stage.flush().await? {
            debug!(path = %file.path.display(), stage = index, "stage flushed a file");
            if let Some(file) = run_stages(file, &stages[index + 1..]).await? {
                output.push(file);
            }
        }
    }

    info!(input = total, output = output.len(), "pipeline finished");
    Ok(output)
}

async fn run_stages(
    mut file: ConflictFile,
    stages: &[&dyn FileTransform],
) -> Result<Option<ConflictFile>, ConflicterError> {
    for stage in stages {
        match stage.transform(file).await? {
            Some(next) => file = next,
            None => return Ok(None),
        }
    }
    Ok(Some(file))
}

// ---------------------------------------------------------------------------
// Force by pattern
// ---------------------------------------------------------------------------

/// Sets status `force` on every file whose path relative to `cwd` matches.
pub struct ForceFilePattern {
    pattern: String,
    cwd: PathBuf,
}

impl ForceFilePattern {
    pub fn new(pattern: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            pattern: pattern.into(),
            cwd: cwd.into(),
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.cwd).unwrap_or(path);
        let relative = relative.to_string_lossy().replace('\\', "/");
        glob_match::glob_match(&self.pattern, &relative)
            || self
                .pattern
                .strip_prefix("**/")
                .is_some_and(|rest| glob_match::glob_match(rest, &relative))
    }
}

/// Never prompt for the generator's own configuration files.
pub fn force_yo_files(cwd: impl Into<PathBuf>) -> ForceFilePattern {
    ForceFilePattern::new(YO_FILES_PATTERN, cwd)
}

#[async_trait]
impl FileTransform for ForceFilePattern {
    async fn transform(&self, mut file: ConflictFile) -> Result<Option<ConflictFile>, ConflicterError> {
        if self.matches(&file.path) {
            debug!(path = %file.path.display(), pattern = self.pattern.as_str(), "forcing file");
            file.status = Some(ConflictStatus::Force);
        }
        Ok(Some(file))
    }
}

// ---------------------------------------------------------------------------
// Conflicter stage
// ---------------------------------------------------------------------------

/// Runs the collision check and applies the resulting status.
///
/// Skipped files lose their pending write and are dropped. Ignored files
/// under the conflicter's working directory are also remembered; the rules
/// are emitted on flush as a single override file in that directory.
pub struct ConflicterTransform {
    conflicter: Arc<Conflicter>,
    rules_file_name: String,
    ignored: Mutex<String>,
}

impl ConflicterTransform {
    pub fn new(conflicter: Arc<Conflicter>) -> Self {
        Self::with_rules_file_name(conflicter, DEFAULT_YO_RESOLVE_FILE_NAME)
    }

    pub fn with_rules_file_name(conflicter: Arc<Conflicter>, file_name: impl Into<String>) -> Self {
        Self {
            conflicter,
            rules_file_name: file_name.into(),
            ignored: Mutex::new(String::new()),
        }
    }
}

impl ConflicterTransform {
    fn remember(&self, path: &Path) {
        let Ok(relative) = path.strip_prefix(self.conflicter.cwd()) else {
            warn!(
                path = %path.display(),
                cwd = %self.conflicter.cwd().display(),
                "ignored file is outside the working directory, not remembering it"
            );
            return;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        let mut ignored = self.ignored.lock().unwrap_or_else(|e| e.into_inner());
        ignored.push_str(&escape_pattern(&relative));
        ignored.push_str(" skip\n");
    }
}

#[async_trait]
impl FileTransform for ConflicterTransform {
    async fn transform(&self, file: ConflictFile) -> Result<Option<ConflictFile>, ConflicterError> {
        let mut file = self.conflicter.check_for_collision(file).await?;
        file.strip_bookkeeping();

        let status = file.status.clone().unwrap_or(ConflictStatus::Skip);
        if !status.clears_pending_write() {
            return Ok(Some(file));
        }

        if status == ConflictStatus::Ignore {
            self.remember(&file.path);
        }
        file.clear_state();
        debug!(path = %file.path.display(), %status, "write dropped");
        Ok(None)
    }

    async fn flush(&self) -> Result<Vec<ConflictFile>, ConflicterError> {
        let ignored = std::mem::take(&mut *self.ignored.lock().unwrap_or_else(|e| e.into_inner()));
        if ignored.is_empty() {
            return Ok(Vec::new());
        }

        let path = self.conflicter.cwd().join(&self.rules_file_name);
        let mut contents = match tokio::fs::read_to_string(&path).await {
            Ok(existing) => existing,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(ConflicterError::io(&path, e)),
        };
        if !contents.is_empty() && !contents.ends_with('\n') {
            contents.push('\n');
        }
        contents.push_str(&ignored);

        info!(path = %path.display(), "remembering ignored files");
        Ok(vec![ConflictFile::new(path, Some(contents.into_bytes()))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::testing::TestAdapter;
    use crate::config::ConflicterOptions;
    use crate::conflict::ConflicterAction;
    use crate::yo_resolve::YoResolve;

    struct DropNamed(&'static str);

    #[async_trait]
    impl FileTransform for DropNamed {
        async fn transform(
            &self,
            file: ConflictFile,
        ) -> Result<Option<ConflictFile>, ConflicterError> {
            Ok((!file.path.ends_with(self.0)).then_some(file))
        }

        async fn flush(&self) -> Result<Vec<ConflictFile>, ConflicterError> {
            Ok(vec![ConflictFile::new("/flushed.txt", None)])
        }
    }

    struct Tag;

    #[async_trait]
    impl FileTransform for Tag {
        async fn transform(
            &self,
            file: ConflictFile,
        ) -> Result<Option<ConflictFile>, ConflicterError> {
            Ok(Some(file.with_status(ConflictStatus::Force)))
        }
    }

    fn names(files: &[ConflictFile]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.path.to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_pipeline_order_drop_and_flush() {
        let files = vec![
            ConflictFile::new("/a.txt", None),
            ConflictFile::new("/b.txt", None),
            ConflictFile::new("/c.txt", None),
        ];
        let output = pipeline(files, &[&DropNamed("b.txt"), &Tag], 2).await.unwrap();
        assert_eq!(names(&output), vec!["/a.txt", "/c.txt", "/flushed.txt"]);
        assert!(output
            .iter()
            .all(|f| f.status == Some(ConflictStatus::Force)));
    }

    #[tokio::test]
    async fn test_force_yo_files() {
        let stage = force_yo_files("/project");
        assert!(stage.matches(Path::new("/project/.yo-rc.json")));
        assert!(stage.matches(Path::new("/project/sub/.yo-resolve")));
        assert!(!stage.matches(Path::new("/project/src/index.js")));

        let file = stage
            .transform(ConflictFile::new("/project/.yo-rc-global.json", None))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(file.status, Some(ConflictStatus::Force));
    }

    #[tokio::test]
    async fn test_ignore_is_remembered_on_flush() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".yo-resolve"), "old.txt force").unwrap();
        std::fs::write(dir.path().join("a.txt"), "old\n").unwrap();

        let adapter = Arc::new(TestAdapter::new().with_action(ConflicterAction::Ignore));
        let options = ConflicterOptions {
            cwd: Some(dir.path().to_path_buf()),
            ..ConflicterOptions::default()
        };
        let conflicter = Arc::new(Conflicter::new(adapter, &options).unwrap());
        let stage = ConflicterTransform::new(conflicter);

        let dropped = stage
            .transform(ConflictFile::new(dir.path().join("a.txt"), Some(b"new\n".to_vec())))
            .await
            .unwrap();
        assert!(dropped.is_none());

        let flushed = stage.flush().await.unwrap();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].path, dir.path().join(".yo-resolve"));
        assert_eq!(
            flushed[0].contents.as_deref(),
            Some(&b"old.txt force\na.txt skip\n"[..])
        );
        assert!(stage.flush().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remembered_rules_match_their_files() {
        let dir = tempfile::tempdir().unwrap();
        let names = ["pages/[id].tsx", "my notes.txt"];
        std::fs::create_dir_all(dir.path().join("pages")).unwrap();
        for name in names {
            std::fs::write(dir.path().join(name), "old\n").unwrap();
        }

        let adapter = Arc::new(TestAdapter::new().with_action(ConflicterAction::Ignore));
        let options = ConflicterOptions {
            cwd: Some(dir.path().to_path_buf()),
            ..ConflicterOptions::default()
        };
        let stage = ConflicterTransform::new(Arc::new(Conflicter::new(adapter, &options).unwrap()));
        for name in names {
            let file = ConflictFile::new(dir.path().join(name), Some(b"new\n".to_vec()));
            assert!(stage.transform(file).await.unwrap().is_none());
        }

        let flushed = stage.flush().await.unwrap();
        let rules = String::from_utf8(flushed[0].contents.clone().unwrap()).unwrap();
        assert_eq!(rules, "pages/\\[id\\].tsx skip\nmy\\ notes.txt skip\n");
        std::fs::write(&flushed[0].path, &rules).unwrap();

        let resolver = YoResolve::new();
        for name in names {
            assert_eq!(
                resolver.get_status_for_file(&dir.path().join(name)).await,
                Some(ConflictStatus::Skip),
                "{name}"
            );
        }
    }

    #[tokio::test]
    async fn test_ignored_file_outside_cwd_is_not_remembered() {
        let cwd = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let path = elsewhere.path().join("a.txt");
        std::fs::write(&path, "old\n").unwrap();

        let adapter = Arc::new(TestAdapter::new().with_action(ConflicterAction::Ignore));
        let options = ConflicterOptions {
            cwd: Some(cwd.path().to_path_buf()),
            ..ConflicterOptions::default()
        };
        let stage = ConflicterTransform::new(Arc::new(Conflicter::new(adapter, &options).unwrap()));

        let dropped = stage
            .transform(ConflictFile::new(&path, Some(b"new\n".to_vec())))
            .await
            .unwrap();
        assert!(dropped.is_none());
        assert!(stage.flush().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_forwarded_file_keeps_status_without_bookkeeping() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "old\n").unwrap();

        let adapter = Arc::new(TestAdapter::new().with_action(ConflicterAction::Write));
        let options = ConflicterOptions {
            cwd: Some(dir.path().to_path_buf()),
            ..ConflicterOptions::default()
        };
        let stage = ConflicterTransform::new(Arc::new(Conflicter::new(adapter, &options).unwrap()));

        let file = stage
            .transform(ConflictFile::new(dir.path().join("a.txt"), Some(b"new\n".to_vec())))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(file.status, Some(ConflictStatus::Force));
        assert!(file.binary.is_none());
        assert!(file.changes.is_none());
        assert!(file.state.is_some());
    }
}
