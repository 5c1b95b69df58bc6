//! The per-file collision check.
//!
//! A [`Conflicter`] holds one session's policy (force, bail, dry run, ...)
//! and classifies each proposed write, asking the adapter when a real
//! conflict needs a human decision. Several sessions may coexist over the
//! same filesystem.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::detector::ConflictDetector;
use super::resolver::ActionCustomizer;
use crate::adapter::{Adapter, Color, ColoredMessage, Serialized};
use crate::config::ConflicterOptions;
use crate::diff::render_binary_diff_summary;
use crate::errors::ConflicterError;
use crate::models::{ChangeKind, ConflictFile, ConflictStatus};

pub struct Conflicter {
    adapter: Arc<dyn Adapter>,
    force: AtomicBool,
    bail: bool,
    regenerate: bool,
    dry_run: bool,
    cwd: PathBuf,
    pub(super) detector: ConflictDetector,
    pub(super) customize_actions: Option<ActionCustomizer>,
}

impl Conflicter {
    /// Build a session. A relative or missing `cwd` is resolved against the
    /// process working directory; `bail` switches `force` off.
    pub fn new(adapter: Arc<dyn Adapter>, options: &ConflicterOptions) -> Result<Self, ConflicterError> {
        let cwd = match &options.cwd {
            Some(cwd) if cwd.is_absolute() => cwd.clone(),
            other => {
                let base = std::env::current_dir().map_err(|e| ConflicterError::io(".", e))?;
                match other {
                    Some(relative) => base.join(relative),
                    None => base,
                }
            }
        };

        let force = options.force && !options.bail;
        if options.force && options.bail {
            debug!("bail mode disables force");
        }

        Ok(Self {
            adapter,
            force: AtomicBool::new(force),
            bail: options.bail,
            regenerate: options.regenerate,
            dry_run: options.dry_run,
            cwd,
            detector: ConflictDetector::new(options.ignore_whitespace, options.diff),
            customize_actions: None,
        })
    }

    /// Install a hook that rewrites the conflict menu before each prompt.
    pub fn with_action_customizer(mut self, customize: ActionCustomizer) -> Self {
        self.customize_actions = Some(customize);
        self
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn is_force(&self) -> bool {
        self.force.load(Ordering::SeqCst)
    }

    /// Flip the session-wide force flag; later files stop prompting.
    pub fn set_force(&self, force: bool) {
        self.force.store(force, Ordering::SeqCst);
    }

    // -----------------------------------------------------------------------
    // Collision check
    // -----------------------------------------------------------------------

    /// Decide the status of `file` and log it.
    ///
    /// A status that is already set is kept; only the dry-run and
    /// regenerate coercions apply to it.
    pub async fn check_for_collision(
        &self,
        mut file: ConflictFile,
    ) -> Result<ConflictFile, ConflicterError> {
        let relative_path = file.relative_to(&self.cwd);
        let mut detected = false;

        if file.status.is_none() {
            let status = self.classify(&mut file, &relative_path).await?;
            detected = status == ConflictStatus::Conflict;
            file.status = Some(status);

            if detected && !self.bail && !self.dry_run {
                let resolved = self.resolve(&mut file).await?;
                file.status = Some(resolved);
            }
        }

        let status = file.status.clone().unwrap_or(ConflictStatus::Skip);
        if detected && self.bail {
            self.adapter.log_status(&ConflictStatus::Conflict, &display(&relative_path));
            self.print_diff(&file, self.adapter.as_ref()).await;
            self.adapter.writeln("Aborting ...");
            return Err(ConflicterError::AbortedByConflict {
                relative_path,
                file: Box::new(file),
            });
        }

        if self.dry_run {
            if detected {
                file.changes_detected = true;
                self.print_diff(&file, self.adapter.as_ref()).await;
            }
            file.classification = Some(status);
            file.status = Some(ConflictStatus::Skip);
        } else if status == ConflictStatus::Identical && !self.regenerate {
            file.classification = Some(status);
            file.status = Some(ConflictStatus::Skip);
        }

        let logged = file
            .classification
            .clone()
            .or_else(|| file.status.clone())
            .unwrap_or(ConflictStatus::Skip);
        self.adapter
            .log_status(&logged.log_level(), &display(&relative_path));
        info!(
            path = %relative_path.display(),
            status = %file.status.as_ref().unwrap_or(&ConflictStatus::Skip),
            "collision check finished"
        );
        Ok(file)
    }

    /// Classify a file without a preset status.
    async fn classify(
        &self,
        file: &mut ConflictFile,
        relative_path: &Path,
    ) -> Result<ConflictStatus, ConflicterError> {
        let metadata = match tokio::fs::metadata(&file.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if self.bail {
                    self.adapter.writeln("Aborting ...");
                    return Err(ConflicterError::AbortedByConflict {
                        relative_path: relative_path.to_path_buf(),
                        file: Box::new(file.clone()),
                    });
                }
                return Ok(ConflictStatus::Create);
            }
            Err(e) => return Err(ConflicterError::io(&file.path, e)),
        };

        if self.is_force() {
            if metadata.is_dir() {
                warn!(path = %file.path.display(), "forcing a file write over a directory");
            }
            return Ok(ConflictStatus::Force);
        }

        if self.detector.detect(file).await? {
            Ok(ConflictStatus::Conflict)
        } else {
            Ok(ConflictStatus::Identical)
        }
    }

    /// Run the ask loop, through the adapter's serialized queue when it has one.
    async fn resolve(&self, file: &mut ConflictFile) -> Result<ConflictStatus, ConflicterError> {
        match self.adapter.serialized() {
            Some(Serialized { queue, adapter }) => {
                queue.run(self.ask_unless_forced(file, adapter)).await
            }
            None => self.ask_unless_forced(file, self.adapter.as_ref()).await,
        }
    }

    async fn ask_unless_forced(
        &self,
        file: &mut ConflictFile,
        adapter: &dyn Adapter,
    ) -> Result<ConflictStatus, ConflicterError> {
        if self.is_force() {
            debug!(path = %file.path.display(), "force enabled while waiting, not asking");
            return Ok(ConflictStatus::Force);
        }
        self.ask(file, adapter).await
    }

    // -----------------------------------------------------------------------
    // Diff output
    // -----------------------------------------------------------------------

    /// Print what detection found for `file`.
    pub(crate) async fn print_diff(&self, file: &ConflictFile, adapter: &dyn Adapter) {
        if file.binary == Some(true) {
            for line in mode_lines(file) {
                adapter.writeln(&line);
            }
            match tokio::fs::metadata(&file.path).await {
                Ok(metadata) => {
                    adapter.writeln(&render_binary_diff_summary(&metadata, file.contents.as_deref()))
                }
                Err(e) => debug!(path = %file.path.display(), error = %e, "cannot stat for binary diff"),
            }
            return;
        }

        if file.changes.is_none() && file.mode_change.is_none() {
            return;
        }

        let mut segments = vec![
            ColoredMessage::plain("\n"),
            ColoredMessage::colored("removed", Color::Removed),
            ColoredMessage::plain(" "),
            ColoredMessage::colored("added", Color::Added),
            ColoredMessage::plain("\n\n"),
        ];
        for line in mode_lines(file) {
            segments.push(ColoredMessage::plain(format!("{line}\n")));
        }
        if file.mode_change.is_some() {
            segments.push(ColoredMessage::plain("\n"));
        }

        for hunk in file.changes.iter().flatten() {
            let color = match hunk.kind {
                ChangeKind::Added => Some(Color::Added),
                ChangeKind::Removed => Some(Color::Removed),
                ChangeKind::Unchanged => None,
            };
            match color {
                None => segments.push(ColoredMessage::plain(hunk.value.as_str())),
                Some(color) => {
                    for line in hunk.value.split_inclusive('\n') {
                        let (text, newline) = match line.strip_suffix('\n') {
                            Some(text) => (text, true),
                            None => (line, false),
                        };
                        if !text.is_empty() {
                            segments.push(ColoredMessage::colored(text, color));
                        }
                        if newline {
                            segments.push(ColoredMessage::plain("\n"));
                        }
                    }
                }
            }
        }
        segments.push(ColoredMessage::plain("\n\n"));
        adapter.colored(&segments);
    }
}

fn mode_lines(file: &ConflictFile) -> Vec<String> {
    match file.mode_change {
        Some(change) => vec![
            format!("old mode {:o}", change.old),
            format!("new mode {:o}", change.new),
        ],
        None => Vec::new(),
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
