//! Interactive conflict resolution.
//!
//! The ask loop presents a keyed menu for a conflicting file and keeps
//! re-prompting while the user inspects (`diff`), re-checks (`reload`) or
//! edits (`edit`) the file. Terminal choices map to a [`ConflictStatus`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use super::Conflicter;
use crate::adapter::{Adapter, Answer, EditorQuestion, ExpandQuestion, MenuEntry, Question};
use crate::errors::ConflicterError;
use crate::models::{ConflictFile, ConflictStatus};

/// Prompt traversals allowed for one file before the loop gives up.
pub const MAX_ASK_ATTEMPTS: u32 = 5;

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// An entry of the conflict menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflicterAction {
    /// Overwrite this file.
    Write,
    Skip,
    /// Overwrite this file and every later one without asking.
    Force,
    Abort,
    Diff,
    Reload,
    Edit,
    /// Skip and remember the decision in the override file.
    Ignore,
    /// An action added by a menu customizer.
    Custom(String),
}

impl fmt::Display for ConflicterAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Write => write!(f, "write"),
            Self::Skip => write!(f, "skip"),
            Self::Force => write!(f, "force"),
            Self::Abort => write!(f, "abort"),
            Self::Diff => write!(f, "diff"),
            Self::Reload => write!(f, "reload"),
            Self::Edit => write!(f, "edit"),
            Self::Ignore => write!(f, "ignore"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// Programmatic decision: `(file, relative_path, adapter) -> action`.
pub type ResolverCallback =
    Arc<dyn Fn(&mut ConflictFile, &Path, &dyn Adapter) -> ConflicterAction + Send + Sync>;

/// Value carried by a menu choice.
#[derive(Clone)]
pub enum ActionValue {
    Action(ConflicterAction),
    /// Invoked when picked; its result is handled as if it had been picked.
    Resolver(ResolverCallback),
}

impl ActionValue {
    pub fn resolver<F>(callback: F) -> Self
    where
        F: Fn(&mut ConflictFile, &Path, &dyn Adapter) -> ConflicterAction + Send + Sync + 'static,
    {
        Self::Resolver(Arc::new(callback))
    }
}

impl From<ConflicterAction> for ActionValue {
    fn from(action: ConflicterAction) -> Self {
        Self::Action(action)
    }
}

impl fmt::Debug for ActionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(action) => f.debug_tuple("Action").field(action).finish(),
            Self::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Menu
// ---------------------------------------------------------------------------

/// What a menu customizer knows about the file being asked about.
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// The target is a regular file, so file-only actions are offered.
    pub is_file: bool,
    pub relative_path: PathBuf,
    /// Separator offered by the adapter, if any.
    pub separator: Option<MenuEntry>,
}

/// Hook that may add, remove or reorder menu entries before presentation.
pub type ActionCustomizer =
    Arc<dyn Fn(Vec<MenuEntry>, &ActionContext) -> Vec<MenuEntry> + Send + Sync>;

/// The built-in conflict menu.
pub fn default_actions(context: &ActionContext) -> Vec<MenuEntry> {
    let mut entries = vec![
        MenuEntry::choice('y', "overwrite", ConflicterAction::Write),
        MenuEntry::choice('n', "do not overwrite", ConflicterAction::Skip),
        MenuEntry::choice('a', "overwrite this and all others", ConflicterAction::Force),
        MenuEntry::choice('x', "abort", ConflicterAction::Abort),
    ];

    if context.is_file {
        entries.extend(context.separator.clone());
        entries.extend([
            MenuEntry::choice(
                'd',
                "show the differences between the old and the new",
                ConflicterAction::Diff,
            ),
            MenuEntry::choice('r', "reload file (experimental)", ConflicterAction::Reload),
            MenuEntry::choice('e', "edit file (experimental)", ConflicterAction::Edit),
            MenuEntry::choice(
                'i',
                "ignore, do not overwrite and remember (experimental)",
                ConflicterAction::Ignore,
            ),
        ]);
    }
    entries
}

// ---------------------------------------------------------------------------
// Ask loop
// ---------------------------------------------------------------------------

impl Conflicter {
    /// Prompt until the user settles on a terminal action for `file`.
    pub(crate) async fn ask(
        &self,
        file: &mut ConflictFile,
        adapter: &dyn Adapter,
    ) -> Result<ConflictStatus, ConflicterError> {
        let relative_path = file.relative_to(self.cwd());
        let message = format!("Overwrite {}?", relative_path.display());
        let mut counter = 1;

        loop {
            let is_file = tokio::fs::metadata(&file.path)
                .await
                .map(|metadata| metadata.is_file())
                .unwrap_or(false);
            let context = ActionContext {
                is_file,
                relative_path: relative_path.clone(),
                separator: adapter.separator(),
            };
            let mut choices = default_actions(&context);
            if let Some(customize) = &self.customize_actions {
                choices = customize(choices, &context);
            }

            let answer = adapter
                .prompt(Question::Expand(ExpandQuestion {
                    name: "action".into(),
                    message: message.clone(),
                    page_size: 20,
                    choices,
                }))
                .await?;

            let action = match answer {
                Answer::Action(ActionValue::Action(action)) => action,
                Answer::Action(ActionValue::Resolver(callback)) => {
                    callback(file, &relative_path, adapter)
                }
                Answer::Text(_) => {
                    return Err(ConflicterError::Prompt(format!(
                        "expected an action for '{message}', got text"
                    )))
                }
            };
            debug!(path = %relative_path.display(), %action, counter, "conflict action chosen");

            match action {
                ConflicterAction::Write => return Ok(ConflictStatus::Force),
                ConflicterAction::Skip => return Ok(ConflictStatus::Skip),
                ConflicterAction::Ignore => return Ok(ConflictStatus::Ignore),
                ConflicterAction::Force => {
                    self.set_force(true);
                    return Ok(ConflictStatus::Force);
                }
                ConflicterAction::Abort => {
                    adapter.writeln("Aborting ...");
                    return Err(ConflicterError::AbortedByUser);
                }
                ConflicterAction::Diff => self.print_diff(file, adapter).await,
                ConflicterAction::Reload => {
                    if !self.detector.detect(file).await? {
                        return Ok(ConflictStatus::Identical);
                    }
                }
                ConflicterAction::Edit => {
                    self.edit(file, &relative_path, adapter).await?;
                    if !self.detector.detect(file).await? {
                        return Ok(ConflictStatus::Skip);
                    }
                }
                ConflicterAction::Custom(name) => {
                    warn!(path = %relative_path.display(), action = name.as_str(), "unknown conflict action");
                    return Ok(ConflictStatus::Other(name));
                }
            }

            counter += 1;
            if counter == MAX_ASK_ATTEMPTS {
                return Err(ConflicterError::RecursiveAsk { message });
            }
        }
    }

    /// Replace the proposed contents with text from the editor.
    async fn edit(
        &self,
        file: &mut ConflictFile,
        relative_path: &Path,
        adapter: &dyn Adapter,
    ) -> Result<(), ConflicterError> {
        let postfix = file
            .path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let default = file
            .contents
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned());

        let answer = adapter
            .prompt(Question::Editor(EditorQuestion {
                name: "content".into(),
                message: format!("Edit {}", relative_path.display()),
                default,
                postfix,
            }))
            .await?;

        let text = match answer {
            Answer::Text(text) => text.unwrap_or_default(),
            Answer::Action(_) => {
                return Err(ConflicterError::Prompt(
                    "expected edited text, got an action".into(),
                ))
            }
        };
        file.contents = Some(text.into_bytes());
        Ok(())
    }
}
