//! The I/O collaborator the conflicter talks to.
//!
//! An [`Adapter`] can prompt and log. Adapters that own a serialized task
//! queue expose it through [`Adapter::serialized`]; the conflicter routes
//! its whole ask loop through that queue so at most one conflict menu is on
//! screen at a time, even when many files are being checked concurrently.

pub mod queued;
pub mod testing;

use std::future::Future;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tracing::debug;

use crate::conflict::ActionValue;
use crate::errors::ConflicterError;
use crate::models::ConflictStatus;

pub use queued::QueuedAdapter;

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Colour slot for a segment of coloured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Added,
    Removed,
}

/// A piece of coloured output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColoredMessage {
    pub message: String,
    pub color: Option<Color>,
}

impl ColoredMessage {
    pub fn plain(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            color: None,
        }
    }

    pub fn colored(message: impl Into<String>, color: Color) -> Self {
        Self {
            message: message.into(),
            color: Some(color),
        }
    }
}

// ---------------------------------------------------------------------------
// Questions and answers
// ---------------------------------------------------------------------------

/// One selectable entry of an expand menu.
#[derive(Debug, Clone)]
pub struct Choice {
    pub key: char,
    pub name: String,
    pub value: ActionValue,
}

/// An expand-menu row: a choice or a visual separator.
#[derive(Debug, Clone)]
pub enum MenuEntry {
    Choice(Choice),
    Separator,
}

impl MenuEntry {
    pub fn choice(key: char, name: impl Into<String>, value: impl Into<ActionValue>) -> Self {
        Self::Choice(Choice {
            key,
            name: name.into(),
            value: value.into(),
        })
    }

    pub fn as_choice(&self) -> Option<&Choice> {
        match self {
            Self::Choice(choice) => Some(choice),
            Self::Separator => None,
        }
    }
}

/// Pick one action from a keyed menu.
#[derive(Debug, Clone)]
pub struct ExpandQuestion {
    pub name: String,
    pub message: String,
    pub page_size: usize,
    pub choices: Vec<MenuEntry>,
}

/// Edit a block of text in an external editor.
#[derive(Debug, Clone)]
pub struct EditorQuestion {
    pub name: String,
    pub message: String,
    pub default: Option<String>,
    /// Suffix for the temporary file, so editors pick the right syntax.
    pub postfix: String,
}

#[derive(Debug, Clone)]
pub enum Question {
    Expand(ExpandQuestion),
    Editor(EditorQuestion),
}

impl Question {
    pub fn name(&self) -> &str {
        match self {
            Self::Expand(question) => &question.name,
            Self::Editor(question) => &question.name,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Expand(question) => &question.message,
            Self::Editor(question) => &question.message,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Answer {
    /// The value of the picked menu entry.
    Action(ActionValue),
    /// Edited text; `None` when the editor was closed without saving.
    Text(Option<String>),
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Prompting and logging collaborator.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Ask a single question.
    async fn prompt(&self, question: Question) -> Result<Answer, ConflicterError>;

    /// Status line such as `   create src/index.js`.
    fn log_status(&self, status: &ConflictStatus, message: &str);

    fn writeln(&self, message: &str);

    fn colored(&self, segments: &[ColoredMessage]);

    /// A separator to decorate menus with, if the adapter can render one.
    fn separator(&self) -> Option<MenuEntry> {
        None
    }

    /// Serialized-task capability.
    fn serialized(&self) -> Option<Serialized<'_>> {
        None
    }

    /// Reject any further prompt.
    fn close(&self) {}
}

/// A task queue together with the adapter tasks on it should talk to.
///
/// Tasks receive the queue's underlying adapter rather than the queuing
/// one, so prompting from inside a task does not wait on the queue again.
pub struct Serialized<'a> {
    pub queue: &'a TaskQueue,
    pub adapter: &'a dyn Adapter,
}

// ---------------------------------------------------------------------------
// TaskQueue
// ---------------------------------------------------------------------------

/// Runs tasks one at a time, in arrival order.
///
/// Once closed, waiting and running tasks fail with
/// [`ConflicterError::AdapterClosed`] and new tasks are rejected.
pub struct TaskQueue {
    lock: Mutex<()>,
    closed: watch::Sender<bool>,
}

impl TaskQueue {
    pub fn new() -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            lock: Mutex::new(()),
            closed,
        }
    }

    /// Run `task` once every earlier task has finished.
    pub async fn run<T, F>(&self, task: F) -> Result<T, ConflicterError>
    where
        F: Future<Output = Result<T, ConflicterError>>,
    {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(ConflicterError::AdapterClosed);
        }

        let _guard = tokio::select! {
            guard = self.lock.lock() => guard,
            _ = closed.wait_for(|closed| *closed) => {
                debug!("queued task rejected: queue closed while waiting");
                return Err(ConflicterError::AdapterClosed);
            }
        };

        tokio::select! {
            result = task => result,
            _ = closed.wait_for(|closed| *closed) => {
                debug!("queued task cancelled: queue closed while running");
                Err(ConflicterError::AdapterClosed)
            }
        }
    }

    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_queue_serializes_tasks() {
        let queue = Arc::new(TaskQueue::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let (queue, active, peak) = (queue.clone(), active.clone(), peak.clone());
            handles.push(tokio::spawn(async move {
                queue
                    .run(async {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_new_tasks() {
        let queue = TaskQueue::new();
        queue.close();
        assert!(queue.is_closed());
        let result = queue.run(async { Ok(1) }).await;
        assert!(matches!(result, Err(ConflicterError::AdapterClosed)));
    }

    #[tokio::test]
    async fn test_close_cancels_running_and_waiting_tasks() {
        let queue = Arc::new(TaskQueue::new());

        let running = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .run(async {
                        std::future::pending::<()>().await;
                        Ok(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let waiting = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.run(async { Ok(()) }).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        queue.close();
        assert!(matches!(
            running.await.unwrap(),
            Err(ConflicterError::AdapterClosed)
        ));
        assert!(matches!(
            waiting.await.unwrap(),
            Err(ConflicterError::AdapterClosed)
        ));
    }
}
