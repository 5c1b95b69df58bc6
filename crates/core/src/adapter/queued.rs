//! Adapter wrapper that funnels prompts through a [`TaskQueue`].

use async_trait::async_trait;

use super::{Adapter, Answer, ColoredMessage, MenuEntry, Question, Serialized, TaskQueue};
use crate::errors::ConflicterError;
use crate::models::ConflictStatus;

/// Serializes every prompt of the wrapped adapter.
///
/// Logging passes straight through; prompts and queued tasks run one at a
/// time. Closing the adapter fails everything still queued.
pub struct QueuedAdapter<A> {
    inner: A,
    queue: TaskQueue,
}

impl<A: Adapter> QueuedAdapter<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            queue: TaskQueue::new(),
        }
    }

    /// The wrapped adapter.
    pub fn inner(&self) -> &A {
        &self.inner
    }
}

#[async_trait]
impl<A: Adapter> Adapter for QueuedAdapter<A> {
    async fn prompt(&self, question: Question) -> Result<Answer, ConflicterError> {
        self.queue.run(self.inner.prompt(question)).await
    }

    fn log_status(&self, status: &ConflictStatus, message: &str) {
        self.inner.log_status(status, message);
    }

    fn writeln(&self, message: &str) {
        self.inner.writeln(message);
    }

    fn colored(&self, segments: &[ColoredMessage]) {
        self.inner.colored(segments);
    }

    fn separator(&self) -> Option<MenuEntry> {
        self.inner.separator()
    }

    fn serialized(&self) -> Option<Serialized<'_>> {
        Some(Serialized {
            queue: &self.queue,
            adapter: &self.inner,
        })
    }

    fn close(&self) {
        self.queue.close();
        self.inner.close();
    }
}
