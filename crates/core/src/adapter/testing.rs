//! A scripted adapter for tests and non-interactive runs.
//!
//! Answers come from a queue first, then from the configured defaults.
//! Every prompt and every log call is recorded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Adapter, Answer, ColoredMessage, MenuEntry, Question};
use crate::conflict::{ActionValue, ConflicterAction};
use crate::errors::ConflicterError;
use crate::models::ConflictStatus;

/// A recorded log call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Status(ConflictStatus, String),
    Line(String),
    Colored(Vec<ColoredMessage>),
}

#[derive(Default)]
pub struct TestAdapter {
    answers: Mutex<VecDeque<Answer>>,
    default_action: Option<ActionValue>,
    editor_text: Option<String>,
    separator: bool,
    closed: AtomicBool,
    prompts: Mutex<Vec<Question>>,
    logs: Mutex<Vec<LogRecord>>,
}

impl TestAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every menu with `action` once the queue is empty.
    pub fn with_action(mut self, action: ConflicterAction) -> Self {
        self.default_action = Some(ActionValue::Action(action));
        self
    }

    /// Answer every menu with a resolver callback once the queue is empty.
    pub fn with_default_answer(mut self, value: ActionValue) -> Self {
        self.default_action = Some(value);
        self
    }

    /// Queue menu answers, consumed in order.
    pub fn with_actions(self, actions: impl IntoIterator<Item = ConflicterAction>) -> Self {
        self.with_answers(
            actions
                .into_iter()
                .map(|action| Answer::Action(ActionValue::Action(action))),
        )
    }

    /// Queue raw answers, consumed in order.
    pub fn with_answers(self, answers: impl IntoIterator<Item = Answer>) -> Self {
        self.answers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(answers);
        self
    }

    /// Text returned by editor questions once the queue is empty.
    pub fn with_editor_text(mut self, text: impl Into<String>) -> Self {
        self.editor_text = Some(text.into());
        self
    }

    /// Offer a menu separator.
    pub fn with_separator(mut self) -> Self {
        self.separator = true;
        self
    }

    pub fn prompts(&self) -> Vec<Question> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn logs(&self) -> Vec<LogRecord> {
        self.logs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn status_lines(&self) -> Vec<(ConflictStatus, String)> {
        self.logs()
            .into_iter()
            .filter_map(|record| match record {
                LogRecord::Status(status, message) => Some((status, message)),
                _ => None,
            })
            .collect()
    }

    pub fn lines(&self) -> Vec<String> {
        self.logs()
            .into_iter()
            .filter_map(|record| match record {
                LogRecord::Line(line) => Some(line),
                _ => None,
            })
            .collect()
    }

    pub fn colored_calls(&self) -> Vec<Vec<ColoredMessage>> {
        self.logs()
            .into_iter()
            .filter_map(|record| match record {
                LogRecord::Colored(segments) => Some(segments),
                _ => None,
            })
            .collect()
    }

    fn record(&self, record: LogRecord) {
        self.logs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }

    fn next_answer(&self, question: &Question) -> Result<Answer, ConflicterError> {
        if let Some(answer) = self
            .answers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
        {
            return Ok(answer);
        }

        match question {
            Question::Expand(_) => self
                .default_action
                .clone()
                .map(Answer::Action)
                .ok_or_else(|| ConflicterError::MissingAnswer(question.name().to_string())),
            Question::Editor(editor) => Ok(Answer::Text(
                self.editor_text.clone().or_else(|| editor.default.clone()),
            )),
        }
    }
}

#[async_trait]
impl Adapter for TestAdapter {
    async fn prompt(&self, question: Question) -> Result<Answer, ConflicterError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConflicterError::AdapterClosed);
        }
        let answer = self.next_answer(&question);
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(question);
        answer
    }

    fn log_status(&self, status: &ConflictStatus, message: &str) {
        self.record(LogRecord::Status(status.clone(), message.to_string()));
    }

    fn writeln(&self, message: &str) {
        self.record(LogRecord::Line(message.to_string()));
    }

    fn colored(&self, segments: &[ColoredMessage]) {
        self.record(LogRecord::Colored(segments.to_vec()));
    }

    fn separator(&self) -> Option<MenuEntry> {
        self.separator.then_some(MenuEntry::Separator)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
