//! Interactive terminal adapter.
//!
//! Menus render with `dialoguer::Select`, edits open `$EDITOR` through
//! `dialoguer::Editor`. Both block, so they run on the blocking pool.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dialoguer::{Editor, Select};

use conflicter_core::adapter::{
    Adapter, Answer, ColoredMessage, EditorQuestion, ExpandQuestion, MenuEntry, Question,
};
use conflicter_core::conflict::ActionValue;
use conflicter_core::errors::ConflicterError;
use conflicter_core::models::ConflictStatus;

use crate::style;

#[derive(Default)]
pub struct TerminalAdapter {
    closed: AtomicBool,
}

impl TerminalAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    async fn select(&self, question: ExpandQuestion) -> Result<Answer, ConflicterError> {
        let (labels, values): (Vec<String>, Vec<ActionValue>) = question
            .choices
            .iter()
            .filter_map(MenuEntry::as_choice)
            .map(|choice| (format!("{}) {}", choice.key, choice.name), choice.value.clone()))
            .unzip();
        if labels.is_empty() {
            return Err(ConflicterError::Prompt(format!(
                "no choices for '{}'",
                question.message
            )));
        }

        let message = question.message;
        let page_size = question.page_size;
        let index = tokio::task::spawn_blocking(move || {
            Select::new()
                .with_prompt(message)
                .items(&labels)
                .default(0)
                .max_length(page_size)
                .interact()
        })
        .await
        .map_err(|e| ConflicterError::Prompt(e.to_string()))?
        .map_err(|e| ConflicterError::Prompt(e.to_string()))?;

        values
            .into_iter()
            .nth(index)
            .map(Answer::Action)
            .ok_or_else(|| ConflicterError::Prompt(format!("choice {index} out of range")))
    }

    async fn edit(&self, question: EditorQuestion) -> Result<Answer, ConflicterError> {
        println!("{}", style::header(&question.message));
        let text = tokio::task::spawn_blocking(move || {
            Editor::new()
                .extension(&question.postfix)
                .edit(question.default.as_deref().unwrap_or_default())
        })
        .await
        .map_err(|e| ConflicterError::Prompt(e.to_string()))?
        .map_err(|e| ConflicterError::Prompt(e.to_string()))?;
        Ok(Answer::Text(text))
    }
}

#[async_trait]
impl Adapter for TerminalAdapter {
    async fn prompt(&self, question: Question) -> Result<Answer, ConflicterError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConflicterError::AdapterClosed);
        }
        match question {
            Question::Expand(question) => self.select(question).await,
            Question::Editor(question) => self.edit(question).await,
        }
    }

    fn log_status(&self, status: &ConflictStatus, message: &str) {
        println!("{}", style::status_line(status, message));
    }

    fn writeln(&self, message: &str) {
        println!("{message}");
    }

    fn colored(&self, segments: &[ColoredMessage]) {
        let rendered: String = segments
            .iter()
            .map(|segment| match segment.color {
                Some(color) => style::diff_style(color)
                    .apply_to(&segment.message)
                    .to_string(),
                None => segment.message.clone(),
            })
            .collect();
        print!("{rendered}");
    }

    fn separator(&self) -> Option<MenuEntry> {
        Some(MenuEntry::Separator)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closed_terminal_rejects_prompts() {
        let adapter = TerminalAdapter::new();
        adapter.close();
        let question = Question::Expand(ExpandQuestion {
            name: "action".into(),
            message: "Overwrite a.txt?".into(),
            page_size: 20,
            choices: Vec::new(),
        });
        assert!(matches!(
            adapter.prompt(question).await,
            Err(ConflicterError::AdapterClosed)
        ));
    }

    #[tokio::test]
    async fn test_empty_menu_is_an_error() {
        let adapter = TerminalAdapter::new();
        let question = Question::Expand(ExpandQuestion {
            name: "action".into(),
            message: "Overwrite a.txt?".into(),
            page_size: 20,
            choices: vec![MenuEntry::Separator],
        });
        assert!(matches!(
            adapter.prompt(question).await,
            Err(ConflicterError::Prompt(_))
        ));
    }
}
