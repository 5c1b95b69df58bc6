//! Shared styling utilities for terminal output.

use console::Style;

use conflicter_core::adapter::Color;
use conflicter_core::models::ConflictStatus;

/// Width of the status column, sized for the longest status name.
pub const STATUS_WIDTH: usize = 9;

/// Colour of a per-file status word.
pub fn status_style(status: &ConflictStatus) -> Style {
    match status {
        ConflictStatus::Create => Style::new().green(),
        ConflictStatus::Force | ConflictStatus::Skip => Style::new().yellow(),
        ConflictStatus::Conflict => Style::new().red(),
        ConflictStatus::Identical => Style::new().cyan(),
        _ => Style::new(),
    }
}

/// A right-aligned, coloured status line: `   create src/index.js`.
pub fn status_line(status: &ConflictStatus, message: &str) -> String {
    let padded = format!("{:>width$}", status.as_str(), width = STATUS_WIDTH);
    format!("{} {}", status_style(status).apply_to(padded), message)
}

/// Colour of a diff segment.
pub fn diff_style(color: Color) -> Style {
    match color {
        Color::Added => Style::new().green(),
        Color::Removed => Style::new().red(),
    }
}

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

/// Create a header-styled string (bold, white).
pub fn header(msg: &str) -> String {
    let style = Style::new().bold();
    style.apply_to(msg).to_string()
}
