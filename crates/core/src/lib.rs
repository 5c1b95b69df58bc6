//! Conflicter core library.
//!
//! Decides, for each proposed file write, whether it proceeds, is skipped
//! or needs a human decision: per-directory override rules, conflict
//! detection against the filesystem, the interactive ask loop and the
//! pipeline stages that apply the outcome.

pub mod adapter;
pub mod config;
pub mod conflict;
pub mod diff;
pub mod errors;
pub mod models;
pub mod transform;
pub mod yo_resolve;

// Re-exports for convenience.
pub use adapter::{Adapter, QueuedAdapter};
pub use config::{ConflicterConfig, ConflicterOptions};
pub use conflict::{ActionValue, Conflicter, ConflicterAction};
pub use errors::{ConfigError, ConflicterError};
pub use models::{ConflictFile, ConflictStatus};
pub use transform::{force_yo_files, pipeline, ConflicterTransform, FileTransform};
pub use yo_resolve::YoResolve;
