//! Conflict detection and interactive resolution.
//!
//! The conflict subsystem is responsible for:
//! 1. **Detection** -- comparing a proposed write with the file on disk.
//! 2. **Classification** -- the per-file collision check and its policy
//!    coercions (force, bail, dry run, regenerate).
//! 3. **Resolution** -- the interactive ask loop for real conflicts.

pub mod conflicter;
pub mod detector;
pub mod resolver;

pub use conflicter::Conflicter;
pub use detector::ConflictDetector;
pub use resolver::{
    default_actions, ActionContext, ActionCustomizer, ActionValue, ConflicterAction,
    ResolverCallback, MAX_ASK_ATTEMPTS,
};
