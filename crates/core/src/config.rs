//! TOML-based configuration for a conflicter run.
//!
//! Every section and field is optional; a missing file section takes its
//! defaults. CLI flags are layered on top by the caller.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::diff::DiffOptions;
use crate::errors::ConfigError;
use crate::yo_resolve::DEFAULT_YO_RESOLVE_FILE_NAME;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration loaded from `conflicter.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflicterConfig {
    /// Session policy for the collision check.
    #[serde(default)]
    pub conflicter: ConflicterOptions,

    /// Override-file lookup.
    #[serde(default)]
    pub resolve: ResolveConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Policy of one [`Conflicter`](crate::conflict::Conflicter) session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflicterOptions {
    /// Overwrite every existing file without asking.
    #[serde(default)]
    pub force: bool,

    /// Abort on the first conflict or newly created file.
    #[serde(default)]
    pub bail: bool,

    /// Whitespace-only changes are not conflicts.
    #[serde(default)]
    pub ignore_whitespace: bool,

    /// Write files whose content is identical to disk.
    #[serde(default)]
    pub regenerate: bool,

    /// Detect everything, write nothing.
    #[serde(default)]
    pub dry_run: bool,

    /// Base for relative paths in logs and prompts. Defaults to the process
    /// working directory.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    #[serde(default)]
    pub diff: DiffOptions,
}

/// `[resolve]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveConfig {
    /// Name of the per-directory override file.
    #[serde(default = "default_resolve_file_name")]
    pub file_name: String,
}

fn default_resolve_file_name() -> String {
    DEFAULT_YO_RESOLVE_FILE_NAME.to_string()
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            file_name: default_resolve_file_name(),
        }
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Files checked concurrently. Prompts stay serialized regardless.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    8
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl ConflicterConfig {
    /// Load and validate a TOML configuration file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ConflicterConfig =
            toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.concurrency".into(),
                detail: "concurrency must be >= 1".into(),
            });
        }
        let file_name = &self.resolve.file_name;
        if file_name.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "resolve.file_name".into(),
                detail: "override file name must not be empty".into(),
            });
        }
        if file_name.contains('/') || file_name.contains('\\') {
            return Err(ConfigError::InvalidValue {
                field: "resolve.file_name".into(),
                detail: "override file name must not contain path separators".into(),
            });
        }
        Ok(())
    }
}
