//! Configuration management.
//!
//! The configuration is a JSON document at a fixed path in the working
//! directory, loaded once at startup and immutable for the run. When the
//! file is absent, a template with placeholder values is written so the
//! operator can fill it in and rerun; that is deliberate two-step
//! bootstrapping, not an error condition.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed configuration path, relative to the working directory.
pub const CONFIG_FILE: &str = "config.json";

/// Batch cap applied when the config leaves `max_projects_per_run` at zero.
pub const DEFAULT_MAX_PROJECTS_PER_RUN: usize = 20;

/// One ordered find→replace substitution rule.
///
/// Rules are applied in declaration order, which matters when one rule's
/// replacement contains another rule's find string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    /// Literal string to search for in decrypted content.
    pub find: String,

    /// Literal string it is replaced with.
    pub replace: String,
}

/// Process-wide run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Regex patterns identifying encrypted file names (search semantics:
    /// a pattern matching anywhere in the filename qualifies).
    pub encrypted_file_patterns: Vec<String>,

    /// Ordered substitution rules applied to every decrypted file.
    pub replacements: Vec<Replacement>,

    /// Base branch to check out after cloning, when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_branch: Option<String>,

    /// Branch to push rotated changes to; absent means push the current
    /// branch directly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_branch: Option<String>,

    /// Maximum projects processed in one run (0 means the default cap).
    pub max_projects_per_run: usize,

    /// Regex patterns a repository URL must match at least one of; empty
    /// means no URL filtering.
    pub repo_filter_patterns: Vec<String>,

    /// Whether projects with zero encrypted files still get a key reset.
    pub reset_keys_in_projects_without_encrypted_files: bool,

    /// Whether a project with per-file re-encryption failures still counts
    /// as complete and is recorded in the ledger.
    pub record_partial_reencryption: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            encrypted_file_patterns: Vec::new(),
            replacements: Vec::new(),
            checkout_branch: None,
            push_branch: None,
            max_projects_per_run: DEFAULT_MAX_PROJECTS_PER_RUN,
            repo_filter_patterns: Vec::new(),
            reset_keys_in_projects_without_encrypted_files: false,
            record_partial_reencryption: true,
        }
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No config file existed, so a template was written for the operator.
    #[error("no config file was found, so a template was created at {0}; update it and run again")]
    TemplateCreated(PathBuf),

    /// A template was needed but could not be written.
    #[error("no config file was found and writing a template to {path} failed: {source}")]
    TemplateWrite { path: PathBuf, source: io::Error },

    /// The config file exists but could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    /// The config file is not valid JSON for the expected shape.
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },

    /// A configured regex pattern does not compile.
    #[error("invalid pattern `{pattern}` in {field}: {source}")]
    InvalidPattern { field: &'static str, pattern: String, source: regex::Error },
}

impl Config {
    /// Load the configuration from `path`, bootstrapping a template when
    /// the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Self::template().write(path)?;
                return Err(ConfigError::TemplateCreated(path.to_path_buf()));
            }
            Err(e) => return Err(ConfigError::Read { path: path.to_path_buf(), source: e }),
        };

        let mut config: Self = serde_json::from_str(&data)
            .map_err(|e| ConfigError::Parse { path: path.to_path_buf(), source: e })?;

        if config.max_projects_per_run == 0 {
            config.max_projects_per_run = DEFAULT_MAX_PROJECTS_PER_RUN;
        }

        // Reject broken patterns up front; a selection or scan working from
        // a half-valid pattern list is worse than not starting.
        config.encrypted_patterns()?;
        config.repo_filter_regexes()?;

        Ok(config)
    }

    /// Compiled encrypted-file-name patterns, in configuration order.
    pub fn encrypted_patterns(&self) -> Result<Vec<Regex>, ConfigError> {
        compile_all(&self.encrypted_file_patterns, "encrypted_file_patterns")
    }

    /// Compiled repository-URL filter patterns, in configuration order.
    pub fn repo_filter_regexes(&self) -> Result<Vec<Regex>, ConfigError> {
        compile_all(&self.repo_filter_patterns, "repo_filter_patterns")
    }

    /// Placeholder configuration written on first run.
    pub fn template() -> Self {
        Self {
            encrypted_file_patterns: vec![String::new()],
            replacements: vec![Replacement {
                find: "find".to_string(),
                replace: "replace".to_string(),
            }],
            ..Self::default()
        }
    }

    fn write(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, json)
            .map_err(|e| ConfigError::TemplateWrite { path: path.to_path_buf(), source: e })
    }
}

fn compile_all(patterns: &[String], field: &'static str) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| ConfigError::InvalidPattern {
                field,
                pattern: p.clone(),
                source: e,
            })
        })
        .collect()
}
