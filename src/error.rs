//! Rotation pipeline error types.
//!
//! Every failure in the per-project pipeline is a [`RotationError`], and each
//! variant carries a [`Severity`] that tells the batch driver how to react:
//! abort the whole run, abandon the current project, or report and carry on.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::api::ApiError;
use crate::process::ProcessError;

/// How the batch driver must react to a [`RotationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Unsafe to continue past; the whole run stops.
    Fatal,

    /// The current project is abandoned (and not ledgered, so a later run
    /// retries it); the batch continues with the next project.
    SkipProject,

    /// Reported for operator attention but does not stop anything; the
    /// remote state cannot be undone by retrying.
    Warn,
}

/// Errors that can occur while rotating a single project.
#[derive(Debug, Error)]
pub enum RotationError {
    /// The hosting provider has no known clone host.
    #[error("unsupported repository provider `{provider}` for {project}, cannot build clone URL")]
    UnsupportedProvider { provider: String, project: String },

    /// `git clone` failed.
    #[error("failed to clone {url}: {source}")]
    Clone { url: String, source: ProcessError },

    /// `git checkout` of the configured base branch failed after a clone.
    #[error("failed to check out branch {branch}: {source}")]
    Checkout { branch: String, source: ProcessError },

    /// The workspace directory could not be listed.
    #[error("failed to list files in {path}: {source}")]
    ListWorkspace { path: PathBuf, source: io::Error },

    /// The key material could not be written to the workspace.
    #[error("failed to write key file {path}: {source}")]
    WriteKeyFile { path: PathBuf, source: io::Error },

    /// The external decrypt command failed for one file.
    #[error("failed to decrypt {file}: {source}")]
    Decrypt { file: String, source: ProcessError },

    /// The decrypted artifact could not be read or rewritten.
    #[error("failed to replace secrets in {file}: {source}")]
    Substitute { file: String, source: io::Error },

    /// The remote key-reset call failed. The old key is still active, so a
    /// later run can safely retry this project.
    #[error("failed to reset key for {project}: {source}")]
    KeyReset { project: String, source: ApiError },

    /// The old key file could not be deleted after the remote key was
    /// already reset. Manual reconciliation is required: decrypt with the
    /// old key and re-encrypt with the new one.
    #[error(
        "failed to delete old key file for {project} after key reset: {source}; \
         manual intervention required: decrypt files with the old key ({old_key}) \
         and re-encrypt with the new key ({new_key})"
    )]
    OrphanedKey { project: String, old_key: String, new_key: String, source: io::Error },

    /// The external encrypt command failed for one file.
    #[error("failed to encrypt {file}: {source}")]
    Encrypt { file: String, source: ProcessError },

    /// One or more files failed to re-encrypt and the configuration does
    /// not allow a partially re-encrypted project to count as complete.
    #[error("{failed} file(s) failed to re-encrypt for {project}; project left unrecorded for a retry")]
    PartialReencryption { project: String, failed: usize },

    /// Key material or decrypted artifacts could not be removed.
    #[error("failed to clean up key material and decrypted artifacts in {path}: {source}")]
    CleanupArtifacts { path: PathBuf, source: io::Error },

    /// A publication subcommand (branch, add, commit, push) failed.
    #[error("failed to {step} on branch {branch}: {source}; push manually")]
    Publish { step: &'static str, branch: String, source: ProcessError },

    /// The completed-projects ledger could not be appended to.
    #[error("failed to append {project} to ledger {path}: {source}")]
    LedgerAppend { project: String, path: PathBuf, source: io::Error },

    /// The workspace directory could not be deleted.
    #[error("failed to remove workspace {path}: {source}")]
    Teardown { path: PathBuf, source: io::Error },
}

impl RotationError {
    /// Classify this error for the batch driver.
    pub fn severity(&self) -> Severity {
        match self {
            // A listing failure means the workspace itself is suspect, and
            // an orphaned key file means the remote key is already gone
            // while files are still encrypted with the old one.
            Self::ListWorkspace { .. } | Self::OrphanedKey { .. } => Severity::Fatal,

            Self::UnsupportedProvider { .. }
            | Self::Clone { .. }
            | Self::Checkout { .. }
            | Self::WriteKeyFile { .. }
            | Self::Decrypt { .. }
            | Self::Substitute { .. }
            | Self::KeyReset { .. }
            | Self::PartialReencryption { .. } => Severity::SkipProject,

            Self::Encrypt { .. }
            | Self::CleanupArtifacts { .. }
            | Self::Publish { .. }
            | Self::LedgerAppend { .. }
            | Self::Teardown { .. } => Severity::Warn,
        }
    }

    /// Whether the driver should abandon the current project.
    pub fn skips_project(&self) -> bool {
        self.severity() == Severity::SkipProject
    }

    /// Whether the driver must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}
