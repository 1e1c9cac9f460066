//! # Keyroller
//!
//! Batch rotation of per-project encryption keys across CI-managed
//! repositories.
//!
//! One run selects a capped batch of eligible projects from the platform's
//! listing, then for each project: clones the repository, decrypts its
//! encrypted secret files with the current key, swaps stale credentials for
//! new ones, requests a fresh key from the platform, re-encrypts, commits,
//! and pushes. A local append-only ledger of completed projects makes
//! repeated runs idempotent, and a failure on one project never takes the
//! rest of the batch down with it.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod pipeline;
pub mod process;
pub mod publish;
pub mod report;
pub mod vcs;
pub mod workspace;

pub use config::{Config, ConfigError, Replacement};
pub use error::{RotationError, Severity};
pub use ledger::Ledger;
pub use pipeline::Pipeline;
pub use report::RunReport;
