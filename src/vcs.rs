//! Git subcommand wrappers.
//!
//! Version control is an external capability: every operation shells out to
//! the `git` binary and surfaces captured output on failure. The program
//! path is overridable so tests can substitute a stub.

use std::path::Path;

use crate::process::{self, ProcessError};

/// Wrapper around the `git` command-line tool.
#[derive(Debug, Clone)]
pub struct Git {
    program: String,
}

impl Default for Git {
    fn default() -> Self {
        Self { program: "git".to_string() }
    }
}

impl Git {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific git executable (for tests).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    /// Clone `url` into `parent`, creating a directory named after the repo.
    pub fn clone_into(&self, parent: &Path, url: &str) -> Result<(), ProcessError> {
        self.run(parent, &["clone", url])
    }

    /// Check out an existing branch.
    pub fn checkout(&self, repo: &Path, branch: &str) -> Result<(), ProcessError> {
        self.run(repo, &["checkout", branch])
    }

    /// Create and check out a new local branch.
    pub fn checkout_new_branch(&self, repo: &Path, branch: &str) -> Result<(), ProcessError> {
        self.run(repo, &["checkout", "-b", branch])
    }

    /// Stage files matching `pathspec`.
    pub fn add(&self, repo: &Path, pathspec: &str) -> Result<(), ProcessError> {
        self.run(repo, &["add", pathspec])
    }

    /// Commit staged changes.
    pub fn commit(&self, repo: &Path, message: &str) -> Result<(), ProcessError> {
        self.run(repo, &["commit", "-m", message])
    }

    /// Push the current branch to its upstream.
    pub fn push(&self, repo: &Path) -> Result<(), ProcessError> {
        self.run(repo, &["push"])
    }

    /// Push `branch` to the default remote with upstream tracking.
    pub fn push_new_branch(&self, repo: &Path, branch: &str) -> Result<(), ProcessError> {
        self.run(repo, &["push", "-u", "origin", branch])
    }

    fn run(&self, dir: &Path, args: &[&str]) -> Result<(), ProcessError> {
        process::run(&self.program, args, dir).map(|_| ())
    }
}
