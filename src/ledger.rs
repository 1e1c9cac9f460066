//! Completed-projects ledger.
//!
//! A newline-delimited, append-only record of project names whose pipeline
//! reached the terminal "fully processed" state. The selector consults it
//! so repeated runs never re-process a finished project. Entries are never
//! modified or removed.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::RotationError;

/// Fixed ledger path, relative to the working directory.
pub const LEDGER_FILE: &str = "completed-projects.txt";

/// Append-only record of completed project names.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the set of completed project names. An absent file means no
    /// projects have completed yet, not an error.
    pub fn completed(&self) -> io::Result<HashSet<String>> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => return Err(e),
        };
        Ok(data.lines().filter(|line| !line.is_empty()).map(String::from).collect())
    }

    /// Append a project name, permanently excluding it from future runs.
    pub fn record(&self, name: &str) -> Result<(), RotationError> {
        let wrap = |source: io::Error| RotationError::LedgerAppend {
            project: name.to_string(),
            path: self.path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(wrap)?;
        writeln!(file, "{name}").map_err(wrap)
    }
}
