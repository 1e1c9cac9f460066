//! Encrypt/decrypt command wrappers and key-file handling.
//!
//! Encryption itself lives in the external `jet` tool; this module only
//! drives it and materializes key files. Decrypted artifacts sit next to
//! their encrypted source with a `.decrypted` suffix until cleanup.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::process::{self, ProcessError};

/// Fixed key-material filename inside a workspace.
pub const KEY_FILE_NAME: &str = "codeship.aes";

/// Suffix appended to a decrypted artifact's filename.
pub const DECRYPTED_SUFFIX: &str = ".decrypted";

/// Wrapper around the `jet` encrypt/decrypt command-line tool.
#[derive(Debug, Clone)]
pub struct Jet {
    program: String,
}

impl Default for Jet {
    fn default() -> Self {
        Self { program: "jet".to_string() }
    }
}

impl Jet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific jet executable (for tests).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    /// Decrypt `file` (a path relative to `workspace`) into a sibling
    /// `.decrypted` artifact, returning the artifact's filename.
    pub fn decrypt(&self, workspace: &Path, file: &str) -> Result<String, ProcessError> {
        let artifact = format!("{file}{DECRYPTED_SUFFIX}");
        process::run(
            &self.program,
            &["decrypt", "--key-path", KEY_FILE_NAME, file, artifact.as_str()],
            workspace,
        )?;
        Ok(artifact)
    }

    /// Re-encrypt the `.decrypted` artifact of `file` back over the
    /// original encrypted file, in place.
    pub fn encrypt(&self, workspace: &Path, file: &str) -> Result<(), ProcessError> {
        let artifact = format!("{file}{DECRYPTED_SUFFIX}");
        process::run(
            &self.program,
            &["encrypt", "--key-path", KEY_FILE_NAME, artifact.as_str(), file],
            workspace,
        )
        .map(|_| ())
    }
}

/// Write key material to the fixed key filename inside `workspace`.
pub fn write_key_file(workspace: &Path, key: &str) -> io::Result<PathBuf> {
    let path = workspace.join(KEY_FILE_NAME);
    tracing::debug!(path = %path.display(), "writing key file");
    fs::write(&path, key)?;
    Ok(path)
}

/// Delete the key file inside `workspace`, if present.
pub fn remove_key_file(workspace: &Path) -> io::Result<()> {
    let path = workspace.join(KEY_FILE_NAME);
    match fs::remove_file(&path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
