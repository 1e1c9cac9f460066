//! Workspace management.
//!
//! Materializes a project's repository into a local working directory under
//! a single base directory, and guarantees that key material, decrypted
//! artifacts, and the directory itself are removed no matter where in the
//! pipeline processing stopped.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::api::Project;
use crate::crypto::{self, DECRYPTED_SUFFIX};
use crate::error::RotationError;
use crate::vcs::Git;

/// Build the SSH clone URL for a project from its hosting-provider tag.
///
/// Returns `None` for providers without a known host.
pub fn clone_url(project: &Project) -> Option<String> {
    let host = match project.repository_provider.to_lowercase().as_str() {
        "github" => "github.com",
        "bitbucket" => "bitbucket.org",
        _ => return None,
    };
    Some(format!("git@{host}:{}.git", project.name))
}

/// Directory name a clone lands in: the last segment of the qualified name.
pub fn folder_name(project: &Project) -> &str {
    project.name.rsplit('/').next().unwrap_or(&project.name)
}

/// List top-level regular files in `dir` (non-recursive, directories
/// skipped), sorted by name so processing order is stable across platforms.
pub fn list_files(dir: &Path) -> io::Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        files.push(entry.file_name().to_string_lossy().into_owned());
    }
    files.sort();
    Ok(files)
}

/// Clones project repositories under a base directory and tears them down.
#[derive(Debug)]
pub struct WorkspaceManager {
    base_dir: PathBuf,
    git: Git,
    checkout_branch: Option<String>,
}

impl WorkspaceManager {
    pub fn new(base_dir: impl Into<PathBuf>, git: Git, checkout_branch: Option<String>) -> Self {
        Self { base_dir: base_dir.into(), git, checkout_branch }
    }

    /// Where a project's workspace lands, whether or not it exists yet.
    pub fn workspace_path(&self, project: &Project) -> PathBuf {
        self.base_dir.join(folder_name(project))
    }

    /// Clone the project's repository and check out the configured base
    /// branch, returning the workspace path.
    pub fn materialize(&self, project: &Project) -> Result<PathBuf, RotationError> {
        let url = clone_url(project).ok_or_else(|| RotationError::UnsupportedProvider {
            provider: project.repository_provider.clone(),
            project: project.name.clone(),
        })?;
        let path = self.workspace_path(project);

        tracing::info!(url = %url, path = %path.display(), "cloning project repository");
        self.git
            .clone_into(&self.base_dir, &url)
            .map_err(|source| RotationError::Clone { url, source })?;

        if let Some(branch) = &self.checkout_branch {
            self.git.checkout(&path, branch).map_err(|source| RotationError::Checkout {
                branch: branch.clone(),
                source,
            })?;
        }

        Ok(path)
    }

    /// Best-effort recursive delete of a workspace. Deletion failures are
    /// logged, never escalated: a failed teardown must not abort the batch.
    pub fn teardown(&self, path: &Path) {
        if let Err(source) = fs::remove_dir_all(path) {
            if source.kind() == io::ErrorKind::NotFound {
                return;
            }
            let err = RotationError::Teardown { path: path.to_path_buf(), source };
            tracing::warn!(error = %err, "workspace left behind");
        }
    }
}

/// Delete the key file and every `.decrypted` artifact in `workspace`.
///
/// Used on the success path and after a detected mid-rotation failure, so a
/// later `git add` can never pick up plaintext secrets.
pub fn cleanup_artifacts(workspace: &Path) -> Result<(), RotationError> {
    let wrap = |source: io::Error| RotationError::CleanupArtifacts {
        path: workspace.to_path_buf(),
        source,
    };

    crypto::remove_key_file(workspace).map_err(wrap)?;

    let files = list_files(workspace).map_err(wrap)?;
    for name in files {
        if name.ends_with(DECRYPTED_SUFFIX) {
            fs::remove_file(workspace.join(&name)).map_err(wrap)?;
            tracing::debug!(file = %name, "removed decrypted artifact");
        }
    }
    Ok(())
}
