//! Publication of rotated artifacts.
//!
//! Commits the re-encrypted files and pushes them, either to a newly
//! created branch or to the current branch when no push branch is
//! configured. On success the operator gets a provider-specific URL to
//! open a pull request manually; there is no programmatic PR creation.

use std::path::Path;

use crate::error::RotationError;
use crate::vcs::Git;

/// Commit message used for every rotation commit.
pub const COMMIT_MESSAGE: &str = "updated encrypted files with rotated credentials";

/// Pathspec staged before committing.
pub const ENCRYPTED_PATHSPEC: &str = "*.encrypted";

/// Build the manual pull-request URL for a repository, detected via
/// substring match on the repository URL. Unknown hosts get no URL.
pub fn pull_request_url(repo_url: &str, project_name: &str) -> Option<String> {
    if repo_url.contains("bitbucket") {
        return Some(format!(
            "https://bitbucket.org/{project_name}/pull-requests/new?source=develop&t=1"
        ));
    }
    if repo_url.contains("github") {
        return Some(format!("https://github.com/{project_name}/compare/master...develop"));
    }
    None
}

/// Commits and pushes rotated files.
#[derive(Debug)]
pub struct Publisher {
    git: Git,
    push_branch: Option<String>,
    checkout_branch: Option<String>,
}

impl Publisher {
    pub fn new(git: Git, push_branch: Option<String>, checkout_branch: Option<String>) -> Self {
        Self { git, push_branch, checkout_branch }
    }

    /// Stage, commit, and push the rotated files in `repo`.
    ///
    /// With a configured push branch: create and check out that branch,
    /// then push it with upstream tracking. Without one: push the branch
    /// that is currently checked out. The first failing subcommand stops
    /// the step; nothing is retried.
    pub fn publish(&self, repo: &Path) -> Result<(), RotationError> {
        let branch = self
            .push_branch
            .as_deref()
            .or(self.checkout_branch.as_deref())
            .unwrap_or("HEAD")
            .to_string();
        let step = |step: &'static str| {
            let branch = branch.clone();
            move |source| RotationError::Publish { step, branch, source }
        };

        if let Some(push_branch) = &self.push_branch {
            self.git
                .checkout_new_branch(repo, push_branch)
                .map_err(step("checkout new branch"))?;
        }

        self.git.add(repo, ENCRYPTED_PATHSPEC).map_err(step("add encrypted files"))?;
        self.git.commit(repo, COMMIT_MESSAGE).map_err(step("commit changes"))?;

        match &self.push_branch {
            Some(push_branch) => self
                .git
                .push_new_branch(repo, push_branch)
                .map_err(step("push new branch"))?,
            None => self.git.push(repo).map_err(step("push changes"))?,
        }

        tracing::info!(branch = %branch, "rotated files pushed");
        Ok(())
    }
}
