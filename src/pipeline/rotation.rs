//! Per-project rotation engine.
//!
//! Drives one project through the ordered rotation states: scan the
//! workspace for encrypted files, materialize the old key, decrypt and
//! substitute, reset the remote key, materialize the new key, re-encrypt,
//! clean up, publish. Linear, no branching back; any failure abandons the
//! project, and the carried error's severity tells the driver whether the
//! rest of the batch is still safe to run.

use std::fs;
use std::io;
use std::path::Path;

use regex::Regex;

use crate::api::{ApiResult, CodeshipClient, Organization, Project};
use crate::config::{Config, Replacement};
use crate::crypto::{self, Jet};
use crate::error::RotationError;
use crate::publish::{self, Publisher};
use crate::report::RunReport;
use crate::workspace;

/// Issues new key material for a project. The pipeline talks to the
/// platform API; tests substitute a stub.
pub trait KeyResetter {
    /// Reset the project's key remotely, returning the new key material.
    /// The old key stops working once this succeeds.
    fn reset_key(&self, project: &Project) -> ApiResult<String>;
}

/// Key resets via the platform API.
#[derive(Debug)]
pub struct RemoteKeyResetter<'a> {
    client: &'a CodeshipClient,
    org: &'a Organization,
}

impl<'a> RemoteKeyResetter<'a> {
    pub fn new(client: &'a CodeshipClient, org: &'a Organization) -> Self {
        Self { client, org }
    }
}

impl KeyResetter for RemoteKeyResetter<'_> {
    fn reset_key(&self, project: &Project) -> ApiResult<String> {
        self.client.reset_project_key(self.org, &project.uuid).map(|updated| updated.aes_key)
    }
}

/// How one project's pipeline ended.
#[derive(Debug)]
pub enum ProjectOutcome {
    /// Key rotated (and, where applicable, publication attempted). The
    /// project belongs in the ledger.
    Completed,

    /// No encrypted files and the configuration says not to rotate keys in
    /// that case. Trivially complete; the project belongs in the ledger.
    NoRotationNeeded,

    /// Rotation abandoned partway. The project is not ledgered, so a later
    /// run retries it.
    Abandoned(RotationError),
}

impl ProjectOutcome {
    /// Whether the project should be recorded in the ledger.
    pub fn is_complete(&self) -> bool {
        !matches!(self, Self::Abandoned(_))
    }
}

/// Select the filenames matching an encrypted-file pattern, preserving
/// listing order.
///
/// Matches are not deduplicated: a file matching several patterns appears
/// once per matching pattern and is decrypted, substituted, and
/// re-encrypted again each time. The repeat passes find nothing left to
/// substitute.
pub fn find_encrypted_files(files: &[String], patterns: &[Regex]) -> Vec<String> {
    let mut matched = Vec::new();
    for file in files {
        for re in patterns {
            if re.is_match(file) {
                matched.push(file.clone());
            }
        }
    }
    matched
}

/// Apply every substitution rule, in declaration order, to the file's
/// contents, writing the result back in place.
///
/// Returns how many rules' find-strings occurred at least once at the time
/// that rule was applied (occurrence counts within a file are not tracked).
pub fn replace_secrets_in_file(path: &Path, rules: &[Replacement]) -> io::Result<usize> {
    let mut contents = fs::read_to_string(path)?;
    let mut found = 0;

    for rule in rules {
        if contents.contains(&rule.find) {
            found += 1;
            contents = contents.replace(&rule.find, &rule.replace);
        }
    }

    fs::write(path, contents)?;
    Ok(found)
}

/// The per-project state machine.
pub struct RotationEngine<'a> {
    config: &'a Config,
    patterns: Vec<Regex>,
    jet: Jet,
    resetter: &'a dyn KeyResetter,
    publisher: &'a Publisher,
}

impl<'a> RotationEngine<'a> {
    pub fn new(
        config: &'a Config,
        patterns: Vec<Regex>,
        jet: Jet,
        resetter: &'a dyn KeyResetter,
        publisher: &'a Publisher,
    ) -> Self {
        Self { config, patterns, jet, resetter, publisher }
    }

    /// Run the rotation states against one materialized workspace.
    ///
    /// Every failure ends in [`ProjectOutcome::Abandoned`]; the carried
    /// error's severity tells the driver whether continuing the batch is
    /// safe.
    pub fn rotate(
        &self,
        project: &Project,
        workspace: &Path,
        report: &mut RunReport,
    ) -> ProjectOutcome {
        // Scan
        let files = match workspace::list_files(workspace) {
            Ok(files) => files,
            Err(source) => {
                return ProjectOutcome::Abandoned(RotationError::ListWorkspace {
                    path: workspace.to_path_buf(),
                    source,
                });
            }
        };
        let encrypted = find_encrypted_files(&files, &self.patterns);

        // Decide
        if encrypted.is_empty() {
            tracing::info!(project = %project.name, "no encrypted files found");
            if !self.config.reset_keys_in_projects_without_encrypted_files {
                return ProjectOutcome::NoRotationNeeded;
            }
        } else {
            tracing::info!(
                project = %project.name,
                files = ?encrypted,
                "found encrypted files"
            );
        }

        if !encrypted.is_empty() {
            // Materialize-Old-Key
            if let Err(source) = crypto::write_key_file(workspace, &project.aes_key) {
                let err = RotationError::WriteKeyFile {
                    path: workspace.join(crypto::KEY_FILE_NAME),
                    source,
                };
                return self.abandon(workspace, err);
            }

            // Decrypt-And-Substitute
            for file in &encrypted {
                let artifact = match self.jet.decrypt(workspace, file) {
                    Ok(artifact) => artifact,
                    Err(source) => {
                        let err = RotationError::Decrypt { file: file.clone(), source };
                        return self.abandon(workspace, err);
                    }
                };

                match replace_secrets_in_file(&workspace.join(&artifact), &self.config.replacements)
                {
                    Ok(count) => {
                        tracing::info!(file = %artifact, count, "replaced secrets");
                        report.record_changes(&project.name, &artifact, count);
                    }
                    Err(source) => {
                        let err = RotationError::Substitute { file: artifact, source };
                        return self.abandon(workspace, err);
                    }
                }
            }
        }

        // Reset-Key
        let new_key = match self.resetter.reset_key(project) {
            Ok(key) => key,
            Err(source) => {
                let err = RotationError::KeyReset { project: project.name.clone(), source };
                return self.abandon(workspace, err);
            }
        };
        tracing::info!(project = %project.name, "remote key reset");

        if !encrypted.is_empty() {
            // Materialize-New-Key. A failed delete here is the one state
            // that leaves the remote and local sides irreconcilable
            // without an operator.
            if let Err(source) = crypto::remove_key_file(workspace) {
                return ProjectOutcome::Abandoned(RotationError::OrphanedKey {
                    project: project.name.clone(),
                    old_key: project.aes_key.clone(),
                    new_key,
                    source,
                });
            }

            // Re-encrypt
            let mut failed = 0;
            match crypto::write_key_file(workspace, &new_key) {
                Ok(_) => {
                    for file in &encrypted {
                        if let Err(source) = self.jet.encrypt(workspace, file) {
                            let err = RotationError::Encrypt { file: file.clone(), source };
                            tracing::error!(error = %err, "file still carries old-key ciphertext");
                            failed += 1;
                        }
                    }
                }
                Err(source) => {
                    let err = RotationError::WriteKeyFile {
                        path: workspace.join(crypto::KEY_FILE_NAME),
                        source,
                    };
                    tracing::error!(
                        error = %err,
                        old_key = %project.aes_key,
                        new_key = %new_key,
                        "cannot re-encrypt without the new key file; re-encrypt manually"
                    );
                    failed = encrypted.len();
                }
            }

            if failed > 0 && !self.config.record_partial_reencryption {
                let err = RotationError::PartialReencryption {
                    project: project.name.clone(),
                    failed,
                };
                return self.abandon(workspace, err);
            }

            // Cleanup, then publication. Publication is skipped when
            // cleanup failed: a stray decrypted artifact must never reach
            // `git add`.
            match workspace::cleanup_artifacts(workspace) {
                Ok(()) => {
                    if let Err(err) = self.publisher.publish(workspace) {
                        tracing::error!(error = %err, "publication failed; push manually");
                    }
                    if let Some(url) =
                        publish::pull_request_url(&project.repository_url, &project.name)
                    {
                        report.add_pr_url(url);
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "cleanup failed; publication skipped, push manually");
                }
            }
        }

        ProjectOutcome::Completed
    }

    /// Abandon the project: scrub key material and decrypted artifacts so
    /// nothing sensitive outlives the workspace, then hand the failure to
    /// the driver.
    fn abandon(&self, workspace: &Path, err: RotationError) -> ProjectOutcome {
        if let Err(cleanup_err) = workspace::cleanup_artifacts(workspace) {
            tracing::warn!(error = %cleanup_err, "artifact cleanup failed while abandoning project");
        }
        ProjectOutcome::Abandoned(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regexes(patterns: &[&str]) -> Vec<Regex> {
        patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_find_encrypted_files_uses_search_semantics() {
        let files = names(&["secrets.encrypted", "notes.txt", "env.encrypted.bak"]);
        let found = find_encrypted_files(&files, &regexes(&["\\.encrypted"]));
        assert_eq!(found, names(&["secrets.encrypted", "env.encrypted.bak"]));
    }

    #[test]
    fn test_find_encrypted_files_repeats_files_matching_several_patterns() {
        // Matches are not deduplicated: a file satisfying two patterns is
        // listed once per pattern, in listing order.
        let files = names(&["b.encrypted", "a.encrypted"]);
        let found = find_encrypted_files(&files, &regexes(&["\\.encrypted$", "^a"]));
        assert_eq!(found, names(&["b.encrypted", "a.encrypted", "a.encrypted"]));
    }

    #[test]
    fn test_replace_secrets_counts_keys_found_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.encrypted.decrypted");
        fs::write(&path, "token=OLD_KEY\nbackup=OLD_KEY\nuser=alice\n").unwrap();

        let rules = vec![
            Replacement { find: "OLD_KEY".to_string(), replace: "NEW_KEY".to_string() },
            Replacement { find: "absent".to_string(), replace: "x".to_string() },
        ];
        let count = replace_secrets_in_file(&path, &rules).unwrap();

        // Two occurrences of one key count once; the absent key not at all.
        assert_eq!(count, 1);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "token=NEW_KEY\nbackup=NEW_KEY\nuser=alice\n"
        );
    }

    #[test]
    fn test_replace_secrets_applies_rules_in_declared_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.decrypted");
        fs::write(&path, "alpha").unwrap();

        // The first rule's replacement is the second rule's find string.
        let rules = vec![
            Replacement { find: "alpha".to_string(), replace: "beta".to_string() },
            Replacement { find: "beta".to_string(), replace: "gamma".to_string() },
        ];
        let count = replace_secrets_in_file(&path, &rules).unwrap();
        assert_eq!(count, 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), "gamma");
    }

    #[test]
    fn test_replace_secrets_is_idempotent_when_finds_do_not_reappear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.decrypted");
        fs::write(&path, "token=OLD_KEY").unwrap();

        let rules =
            vec![Replacement { find: "OLD_KEY".to_string(), replace: "NEW_KEY".to_string() }];
        assert_eq!(replace_secrets_in_file(&path, &rules).unwrap(), 1);
        let first = fs::read_to_string(&path).unwrap();

        assert_eq!(replace_secrets_in_file(&path, &rules).unwrap(), 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn test_outcome_completion_classes() {
        assert!(ProjectOutcome::Completed.is_complete());
        assert!(ProjectOutcome::NoRotationNeeded.is_complete());
        let abandoned = ProjectOutcome::Abandoned(RotationError::PartialReencryption {
            project: "acme/widget".to_string(),
            failed: 1,
        });
        assert!(!abandoned.is_complete());
    }
}
