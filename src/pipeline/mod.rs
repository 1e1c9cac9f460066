//! The batch pipeline.
//!
//! Selection, per-project rotation, ledger bookkeeping, and workspace
//! teardown, run strictly one project at a time. A failure on one project
//! never aborts the batch unless its severity says continuing is unsafe.

mod rotation;
mod selector;

pub use rotation::{
    find_encrypted_files, replace_secrets_in_file, KeyResetter, ProjectOutcome,
    RemoteKeyResetter, RotationEngine,
};
pub use selector::{select_batch, ProjectFilter, ProjectSource, RemoteProjects};

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use crate::config::Config;
use crate::crypto::Jet;
use crate::error::Severity;
use crate::ledger::Ledger;
use crate::publish::Publisher;
use crate::report::RunReport;
use crate::vcs::Git;
use crate::workspace::WorkspaceManager;

/// Operator bail-out window between batch selection and the first
/// mutating action.
pub const BATCH_PAUSE: Duration = Duration::from_secs(20);

/// One full batch run.
pub struct Pipeline<'a> {
    config: &'a Config,
    source: &'a dyn ProjectSource,
    resetter: &'a dyn KeyResetter,
    ledger: Ledger,
    base_dir: PathBuf,
    git: Git,
    jet: Jet,
    pause: Option<Duration>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a Config,
        source: &'a dyn ProjectSource,
        resetter: &'a dyn KeyResetter,
        ledger: Ledger,
        base_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            source,
            resetter,
            ledger,
            base_dir: base_dir.into(),
            git: Git::new(),
            jet: Jet::new(),
            pause: Some(BATCH_PAUSE),
        }
    }

    /// Substitute the external tools (for tests).
    #[must_use]
    pub fn with_tools(mut self, git: Git, jet: Jet) -> Self {
        self.git = git;
        self.jet = jet;
        self
    }

    /// Skip or shorten the operator bail-out pause.
    #[must_use]
    pub fn with_pause(mut self, pause: Option<Duration>) -> Self {
        self.pause = pause;
        self
    }

    /// Select a batch and rotate every project in it.
    ///
    /// Returns the run report for end-of-run display. Errors out only for
    /// run-aborting failures; per-project failures are isolated.
    pub fn run(&self) -> anyhow::Result<RunReport> {
        let completed = self
            .ledger
            .completed()
            .with_context(|| format!("failed to read ledger {}", self.ledger.path().display()))?;
        let filter = ProjectFilter::new(self.config.repo_filter_regexes()?, completed);

        let batch = select_batch(self.source, &filter, self.config.max_projects_per_run)
            .context("failed to fetch the remote project listing")?;

        let mut report = RunReport::new();
        if batch.is_empty() {
            println!("no projects to be rotated");
            return Ok(report);
        }

        println!("Found {} projects:", batch.len());
        for (i, project) in batch.iter().enumerate() {
            println!("  {} - {}", i + 1, project.name);
        }

        if let Some(pause) = self.pause {
            println!(
                "Will sleep for {} seconds, so bail now or forever hold your peace...",
                pause.as_secs()
            );
            std::thread::sleep(pause);
        }

        let manager = WorkspaceManager::new(
            &self.base_dir,
            self.git.clone(),
            self.config.checkout_branch.clone(),
        );
        let publisher = Publisher::new(
            self.git.clone(),
            self.config.push_branch.clone(),
            self.config.checkout_branch.clone(),
        );
        let engine = RotationEngine::new(
            self.config,
            self.config.encrypted_patterns()?,
            self.jet.clone(),
            self.resetter,
            &publisher,
        );

        for (i, project) in batch.iter().enumerate() {
            println!("\n--------------------------------------------------------");
            println!("Starting project #{} - {}", i + 1, project.name);
            report.start_project(&project.name);

            let workspace = match manager.materialize(project) {
                Ok(path) => path,
                Err(err) => {
                    // A failed checkout can still leave a clone behind.
                    manager.teardown(&manager.workspace_path(project));
                    tracing::error!(
                        project = %project.name,
                        error = %err,
                        "project was not processed, fix it manually"
                    );
                    continue;
                }
            };

            let outcome = engine.rotate(project, &workspace, &mut report);
            // The workspace never outlives its project, success or not.
            manager.teardown(&workspace);

            match outcome {
                outcome @ (ProjectOutcome::Completed | ProjectOutcome::NoRotationNeeded) => {
                    if matches!(outcome, ProjectOutcome::NoRotationNeeded) {
                        println!("no encrypted files found, key not rotated, proceeding to next project...");
                    }
                    if let Err(err) = self.ledger.record(&project.name) {
                        tracing::warn!(error = %err, "completed project not ledgered; it may be re-selected");
                    }
                    println!("Finished process for {} project!", project.name);
                }
                ProjectOutcome::Abandoned(err) => match err.severity() {
                    Severity::Fatal => {
                        tracing::error!(
                            project = %project.name,
                            error = %err,
                            "unsafe to continue; aborting the run"
                        );
                        return Err(err.into());
                    }
                    _ => {
                        tracing::error!(
                            project = %project.name,
                            error = %err,
                            "rotation abandoned; a later run will retry this project"
                        );
                    }
                },
            }
        }

        Ok(report)
    }
}
