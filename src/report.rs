//! End-of-run report.
//!
//! Accumulates per-project, per-file substitution counts and the
//! pull-request URLs generated during the batch. An explicit value threaded
//! through the pipeline, returned to `main` and printed once at the end.

use std::collections::BTreeMap;
use std::fmt;

/// Accumulated results of one batch run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// project name → file path → number of replacement keys found.
    changes: BTreeMap<String, BTreeMap<String, usize>>,

    /// Pull-request URLs, in processing order.
    pr_urls: Vec<String>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a project so it shows up in the report even with no changes.
    pub fn start_project(&mut self, project: &str) {
        self.changes.entry(project.to_string()).or_default();
    }

    /// Record how many substitution keys were found in one decrypted file.
    pub fn record_changes(&mut self, project: &str, file: &str, count: usize) {
        self.changes
            .entry(project.to_string())
            .or_default()
            .insert(file.to_string(), count);
    }

    /// Record a generated pull-request URL.
    pub fn add_pr_url(&mut self, url: impl Into<String>) {
        self.pr_urls.push(url.into());
    }

    pub fn pr_urls(&self) -> &[String] {
        &self.pr_urls
    }

    /// Substitution count recorded for one project/file pair, if any.
    pub fn changes_for(&self, project: &str, file: &str) -> Option<usize> {
        self.changes.get(project)?.get(file).copied()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.pr_urls.is_empty() {
            writeln!(f, "all projects complete, now go create some PRs:")?;
            for url in &self.pr_urls {
                writeln!(f, "{url}")?;
            }
            writeln!(f)?;
        }

        writeln!(f, "Change counts by project and file:")?;
        for (project, files) in &self.changes {
            writeln!(f, "  {project}:")?;
            for (file, count) in files {
                writeln!(f, "    {file} - {count}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_counts_per_project_and_file() {
        let mut report = RunReport::new();
        report.start_project("acme/widget");
        report.record_changes("acme/widget", "secrets.encrypted.decrypted", 2);

        assert_eq!(report.changes_for("acme/widget", "secrets.encrypted.decrypted"), Some(2));
        assert_eq!(report.changes_for("acme/widget", "other"), None);
        assert_eq!(report.changes_for("acme/gadget", "x"), None);
    }

    #[test]
    fn test_display_lists_urls_and_counts() {
        let mut report = RunReport::new();
        report.start_project("acme/widget");
        report.record_changes("acme/widget", "secrets.encrypted.decrypted", 1);
        report.add_pr_url("https://github.com/acme/widget/compare/master...develop");

        let rendered = report.to_string();
        assert!(rendered.contains("compare/master...develop"));
        assert!(rendered.contains("acme/widget:"));
        assert!(rendered.contains("secrets.encrypted.decrypted - 1"));
    }

    #[test]
    fn test_project_with_no_changes_still_listed() {
        let mut report = RunReport::new();
        report.start_project("acme/empty");
        assert!(report.to_string().contains("acme/empty:"));
    }
}
