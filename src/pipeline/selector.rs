//! Batch selection.
//!
//! Walks the remote project listing page by page, applies the eligibility
//! filters, and stops as soon as the batch cap is reached, even mid-page.
//! Given a stable remote ordering and ledger, repeated runs select the
//! same batch.

use std::collections::HashSet;

use regex::Regex;

use crate::api::{
    ApiResult, CodeshipClient, Organization, Project, ProjectPage, LISTING_PAGE_SIZE,
};

/// A paginated source of projects. The pipeline uses the remote listing;
/// tests substitute an in-memory one.
pub trait ProjectSource {
    fn fetch_page(&self, page: u32, per_page: u32) -> ApiResult<ProjectPage>;
}

/// The live organization listing.
#[derive(Debug)]
pub struct RemoteProjects<'a> {
    client: &'a CodeshipClient,
    org: &'a Organization,
}

impl<'a> RemoteProjects<'a> {
    pub fn new(client: &'a CodeshipClient, org: &'a Organization) -> Self {
        Self { client, org }
    }
}

impl ProjectSource for RemoteProjects<'_> {
    fn fetch_page(&self, page: u32, per_page: u32) -> ApiResult<ProjectPage> {
        self.client.list_projects(self.org, page, per_page)
    }
}

/// Inclusion filter applied to every listed project.
#[derive(Debug)]
pub struct ProjectFilter {
    url_patterns: Vec<Regex>,
    completed: HashSet<String>,
}

impl ProjectFilter {
    pub fn new(url_patterns: Vec<Regex>, completed: HashSet<String>) -> Self {
        Self { url_patterns, completed }
    }

    /// Whether a project belongs in the work batch: eligible kind, not yet
    /// ledgered, and (when URL patterns are configured) a repository URL
    /// matching at least one pattern, evaluated in configuration order.
    pub fn accepts(&self, project: &Project) -> bool {
        if !project.is_eligible() || self.completed.contains(&project.name) {
            return false;
        }
        if self.url_patterns.is_empty() {
            return true;
        }
        self.url_patterns.iter().any(|re| re.is_match(&project.repository_url))
    }
}

/// Select at most `max` projects from `source`, in listing order.
///
/// Any page fetch failure aborts selection: a partial batch built from an
/// unreliable directory source is never acted upon.
pub fn select_batch(
    source: &dyn ProjectSource,
    filter: &ProjectFilter,
    max: usize,
) -> ApiResult<Vec<Project>> {
    let mut batch = Vec::new();
    let mut page = 1;

    loop {
        let listing = source.fetch_page(page, LISTING_PAGE_SIZE)?;
        let last = listing.is_last();

        for project in listing.projects {
            if filter.accepts(&project) {
                batch.push(project);
                if batch.len() >= max {
                    return Ok(batch);
                }
            }
        }

        if last {
            return Ok(batch);
        }
        page += 1;
    }
}
