//! Codeship API client.
//!
//! Thin blocking client for the three platform calls the pipeline needs:
//! authenticate and resolve the organization, list projects page by page,
//! and reset a project's AES key. The pipeline is fully sequential, so a
//! blocking client keeps the call sites straightforward.

use serde::Deserialize;
use thiserror::Error;

/// Default API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.codeship.com/v2";

/// Page size requested when walking the project listing.
pub const LISTING_PAGE_SIZE: u32 = 50;

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Error types for API operations.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {message} (status: {status})")]
    Api { status: u16, message: String },

    #[error("authentication rejected for user {0}")]
    Unauthorized(String),

    #[error("organization `{0}` is not visible to the authenticated user")]
    UnknownOrganization(String),
}

/// Basic credentials plus the organization to operate on, from environment.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub organization: String,
}

/// An organization the authenticated user belongs to.
#[derive(Debug, Clone, Deserialize)]
pub struct Organization {
    pub name: String,
    pub uuid: String,
}

/// Project kind as reported by the platform. Only `Pro` projects carry an
/// AES key and encrypted files, so only they are eligible for rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    Pro,
    Basic,
    #[serde(other)]
    Unknown,
}

/// A project as listed by the platform. Fetched fresh on every run and
/// never persisted locally except as a name in the ledger once complete.
#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub uuid: String,

    /// Qualified name, e.g. `org/repo`.
    pub name: String,

    pub repository_url: String,

    /// Hosting provider tag, e.g. `github` or `bitbucket`.
    #[serde(default)]
    pub repository_provider: String,

    /// Current symmetric key material.
    #[serde(default)]
    pub aes_key: String,

    #[serde(rename = "type")]
    pub kind: ProjectKind,
}

impl Project {
    /// Whether this project's kind is eligible for rotation.
    pub fn is_eligible(&self) -> bool {
        self.kind == ProjectKind::Pro
    }
}

/// One page of the project listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectPage {
    pub projects: Vec<Project>,
    pub page: u32,
    pub total_pages: u32,
}

impl ProjectPage {
    /// Whether this is the last page of the listing.
    pub fn is_last(&self) -> bool {
        self.page >= self.total_pages
    }
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    access_token: String,
    organizations: Vec<Organization>,
}

#[derive(Debug, Deserialize)]
struct ProjectEnvelope {
    project: Project,
}

/// Authenticated Codeship API client.
#[derive(Debug)]
pub struct CodeshipClient {
    http: reqwest::blocking::Client,
    base_url: String,
    access_token: String,
    organizations: Vec<Organization>,
}

impl CodeshipClient {
    /// Authenticate with basic credentials against the default endpoint.
    pub fn authenticate(credentials: &Credentials) -> ApiResult<Self> {
        Self::authenticate_at(DEFAULT_BASE_URL, credentials)
    }

    /// Authenticate with basic credentials against a specific endpoint.
    pub fn authenticate_at(base_url: &str, credentials: &Credentials) -> ApiResult<Self> {
        let http = reqwest::blocking::Client::new();
        let response = http
            .post(format!("{base_url}/auth"))
            .basic_auth(&credentials.username, Some(&credentials.password))
            .send()?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized(credentials.username.clone()));
        }
        let auth: AuthResponse = check(response)?.json()?;

        Ok(Self {
            http,
            base_url: base_url.to_string(),
            access_token: auth.access_token,
            organizations: auth.organizations,
        })
    }

    /// Resolve an organization by name from the authentication scope.
    pub fn organization(&self, name: &str) -> ApiResult<Organization> {
        self.organizations
            .iter()
            .find(|org| org.name.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| ApiError::UnknownOrganization(name.to_string()))
    }

    /// Fetch one page of the organization's project listing.
    pub fn list_projects(
        &self,
        org: &Organization,
        page: u32,
        per_page: u32,
    ) -> ApiResult<ProjectPage> {
        let url = format!("{}/organizations/{}/projects", self.base_url, org.uuid);
        let response = self
            .request(self.http.get(url))
            .query(&[("page", page), ("per_page", per_page)])
            .send()?;
        Ok(check(response)?.json()?)
    }

    /// Reset a project's AES key, returning the project with its new key
    /// material. The old key stops working as soon as this call succeeds.
    pub fn reset_project_key(&self, org: &Organization, project_uuid: &str) -> ApiResult<Project> {
        let url = format!(
            "{}/organizations/{}/projects/{}/reset_aes_key",
            self.base_url, org.uuid, project_uuid
        );
        let response = self.request(self.http.post(url)).send()?;
        let envelope: ProjectEnvelope = check(response)?.json()?;
        Ok(envelope.project)
    }

    fn request(&self, builder: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("Accept", "application/json")
            .header("User-Agent", concat!("keyroller/", env!("CARGO_PKG_VERSION")))
    }
}

fn check(response: reqwest::blocking::Response) -> ApiResult<reqwest::blocking::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().unwrap_or_else(|_| "<no body>".to_string());
    Err(ApiError::Api { status: status.as_u16(), message })
}
