// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Hosting provider access.
//!
//! The gatekeeper needs four things from whatever hosts the remotes: whether
//! a repository exists, a way to create one, and read/write access to its
//! description. The description is where the ownership marker lives.

use crate::{
    auth::Credential,
    config::{RepoSlug, Visibility},
};

use reqwest::{
    blocking::{Client, RequestBuilder, Response},
    header::ACCEPT,
    StatusCode,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

/// Default GitHub REST API endpoint.
pub const GITHUB_API: &str = "https://api.github.com";

/// Default GitHub git endpoint.
pub const GITHUB_GIT: &str = "https://github.com";

/// Opaque hosting provider operations.
pub trait HostingProvider {
    /// Check if remote repository exists.
    fn exists(&self, repo: &RepoSlug) -> Result<bool>;

    /// Create remote repository with target visibility.
    fn create(&self, repo: &RepoSlug, visibility: Visibility) -> Result<()>;

    /// Read description of remote repository.
    ///
    /// A repository without description yields an empty string.
    fn get_description(&self, repo: &RepoSlug) -> Result<String>;

    /// Overwrite description of remote repository.
    fn set_description(&self, repo: &RepoSlug, description: &str) -> Result<()>;

    /// URL that git should push to for remote repository.
    ///
    /// Never contains credentials.
    fn push_url(&self, repo: &RepoSlug) -> String;
}

/// GitHub over its REST API.
#[derive(Debug, Clone)]
pub struct GitHub {
    client: Client,
    credential: Credential,
    api: String,
    git: String,
}

#[derive(Debug, Deserialize)]
struct RepoView {
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserView {
    login: String,
}

impl GitHub {
    /// Construct new GitHub client authenticating with target credential.
    ///
    /// # Errors
    ///
    /// - Return [`HostingError::Http`] if HTTP client cannot be built.
    pub fn new(credential: Credential) -> Result<Self> {
        Self::with_endpoints(credential, GITHUB_API, GITHUB_GIT)
    }

    /// Construct new client against custom endpoints, e.g., GitHub Enterprise.
    ///
    /// # Errors
    ///
    /// - Return [`HostingError::Http`] if HTTP client cannot be built.
    pub fn with_endpoints(
        credential: Credential,
        api: impl Into<String>,
        git: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tagroute/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            credential,
            api: api.into().trim_end_matches('/').to_string(),
            git: git.into().trim_end_matches('/').to_string(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(self.credential.expose())
            .header(ACCEPT, "application/vnd.github+json")
    }

    fn repo_url(&self, repo: &RepoSlug) -> String {
        format!("{}/repos/{}/{}", self.api, repo.owner(), repo.name())
    }

    fn authenticated_login(&self) -> Result<String> {
        let response = self
            .authorized(self.client.get(format!("{}/user", self.api)))
            .send()?;
        let user: UserView = expect_success(response, "read authenticated user")?.json()?;

        Ok(user.login)
    }
}

impl HostingProvider for GitHub {
    #[instrument(skip(self), level = "debug")]
    fn exists(&self, repo: &RepoSlug) -> Result<bool> {
        let response = self.authorized(self.client.get(self.repo_url(repo))).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }

        expect_success(response, format!("check {repo}"))?;
        Ok(true)
    }

    #[instrument(skip(self), level = "debug")]
    fn create(&self, repo: &RepoSlug, visibility: Visibility) -> Result<()> {
        let login = self.authenticated_login()?;
        let url = if login.eq_ignore_ascii_case(repo.owner()) {
            format!("{}/user/repos", self.api)
        } else {
            format!("{}/orgs/{}/repos", self.api, repo.owner())
        };

        debug!("create {repo} through {url}");
        let body = json!({ "name": repo.name(), "private": visibility.is_private() });
        let response = self.authorized(self.client.post(url)).json(&body).send()?;
        expect_success(response, format!("create {repo}"))?;

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn get_description(&self, repo: &RepoSlug) -> Result<String> {
        let response = self.authorized(self.client.get(self.repo_url(repo))).send()?;
        let view: RepoView = expect_success(response, format!("read {repo}"))?.json()?;

        Ok(view.description.unwrap_or_default())
    }

    #[instrument(skip(self), level = "debug")]
    fn set_description(&self, repo: &RepoSlug, description: &str) -> Result<()> {
        let body = json!({ "description": description });
        let response = self
            .authorized(self.client.patch(self.repo_url(repo)))
            .json(&body)
            .send()?;
        expect_success(response, format!("edit {repo}"))?;

        Ok(())
    }

    fn push_url(&self, repo: &RepoSlug) -> String {
        format!("{}/{}/{}.git", self.git, repo.owner(), repo.name())
    }
}

fn expect_success(response: Response, operation: impl Into<String>) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .json::<serde_json::Value>()
        .ok()
        .and_then(|body| body.get("message").and_then(|m| m.as_str()).map(str::to_owned))
        .unwrap_or_default();

    Err(HostingError::Status {
        operation: operation.into(),
        status: status.as_u16(),
        message,
    })
}

/// Hosting provider error types.
#[derive(Debug, thiserror::Error)]
pub enum HostingError {
    /// Transport level failure or undecodable response.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Provider answered with a failure status.
    #[error("failed to {operation}: status {status} {message}")]
    Status {
        operation: String,
        status: u16,
        message: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = HostingError> = std::result::Result<T, E>;
