use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, ACCEPT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::FetchError;
use crate::repo::TrackedRepo;
use crate::stats::MetricSnapshot;

pub const DEFAULT_GITHUB_API: &str = "https://api.github.com/";

/// Anything able to report the current counters of a repository.
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn fetch(&self, repo: &TrackedRepo) -> Result<MetricSnapshot, FetchError>;
}

#[derive(Debug, Deserialize)]
struct RepoPayload {
    stargazers_count: u64,
    forks_count: u64,
    #[serde(default)]
    subscribers_count: u64,
}

impl From<RepoPayload> for MetricSnapshot {
    fn from(payload: RepoPayload) -> Self {
        Self {
            stars: payload.stargazers_count,
            forks: payload.forks_count,
            watchers: payload.subscribers_count,
        }
    }
}

/// Reads repository counters from the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GithubClient {
    client: Client,
    api_base: Url,
    token: Option<String>,
    request_timeout: Duration,
}

impl GithubClient {
    pub fn new(client: Client, api_base: Url) -> Self {
        Self {
            client,
            api_base,
            token: None,
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn repo_url(&self, repo: &TrackedRepo) -> Result<Url, FetchError> {
        Ok(self.api_base.join(&format!("repos/{}", repo))?)
    }
}

#[async_trait]
impl MetricSource for GithubClient {
    async fn fetch(&self, repo: &TrackedRepo) -> Result<MetricSnapshot, FetchError> {
        let url = self.repo_url(repo)?;
        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, "application/vnd.github+json")
            .timeout(self.request_timeout);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(repo = %repo, %status, "github responded");

        if status == StatusCode::OK {
            let bytes = response.bytes().await?;
            let payload: RepoPayload = serde_json::from_slice(&bytes)?;
            return Ok(payload.into());
        }

        Err(classify_failure(status, response.headers()))
    }
}

fn classify_failure(status: StatusCode, headers: &HeaderMap) -> FetchError {
    let exhausted = header_u64(headers, "x-ratelimit-remaining") == Some(0);
    match status {
        StatusCode::NOT_FOUND => FetchError::NotFound,
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited {
            retry_after: retry_after(headers),
        },
        StatusCode::FORBIDDEN if exhausted => FetchError::RateLimited {
            retry_after: retry_after(headers),
        },
        other => FetchError::Status(other),
    }
}

fn retry_after(headers: &HeaderMap) -> Option<u64> {
    header_u64(headers, "retry-after").or_else(|| {
        let reset = header_u64(headers, "x-ratelimit-reset")?;
        let now = u64::try_from(Utc::now().timestamp()).ok()?;
        Some(reset.saturating_sub(now))
    })
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}
