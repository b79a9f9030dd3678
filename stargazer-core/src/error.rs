use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("repository not found")]
    NotFound,
    #[error("rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed repository payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid request url: {0}")]
    Url(#[from] url::ParseError),
}

impl FetchError {
    /// Whether the next scheduled tick has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::RateLimited { .. } | FetchError::Transport(_) => true,
            FetchError::Status(status) => status.is_server_error(),
            FetchError::NotFound | FetchError::Decode(_) | FetchError::Url(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("destination rejected message with status {status}")]
    Rejected { status: StatusCode },
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid destination url: {0}")]
    Url(#[from] url::ParseError),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("poller task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not locate a configuration directory")]
    NoConfigDir,
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("missing {0} token")]
    MissingToken(&'static str),
    #[error("at least one milestone threshold is required")]
    NoThresholds,
    #[error("poll interval must be at least one minute")]
    ZeroInterval,
    #[error("request timeout must be at least one second")]
    ZeroTimeout,
    #[error(transparent)]
    Repo(#[from] RepoParseError),
    #[error("invalid api base url: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid repository id {0:?}, expected owner/name")]
pub struct RepoParseError(pub String);
