use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::discord::DEFAULT_DISCORD_API;
use crate::error::ConfigError;
use crate::milestone::Thresholds;
use crate::poller::PollConfig;
use crate::repo::{repo_list, RepoList};
use crate::source::DEFAULT_GITHUB_API;

const APP_DIR: &str = "stargazer";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub github: GithubConfig,
    pub poll: PollSettings,
    pub milestones: MilestoneConfig,
    pub discord: DiscordConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub api_base: String,
    pub token: Option<String>,
    pub request_timeout_seconds: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub interval_minutes: u64,
    pub repos: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MilestoneConfig {
    pub thresholds: Vec<u64>,
    /// Keep announced milestones on disk so a restart does not announce them again.
    pub persist_announced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub api_base: String,
    pub bot_token: Option<String>,
    /// Channel names to announce in, most preferred first.
    pub channel_names: Vec<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_GITHUB_API.to_owned(),
            token: None,
            request_timeout_seconds: 10,
            user_agent: concat!("stargazer/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 15,
            repos: [
                "BlackRoad-OS/pi-cost-calculator",
                "BlackRoad-OS/pi-ai-starter-kit",
                "BlackRoad-OS/pi-ai-registry",
                "BlackRoad-OS/pi-ai-hub",
                "BlackRoad-OS/pi-launch-dashboard",
                "BlackRoad-OS/pi-monitoring-automation",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
        }
    }
}

impl Default for MilestoneConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default().into(),
            persist_announced: true,
        }
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_DISCORD_API.to_owned(),
            bot_token: None,
            channel_names: vec!["announcements".to_owned(), "general".to_owned()],
        }
    }
}

impl AppConfig {
    /// Directory holding the config file and the announced milestone store.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join(APP_DIR))
    }

    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    pub fn announced_store_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("announced.json"))
    }

    /// Loads the config file, or writes out and returns the defaults when there
    /// is none yet. Environment tokens are applied on top.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_or_init(&Self::config_file_path()?)?;
        config.apply_env();
        Ok(config)
    }

    /// Reads `path`, creating it with the defaults only when it does not
    /// exist. An unreadable or malformed file is returned as an error and
    /// left untouched.
    pub fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        match Self::load_from_file(path) {
            Ok(config) => Ok(config),
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no configuration found, writing defaults");
                let default_config = Self::default();
                if let Err(save_err) = default_config.save_to(path) {
                    warn!(error = %save_err, "could not save default configuration");
                }
                Ok(default_config)
            }
            Err(e) => Err(e),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // tokens come from the environment and are never written back
        let mut scrubbed = self.clone();
        scrubbed.github.token = None;
        scrubbed.discord.bot_token = None;
        std::fs::write(path, serde_json::to_string_pretty(&scrubbed)?)?;
        Ok(())
    }

    /// `DISCORD_BOT_TOKEN` and `GITHUB_TOKEN` take precedence over the file.
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var("DISCORD_BOT_TOKEN").ok(),
            std::env::var("GITHUB_TOKEN").ok(),
        );
    }

    fn apply_overrides(&mut self, discord_token: Option<String>, github_token: Option<String>) {
        if let Some(token) = discord_token.filter(|t| !t.is_empty()) {
            self.discord.bot_token = Some(token);
        }
        if let Some(token) = github_token.filter(|t| !t.is_empty()) {
            self.github.token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.repos()?;
        self.thresholds()?;
        self.github_api()?;
        self.discord_api()?;
        if self.poll.interval_minutes == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.github.request_timeout_seconds == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn discord_token(&self) -> Result<&str, ConfigError> {
        self.discord
            .bot_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingToken("discord bot"))
    }

    pub fn repos(&self) -> Result<RepoList, ConfigError> {
        Ok(repo_list(self.poll.repos.iter().cloned())?)
    }

    pub fn thresholds(&self) -> Result<Thresholds, ConfigError> {
        Thresholds::new(self.milestones.thresholds.clone())
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(self.poll.interval_minutes.max(1) * 60),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.github.request_timeout_seconds)
    }

    pub fn github_api(&self) -> Result<Url, ConfigError> {
        api_base(&self.github.api_base)
    }

    pub fn discord_api(&self) -> Result<Url, ConfigError> {
        api_base(&self.discord.api_base)
    }
}

/// Parses a base URL so that relative joins append to its path.
pub fn api_base(raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
