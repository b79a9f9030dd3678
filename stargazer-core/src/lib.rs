pub mod config;
pub mod discord;
pub mod error;
pub mod milestone;
pub mod notifier;
pub mod poller;
pub mod repo;
pub mod source;
pub mod stats;
pub mod storage;

pub use config::AppConfig;
pub use discord::{DiscordChannel, DiscordDirectory};
pub use error::{ConfigError, DeliveryError, FetchError, PollError, RepoParseError};
pub use milestone::{crossed, MilestoneKey, MilestoneTracker, Thresholds};
pub use notifier::{
    DeliveryFailure, DeliveryReport, Destination, DestinationDirectory, Notification, Notifier,
    StaticDirectory,
};
pub use poller::{spawn_poller, PollConfig, Poller, PollerHandle, RepoOutcome, TickReport};
pub use repo::{repo_list, RepoList, TrackedRepo};
pub use source::{GithubClient, MetricSource};
pub use stats::{MetricSnapshot, StatsCache, StatsReader, StatsTotals};
pub use storage::AnnouncedStore;
