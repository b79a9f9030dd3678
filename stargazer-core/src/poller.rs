use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{FetchError, PollError};
use crate::milestone::MilestoneTracker;
use crate::notifier::{DeliveryReport, Notifier};
use crate::repo::{RepoList, TrackedRepo};
use crate::source::MetricSource;
use crate::stats::{MetricSnapshot, StatsCache, StatsReader};

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug)]
pub enum RepoOutcome {
    Updated {
        previous: Option<MetricSnapshot>,
        current: MetricSnapshot,
        announced: Vec<DeliveryReport>,
    },
    Failed(FetchError),
}

#[derive(Debug)]
pub struct RepoReport {
    pub repo: TrackedRepo,
    pub outcome: RepoOutcome,
}

/// Result of one pass over every tracked repository.
#[derive(Debug, Default)]
pub struct TickReport {
    pub repos: Vec<RepoReport>,
}

impl TickReport {
    pub fn updated(&self) -> usize {
        self.repos
            .iter()
            .filter(|r| matches!(r.outcome, RepoOutcome::Updated { .. }))
            .count()
    }

    pub fn failed(&self) -> impl Iterator<Item = (&TrackedRepo, &FetchError)> {
        self.repos.iter().filter_map(|r| match &r.outcome {
            RepoOutcome::Failed(err) => Some((&r.repo, err)),
            RepoOutcome::Updated { .. } => None,
        })
    }

    /// `(repo, threshold)` for every milestone announced during the tick.
    pub fn announced(&self) -> Vec<(TrackedRepo, u64)> {
        self.repos
            .iter()
            .flat_map(|r| match &r.outcome {
                RepoOutcome::Updated { announced, .. } => announced
                    .iter()
                    .map(|report| (r.repo.clone(), report.notification.threshold))
                    .collect(),
                RepoOutcome::Failed(_) => Vec::new(),
            })
            .collect()
    }
}

/// Owns the stats cache and milestone state and drives them from fresh
/// metrics.
pub struct Poller {
    repos: RepoList,
    source: Arc<dyn MetricSource>,
    cache: StatsCache,
    tracker: MilestoneTracker,
    notifier: Notifier,
}

impl Poller {
    pub fn new(
        repos: RepoList,
        source: Arc<dyn MetricSource>,
        tracker: MilestoneTracker,
        notifier: Notifier,
    ) -> Self {
        Self {
            repos,
            source,
            cache: StatsCache::new(),
            tracker,
            notifier,
        }
    }

    pub fn repos(&self) -> &RepoList {
        &self.repos
    }

    pub fn stats(&self) -> StatsReader {
        self.cache.reader()
    }

    pub fn tracker(&self) -> &MilestoneTracker {
        &self.tracker
    }

    /// Fetches every repository and applies the results.
    ///
    /// Fetches run concurrently; their results are applied one repository at
    /// a time in tracked order. A failed fetch leaves that repository's cache
    /// entry untouched and does not affect the others.
    pub async fn poll_once(&mut self) -> TickReport {
        let source = &self.source;
        let results = join_all(self.repos.iter().map(|repo| source.fetch(repo))).await;

        let repos = self.repos.clone();
        let mut report = TickReport::default();
        for (repo, result) in repos.iter().zip(results) {
            let outcome = match result {
                Ok(snapshot) => self.apply(repo, snapshot).await,
                Err(err) => {
                    warn!(
                        repo = %repo,
                        error = %err,
                        transient = err.is_transient(),
                        "failed to fetch repository stats"
                    );
                    RepoOutcome::Failed(err)
                }
            };
            report.repos.push(RepoReport {
                repo: repo.clone(),
                outcome,
            });
        }
        report
    }

    async fn apply(&mut self, repo: &TrackedRepo, current: MetricSnapshot) -> RepoOutcome {
        let previous = self.cache.get(repo).await;
        let fresh = self.tracker.evaluate(repo, previous.as_ref(), &current).await;

        let mut announced = Vec::with_capacity(fresh.len());
        for threshold in fresh {
            announced.push(self.notifier.deliver(repo, threshold, &current).await);
        }

        self.cache.replace(repo, current).await;
        debug!(repo = %repo, stars = current.stars, "stats updated");

        RepoOutcome::Updated {
            previous,
            current,
            announced,
        }
    }
}

pub struct PollerHandle {
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
    stats: StatsReader,
}

impl PollerHandle {
    pub fn stats(&self) -> StatsReader {
        self.stats.clone()
    }

    pub async fn stop(self) -> Result<(), PollError> {
        let _ = self.cancel_tx.send(());
        self.join.await.map_err(PollError::from)
    }
}

/// Runs `poller` every `config.interval` until the handle is stopped.
///
/// The first tick fires immediately. A tick that overruns the interval delays
/// the next one instead of queueing more. Dropping the handle without calling
/// [`PollerHandle::stop`] leaves the poller running for the life of the runtime.
pub fn spawn_poller(mut poller: Poller, config: PollConfig) -> PollerHandle {
    let (cancel_tx, mut cancel_rx) = broadcast::channel(1);
    let stats = poller.stats();
    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut handle_alive = true;

        loop {
            tokio::select! {
                cancel = cancel_rx.recv(), if handle_alive => match cancel {
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("poller handle dropped; running detached");
                        handle_alive = false;
                    }
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        info!("poller shutdown requested");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    let report = poller.poll_once().await;
                    info!(
                        updated = report.updated(),
                        failed = report.failed().count(),
                        announced = report.announced().len(),
                        "poll tick finished"
                    );
                }
            }
        }
    });

    PollerHandle {
        cancel_tx,
        join,
        stats,
    }
}
