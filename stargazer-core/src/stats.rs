use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::repo::TrackedRepo;

/// Popularity counters for one repository, replaced wholesale on every poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub stars: u64,
    pub forks: u64,
    pub watchers: u64,
}

impl MetricSnapshot {
    /// The counter milestones are measured against.
    pub fn primary(&self) -> u64 {
        self.stars
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: MetricSnapshot,
    updated_at: DateTime<Utc>,
}

type CacheMap = Arc<RwLock<HashMap<TrackedRepo, CacheEntry>>>;

/// Last successfully fetched snapshot per repository.
///
/// Only the poller holds a `StatsCache`; everyone else reads through a
/// [`StatsReader`].
#[derive(Debug, Default)]
pub struct StatsCache {
    inner: CacheMap,
}

impl StatsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reader(&self) -> StatsReader {
        StatsReader {
            inner: self.inner.clone(),
        }
    }

    pub async fn get(&self, repo: &TrackedRepo) -> Option<MetricSnapshot> {
        self.inner.read().await.get(repo).map(|entry| entry.snapshot)
    }

    /// Stores `snapshot` as the current value and returns the one it replaced.
    pub async fn replace(
        &mut self,
        repo: &TrackedRepo,
        snapshot: MetricSnapshot,
    ) -> Option<MetricSnapshot> {
        let entry = CacheEntry {
            snapshot,
            updated_at: Utc::now(),
        };
        self.inner
            .write()
            .await
            .insert(repo.clone(), entry)
            .map(|previous| previous.snapshot)
    }
}

/// Aggregate counters across a set of repositories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsTotals {
    pub stars: u64,
    pub forks: u64,
    pub watchers: u64,
    /// How many of the requested repositories had a snapshot.
    pub known: usize,
}

/// Read-only view of the stats cache for presentation code.
#[derive(Debug, Clone)]
pub struct StatsReader {
    inner: CacheMap,
}

impl StatsReader {
    pub async fn get(&self, repo: &TrackedRepo) -> Option<MetricSnapshot> {
        self.inner.read().await.get(repo).map(|entry| entry.snapshot)
    }

    pub async fn updated_at(&self, repo: &TrackedRepo) -> Option<DateTime<Utc>> {
        self.inner.read().await.get(repo).map(|entry| entry.updated_at)
    }

    /// Every cached snapshot, ordered by repository id.
    pub async fn all(&self) -> Vec<(TrackedRepo, MetricSnapshot)> {
        let inner = self.inner.read().await;
        let mut all: Vec<_> = inner
            .iter()
            .map(|(repo, entry)| (repo.clone(), entry.snapshot))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub async fn totals(&self, repos: &[TrackedRepo]) -> StatsTotals {
        let inner = self.inner.read().await;
        repos
            .iter()
            .filter_map(|repo| inner.get(repo))
            .fold(StatsTotals::default(), |mut acc, entry| {
                acc.stars += entry.snapshot.stars;
                acc.forks += entry.snapshot.forks;
                acc.watchers += entry.snapshot.watchers;
                acc.known += 1;
                acc
            })
    }

    /// Star count as display text, `"?"` when the repository was never fetched.
    pub async fn stars_label(&self, repo: &TrackedRepo) -> String {
        self.get(repo)
            .await
            .map(|snapshot| snapshot.stars.to_string())
            .unwrap_or_else(|| "?".to_owned())
    }
}
