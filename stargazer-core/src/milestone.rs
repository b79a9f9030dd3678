use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::repo::TrackedRepo;
use crate::stats::MetricSnapshot;
use crate::storage::AnnouncedStore;

pub const DEFAULT_THRESHOLDS: [u64; 7] = [10, 25, 50, 100, 250, 500, 1000];

/// Strictly ascending, non-empty list of star counts worth announcing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u64>", into = "Vec<u64>")]
pub struct Thresholds(Vec<u64>);

impl Thresholds {
    /// Sorts and deduplicates `values`.
    pub fn new(mut values: Vec<u64>) -> Result<Self, ConfigError> {
        values.sort_unstable();
        values.dedup();
        if values.is_empty() {
            return Err(ConfigError::NoThresholds);
        }
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLDS.to_vec())
    }
}

impl TryFrom<Vec<u64>> for Thresholds {
    type Error = ConfigError;

    fn try_from(values: Vec<u64>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<Thresholds> for Vec<u64> {
    fn from(thresholds: Thresholds) -> Self {
        thresholds.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MilestoneKey {
    pub repo: TrackedRepo,
    pub threshold: u64,
}

/// Thresholds passed between `old` and `new`, in ascending order.
///
/// A repository that was never fetched counts as zero stars.
pub fn crossed(
    thresholds: &Thresholds,
    old: Option<&MetricSnapshot>,
    new: &MetricSnapshot,
) -> Vec<u64> {
    let before = old.map(MetricSnapshot::primary).unwrap_or(0);
    let after = new.primary();
    thresholds
        .as_slice()
        .iter()
        .copied()
        .filter(|&t| after >= t && before < t)
        .collect()
}

/// Turns counter changes into milestones that still need announcing.
#[derive(Debug, Clone)]
pub struct MilestoneTracker {
    thresholds: Thresholds,
    announced: AnnouncedStore,
}

impl MilestoneTracker {
    pub fn new(thresholds: Thresholds, announced: AnnouncedStore) -> Self {
        Self {
            thresholds,
            announced,
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn announced(&self) -> &AnnouncedStore {
        &self.announced
    }

    /// Returns the thresholds crossed by this change that were not announced
    /// before, marking each of them as announced.
    pub async fn evaluate(
        &self,
        repo: &TrackedRepo,
        old: Option<&MetricSnapshot>,
        new: &MetricSnapshot,
    ) -> Vec<u64> {
        let mut fresh = Vec::new();
        for threshold in crossed(&self.thresholds, old, new) {
            let key = MilestoneKey {
                repo: repo.clone(),
                threshold,
            };
            if self.announced.mark_if_new(&key).await {
                info!(repo = %repo, threshold, stars = new.stars, "milestone reached");
                fresh.push(threshold);
            } else {
                debug!(repo = %repo, threshold, "milestone already announced");
            }
        }
        fresh
    }
}
