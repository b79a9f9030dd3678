use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::milestone::MilestoneKey;
use crate::repo::TrackedRepo;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct AnnouncedData {
    // repo -> thresholds already announced
    announced: BTreeMap<TrackedRepo, BTreeSet<u64>>,
}

/// Milestones that have already been announced.
///
/// The set only grows. With a backing file it survives restarts, otherwise it
/// lives as long as the process.
#[derive(Debug, Clone)]
pub struct AnnouncedStore {
    inner: Arc<RwLock<AnnouncedData>>,
    path: Option<PathBuf>,
    persist_lock: Arc<Mutex<()>>,
}

impl AnnouncedStore {
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(RwLock::new(AnnouncedData::default())),
            path: None,
            persist_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Opens the store at `path`, falling back to its `.json.tmp` sibling and
    /// then to an empty set when the file is missing or corrupted.
    pub async fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let data = match read_data(&path).await {
            Some(data) => data,
            None => read_data(&path.with_extension("json.tmp"))
                .await
                .unwrap_or_default(),
        };
        debug!(
            path = %path.display(),
            repos = data.announced.len(),
            "loaded announced milestones"
        );
        Self {
            inner: Arc::new(RwLock::new(data)),
            path: Some(path),
            persist_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Records `key` and returns `true` if it was not announced before.
    ///
    /// The check and the insert happen under one write lock, so concurrent
    /// callers racing on the same key see exactly one `true`.
    pub async fn mark_if_new(&self, key: &MilestoneKey) -> bool {
        let mut inner = self.inner.write().await;
        let inserted = inner
            .announced
            .entry(key.repo.clone())
            .or_default()
            .insert(key.threshold);
        drop(inner);

        if inserted {
            if let Err(err) = self.persist().await {
                warn!(%err, "failed to persist announced milestones");
            }
        }
        inserted
    }

    pub async fn contains(&self, key: &MilestoneKey) -> bool {
        self.inner
            .read()
            .await
            .announced
            .get(&key.repo)
            .map(|set| set.contains(&key.threshold))
            .unwrap_or(false)
    }

    pub async fn len(&self) -> usize {
        self.inner
            .read()
            .await
            .announced
            .values()
            .map(BTreeSet::len)
            .sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn persist(&self) -> Result<(), std::io::Error> {
        let Some(path) = &self.path else {
            debug!("announced store is in-memory only; skipping persist");
            return Ok(());
        };

        // Each writer snapshots the latest state while holding the lock, so an
        // older snapshot can never overwrite a newer one.
        let _guard = self.persist_lock.lock().await;
        let bytes = {
            let inner = self.inner.read().await;
            serde_json::to_vec_pretty(&*inner)?
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await
    }
}

async fn read_data(path: &Path) -> Option<AnnouncedData> {
    let bytes = tokio::fs::read(path).await.ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(data) => Some(data),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "failed to parse announced store");
            None
        }
    }
}
