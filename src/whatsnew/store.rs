//! Canonical notification list: ingestion, quota eviction, expiry and
//! snapshot persistence.
//!
//! Every mutation and every snapshot write happens under a single async
//! mutex, acquired with a bounded wait. The list is kept behind an `Arc` and
//! replaced wholesale on change, so [`NotificationStore::snapshot`] hands
//! out the exact list a fingerprint was computed from.

use super::classifier::Classifier;
use super::models::{FeedSnapshot, NotificationItem};
use super::quota::{apply_category_quota, category_counts, fingerprint};
use super::snapshot_file::SnapshotFile;
use crate::library::{LibraryHost, LibraryItem};
use crate::server::metrics;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Minimum number of candidates pulled by a rebuild.
const MIN_REBUILD_PULL: usize = 200;
/// Candidates pulled per retained slot, so sparse categories still fill up.
const REBUILD_PULL_FACTOR: usize = 20;

const SNAPSHOT_LABEL: &str = "notifications";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Timed out waiting for the feed lock")]
    LockTimeout,

    #[error("Rebuild was cancelled")]
    Cancelled,

    #[error("Library pull failed: {0}")]
    LibraryPull(String),
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub limit_per_category: usize,
    pub lock_timeout: Duration,
}

struct StoreState {
    items: Arc<Vec<NotificationItem>>,
    fingerprint: String,
}

pub struct NotificationStore {
    state: Mutex<StoreState>,
    classifier: Classifier,
    library: Arc<dyn LibraryHost>,
    snapshot_file: SnapshotFile,
    settings: StoreSettings,
}

impl NotificationStore {
    /// Open the store, loading the last snapshot if it is readable.
    ///
    /// An unreadable or corrupt snapshot is logged and replaced by an empty
    /// list; it never prevents startup.
    pub fn open(
        snapshot_file: SnapshotFile,
        classifier: Classifier,
        library: Arc<dyn LibraryHost>,
        settings: StoreSettings,
    ) -> Self {
        let loaded: Vec<NotificationItem> = match snapshot_file.read() {
            Ok(Some(items)) => items,
            Ok(None) => {
                info!("No feed snapshot at {:?}, starting empty", snapshot_file.path());
                Vec::new()
            }
            Err(e) => {
                warn!("Discarding unreadable feed snapshot: {:#}", e);
                metrics::record_persistence_error(SNAPSHOT_LABEL, "read");
                Vec::new()
            }
        };

        let items = apply_category_quota(dedup_by_id(loaded), settings.limit_per_category);
        info!("Feed loaded with {} items", items.len());
        metrics::set_feed_items(&category_counts(&items));

        Self {
            state: Mutex::new(StoreState {
                fingerprint: fingerprint(&items),
                items: Arc::new(items),
            }),
            classifier,
            library,
            snapshot_file,
            settings,
        }
    }

    pub fn limit_per_category(&self) -> usize {
        self.settings.limit_per_category
    }

    /// Consistent copy of the list with its fingerprint.
    pub async fn snapshot(&self) -> Result<FeedSnapshot, StoreError> {
        let state = self.lock().await?;
        Ok(FeedSnapshot {
            items: state.items.clone(),
            fingerprint: state.fingerprint.clone(),
        })
    }

    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.lock().await?.items.is_empty())
    }

    /// Add or replace the entry for a library item. Returns whether the
    /// feed content changed.
    pub async fn ingest(&self, item: &LibraryItem) -> Result<bool, StoreError> {
        let Some(classification) = self.classifier.classify(item) else {
            debug!("Item {} is not eligible for the feed", item.id);
            return Ok(false);
        };
        let notification = NotificationItem::from_library_item(item, classification.category);

        let mut state = self.lock().await?;
        let mut items: Vec<NotificationItem> = state.items.as_ref().clone();
        match items.iter_mut().find(|i| i.id == notification.id) {
            Some(existing) => *existing = notification,
            None => items.push(notification),
        }
        let items = apply_category_quota(items, self.settings.limit_per_category);
        Ok(self.commit(&mut state, items, "ingest").await)
    }

    /// Drop the entry with the given id, if present.
    pub async fn remove(&self, item_id: &str) -> Result<bool, StoreError> {
        let mut state = self.lock().await?;
        if !state.items.iter().any(|i| i.id == item_id) {
            return Ok(false);
        }
        let items: Vec<NotificationItem> = state
            .items
            .iter()
            .filter(|i| i.id != item_id)
            .cloned()
            .collect();
        Ok(self.commit(&mut state, items, "remove").await)
    }

    /// Replace the whole list with the eligible subset of `candidates`.
    ///
    /// Classification runs before the lock is taken. If `cancel` fires
    /// before the swap, the current list is left untouched.
    pub async fn rebuild(
        &self,
        candidates: Vec<LibraryItem>,
        cancel: &CancellationToken,
    ) -> Result<usize, StoreError> {
        let mut seen = HashSet::new();
        let mut fresh = Vec::new();
        for candidate in &candidates {
            if cancel.is_cancelled() {
                info!("Feed rebuild cancelled during classification");
                return Err(StoreError::Cancelled);
            }
            if !seen.insert(candidate.id.clone()) {
                continue;
            }
            if let Some(classification) = self.classifier.classify(candidate) {
                fresh.push(NotificationItem::from_library_item(
                    candidate,
                    classification.category,
                ));
            }
        }
        let items = apply_category_quota(fresh, self.settings.limit_per_category);

        let mut state = self.lock().await?;
        if cancel.is_cancelled() {
            info!("Feed rebuild cancelled before commit");
            return Err(StoreError::Cancelled);
        }
        let retained = items.len();
        self.commit(&mut state, items, "rebuild").await;
        info!(
            "Feed rebuilt from {} candidates, {} retained",
            candidates.len(),
            retained
        );
        Ok(retained)
    }

    /// Rebuild from a fresh pull of the library's newest items.
    pub async fn rebuild_from_library(&self, cancel: &CancellationToken) -> Result<usize, StoreError> {
        let pull_cap = (self.settings.limit_per_category * REBUILD_PULL_FACTOR).max(MIN_REBUILD_PULL);
        let library = self.library.clone();
        let candidates = tokio::task::spawn_blocking(move || library.recent_items(pull_cap))
            .await
            .map_err(|e| {
                warn!("Library pull for rebuild failed: {}", e);
                StoreError::LibraryPull(e.to_string())
            })?;
        self.rebuild(candidates, cancel).await
    }

    /// Remove entries created strictly before `cutoff`. Returns how many
    /// were removed.
    pub async fn expire_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut state = self.lock().await?;
        let before = state.items.len();
        let items: Vec<NotificationItem> = state
            .items
            .iter()
            .filter(|i| i.date_created >= cutoff)
            .cloned()
            .collect();
        let expired = before - items.len();
        if expired > 0 {
            self.commit(&mut state, items, "expire").await;
            info!("Expired {} feed items created before {}", expired, cutoff);
        }
        Ok(expired)
    }

    async fn lock(&self) -> Result<tokio::sync::MutexGuard<'_, StoreState>, StoreError> {
        tokio::time::timeout(self.settings.lock_timeout, self.state.lock())
            .await
            .map_err(|_| {
                warn!("Timed out acquiring feed lock");
                StoreError::LockTimeout
            })
    }

    /// Swap in `items` if their content differs and persist them.
    async fn commit(
        &self,
        state: &mut StoreState,
        items: Vec<NotificationItem>,
        operation: &str,
    ) -> bool {
        let new_fingerprint = fingerprint(&items);
        if new_fingerprint == state.fingerprint {
            return false;
        }

        metrics::set_feed_items(&category_counts(&items));
        metrics::record_feed_mutation(operation);
        debug!(
            "Feed {} changed fingerprint {} -> {}",
            operation, state.fingerprint, new_fingerprint
        );
        state.items = Arc::new(items);
        state.fingerprint = new_fingerprint;

        self.persist(state.items.clone()).await;
        true
    }

    /// Write the snapshot. Failures are logged; the in-memory list stays
    /// authoritative.
    async fn persist(&self, items: Arc<Vec<NotificationItem>>) {
        let file = self.snapshot_file.clone();
        let result = tokio::task::spawn_blocking(move || file.write(items.as_ref())).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Failed to persist feed snapshot: {:#}", e);
                metrics::record_persistence_error(SNAPSHOT_LABEL, "write");
            }
            Err(e) => {
                warn!("Feed snapshot writer panicked: {}", e);
                metrics::record_persistence_error(SNAPSHOT_LABEL, "write");
            }
        }
    }
}

fn dedup_by_id(items: Vec<NotificationItem>) -> Vec<NotificationItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|i| seen.insert(i.id.clone()))
        .collect()
}
