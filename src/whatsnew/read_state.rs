//! Per-user last-seen timestamps.
//!
//! The in-memory map is authoritative for the running process. The
//! persisted map (user id to ticks) is only touched under `file_lock`, which
//! is independent from the feed lock.

use super::models::{datetime_to_ticks, tick_epoch, ticks_to_datetime};
use super::snapshot_file::SnapshotFile;
use crate::server::metrics;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const DEFAULT_READ_LOCK_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_WRITE_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

const SNAPSHOT_LABEL: &str = "last_seen";

type TicksMap = HashMap<String, i64>;
type SeenCache = Arc<RwLock<HashMap<String, DateTime<Utc>>>>;

pub struct ReadStateTracker {
    cache: SeenCache,
    file: SnapshotFile,
    file_lock: Arc<Mutex<()>>,
    read_lock_timeout: Duration,
    write_lock_timeout: Duration,
}

impl ReadStateTracker {
    pub fn new(file: SnapshotFile) -> Self {
        Self::with_timeouts(file, DEFAULT_READ_LOCK_TIMEOUT, DEFAULT_WRITE_LOCK_TIMEOUT)
    }

    pub fn with_timeouts(
        file: SnapshotFile,
        read_lock_timeout: Duration,
        write_lock_timeout: Duration,
    ) -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            file,
            file_lock: Arc::new(Mutex::new(())),
            read_lock_timeout,
            write_lock_timeout,
        }
    }

    /// Last-seen instant of a user, or the tick epoch if never set or if
    /// the persisted map could not be consulted in time.
    pub async fn get(&self, user_id: &str) -> DateTime<Utc> {
        self.try_get(user_id).await.unwrap_or_else(tick_epoch)
    }

    /// Like [`get`](Self::get), but `None` when the file lock timed out and
    /// the answer is unknown.
    ///
    /// A cache miss falls back to the persisted map.
    pub async fn try_get(&self, user_id: &str) -> Option<DateTime<Utc>> {
        if let Some(value) = read_cache(&self.cache).get(user_id) {
            return Some(*value);
        }

        let _guard = match tokio::time::timeout(self.read_lock_timeout, self.file_lock.lock()).await
        {
            Ok(guard) => guard,
            Err(_) => {
                warn!("Timed out reading last-seen for {}", user_id);
                metrics::record_persistence_error(SNAPSHOT_LABEL, "lock_timeout");
                return None;
            }
        };

        let stored = load_ticks(&self.file).await;
        let mut cache = write_cache(&self.cache);
        for (user, ticks) in stored {
            // Values set during this session win over what is on disk.
            cache.entry(user).or_insert_with(|| ticks_to_datetime(ticks));
        }
        Some(cache.get(user_id).copied().unwrap_or_else(tick_epoch))
    }

    #[cfg(test)]
    pub(crate) async fn hold_file_lock(&self) -> tokio::sync::OwnedMutexGuard<()> {
        self.file_lock.clone().lock_owned().await
    }

    /// Record a new last-seen instant.
    ///
    /// The cache is updated before returning; the durable write runs in the
    /// returned task.
    pub fn set(&self, user_id: &str, seen_at: DateTime<Utc>) -> JoinHandle<()> {
        write_cache(&self.cache).insert(user_id.to_string(), seen_at);
        debug!("Last-seen for {} set to {}", user_id, seen_at);

        let cache = self.cache.clone();
        let file = self.file.clone();
        let file_lock = self.file_lock.clone();
        let timeout = self.write_lock_timeout;
        let user_id = user_id.to_string();

        tokio::spawn(async move {
            let _guard = match tokio::time::timeout(timeout, file_lock.lock()).await {
                Ok(guard) => guard,
                Err(_) => {
                    warn!("Dropping last-seen write for {}: file lock timed out", user_id);
                    metrics::record_persistence_error(SNAPSHOT_LABEL, "lock_timeout");
                    return;
                }
            };

            let mut stored = load_ticks(&file).await;
            {
                let cache = read_cache(&cache);
                for (user, seen) in cache.iter() {
                    stored.insert(user.clone(), datetime_to_ticks(*seen));
                }
            }

            let result = tokio::task::spawn_blocking(move || file.write(&stored)).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Failed to persist last-seen map: {:#}", e);
                    metrics::record_persistence_error(SNAPSHOT_LABEL, "write");
                }
                Err(e) => {
                    warn!("Last-seen writer panicked: {}", e);
                    metrics::record_persistence_error(SNAPSHOT_LABEL, "write");
                }
            }
        })
    }
}

// The map holds plain values, so a poisoned lock is still consistent.
fn read_cache(cache: &SeenCache) -> RwLockReadGuard<'_, HashMap<String, DateTime<Utc>>> {
    cache.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_cache(cache: &SeenCache) -> RwLockWriteGuard<'_, HashMap<String, DateTime<Utc>>> {
    cache.write().unwrap_or_else(PoisonError::into_inner)
}

/// Persisted map, empty when missing or unreadable.
async fn load_ticks(file: &SnapshotFile) -> TicksMap {
    let file = file.clone();
    let loaded = tokio::task::spawn_blocking(move || file.read::<TicksMap>()).await;
    match loaded {
        Ok(Ok(Some(map))) => map,
        Ok(Ok(None)) => TicksMap::new(),
        Ok(Err(e)) => {
            warn!("Ignoring unreadable last-seen map: {:#}", e);
            metrics::record_persistence_error(SNAPSHOT_LABEL, "read");
            TicksMap::new()
        }
        Err(e) => {
            warn!("Last-seen reader panicked: {}", e);
            TicksMap::new()
        }
    }
}
