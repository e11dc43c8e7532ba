//! Facade tying the feed store, read state and view cache to the library.

use super::models::{tick_epoch, FeedView};
use super::read_state::ReadStateTracker;
use super::store::{NotificationStore, StoreError};
use super::view_cache::{ComputedView, ViewCache};
use crate::library::{LibraryEvent, LibraryHost};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Unknown user {0}")]
    UnknownUser(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to serialize feed view: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub struct WhatsNewService {
    store: Arc<NotificationStore>,
    read_state: ReadStateTracker,
    view_cache: ViewCache,
    library: Arc<dyn LibraryHost>,
}

impl WhatsNewService {
    pub fn new(
        store: Arc<NotificationStore>,
        read_state: ReadStateTracker,
        library: Arc<dyn LibraryHost>,
    ) -> Self {
        Self {
            store,
            read_state,
            view_cache: ViewCache::new(),
            library,
        }
    }

    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    pub fn user_exists(&self, user_id: &str) -> bool {
        self.library.user_exists(user_id)
    }

    /// Serialized feed as seen by one user.
    pub async fn get_feed_view(&self, user_id: &str) -> Result<Arc<[u8]>, FeedError> {
        if !self.library.user_exists(user_id) {
            return Err(FeedError::UnknownUser(user_id.to_string()));
        }
        let snapshot = self.store.snapshot().await?;

        self.view_cache
            .get_view(user_id, &snapshot.fingerprint, || async {
                let notifications = snapshot
                    .items
                    .iter()
                    .filter(|item| self.library.can_view(user_id, &item.id))
                    .cloned()
                    .collect();
                // An unknown last-seen is served as the epoch but never cached.
                let (last_seen, cacheable) = match self.read_state.try_get(user_id).await {
                    Some(seen) => (seen, true),
                    None => (tick_epoch(), false),
                };
                let view = FeedView {
                    hash: snapshot.fingerprint.clone(),
                    last_seen,
                    notifications,
                };
                serde_json::to_vec(&view)
                    .map(|bytes| {
                        if cacheable {
                            ComputedView::Cacheable(bytes)
                        } else {
                            ComputedView::Transient(bytes)
                        }
                    })
                    .map_err(FeedError::Serialization)
            })
            .await
    }

    pub async fn last_seen(&self, user_id: &str) -> DateTime<Utc> {
        self.read_state.get(user_id).await
    }

    /// Move the user's last-seen marker. Cached views embed it, so the
    /// user's cached views are dropped.
    pub fn mark_seen(&self, user_id: &str, seen_at: DateTime<Utc>) -> JoinHandle<()> {
        let write = self.read_state.set(user_id, seen_at);
        self.view_cache.purge_user(user_id);
        write
    }

    /// Played flag for every requested id; unknown ids map to false.
    pub fn played_status(&self, user_id: &str, item_ids: &[String]) -> HashMap<String, bool> {
        item_ids
            .iter()
            .map(|id| {
                let played = self.library.get_item(id).is_some()
                    && self.library.is_played(user_id, id);
                (id.clone(), played)
            })
            .collect()
    }

    pub async fn handle_event(&self, event: LibraryEvent) -> Result<bool, StoreError> {
        match event {
            LibraryEvent::ItemAdded(item) | LibraryEvent::ItemUpdated(item) => {
                self.store.ingest(&item).await
            }
            LibraryEvent::ItemRemoved { item_id } => self.store.remove(&item_id).await,
        }
    }

    /// Consume library change events until cancelled or the library closes
    /// the subscription.
    pub fn spawn_event_worker(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let service = self.clone();
        let mut subscription = self.library.subscribe();
        info!("Listening for library changes (subscription {})", subscription.id);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = subscription.events.recv() => {
                        let Some(event) = event else { break };
                        match service.handle_event(event).await {
                            Ok(changed) => debug!("Library event applied, feed changed: {}", changed),
                            Err(e) => warn!("Failed to apply library event: {}", e),
                        }
                    }
                }
            }
            service.library.unsubscribe(subscription.id);
            info!("Stopped listening for library changes");
        })
    }
}
