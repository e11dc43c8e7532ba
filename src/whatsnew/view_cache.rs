//! Per-user serialized feed views keyed by content fingerprint.

use crate::server::metrics;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

type ViewKey = (String, String);

/// Result of rendering a view on a cache miss.
pub enum ComputedView {
    /// Safe to serve again while the fingerprint is current.
    Cacheable(Vec<u8>),
    /// Built from a degraded input; served once and never stored.
    Transient(Vec<u8>),
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<ViewKey, Arc<[u8]>>,
    /// Bumped on every purge of a user. A view computed under an older
    /// generation is not stored.
    generations: HashMap<String, u64>,
}

impl CacheState {
    fn generation(&self, user_id: &str) -> u64 {
        self.generations.get(user_id).copied().unwrap_or(0)
    }
}

/// Disposable cache of pre-serialized views.
///
/// An entry is only reachable while its fingerprint is current; inserting
/// under a new fingerprint drops everything cached under older ones.
#[derive(Default)]
pub struct ViewCache {
    state: RwLock<CacheState>,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    // Entries are disposable, so a poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, user_id: &str, fingerprint: &str) -> Option<Arc<[u8]>> {
        self.read()
            .entries
            .get(&(user_id.to_string(), fingerprint.to_string()))
            .cloned()
    }

    /// Current purge generation of a user.
    pub fn generation(&self, user_id: &str) -> u64 {
        self.read().generation(user_id)
    }

    /// Store a view computed at `generation`, returning whichever value
    /// ends up served.
    ///
    /// If the user was purged since `generation` was read the view is
    /// returned without being stored.
    pub fn insert(
        &self,
        user_id: &str,
        fingerprint: &str,
        generation: u64,
        view: Vec<u8>,
    ) -> Arc<[u8]> {
        let mut state = self.write();
        if state.generation(user_id) != generation {
            return Arc::from(view);
        }
        state.entries.retain(|(_, fp), _| fp == fingerprint);
        state
            .entries
            .entry((user_id.to_string(), fingerprint.to_string()))
            .or_insert_with(|| Arc::from(view))
            .clone()
    }

    /// Cached view for `(user_id, fingerprint)`, computing it on a miss.
    ///
    /// `compute` runs without any cache lock held. Two concurrent misses may
    /// both compute; the first insert wins and both callers get its bytes.
    pub async fn get_view<F, Fut, E>(
        &self,
        user_id: &str,
        fingerprint: &str,
        compute: F,
    ) -> Result<Arc<[u8]>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ComputedView, E>>,
    {
        let generation = {
            let state = self.read();
            if let Some(view) = state
                .entries
                .get(&(user_id.to_string(), fingerprint.to_string()))
            {
                metrics::record_view_cache_lookup(true);
                return Ok(view.clone());
            }
            state.generation(user_id)
        };
        metrics::record_view_cache_lookup(false);

        match compute().await? {
            ComputedView::Cacheable(view) => Ok(self.insert(user_id, fingerprint, generation, view)),
            ComputedView::Transient(view) => Ok(Arc::from(view)),
        }
    }

    /// Drop every cached view of one user, including views still being
    /// computed.
    pub fn purge_user(&self, user_id: &str) {
        let mut state = self.write();
        state.entries.retain(|(user, _), _| user != user_id);
        *state.generations.entry(user_id.to_string()).or_insert(0) += 1;
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
