//! In-memory host library backed by a JSON fixture.
//!
//! Used by the standalone binary and by the tests. Mutations through
//! [`InMemoryLibrary::add_item`] and [`InMemoryLibrary::remove_item`] are
//! published to every live subscription.

use super::models::{Identity, LibraryFolder, LibraryItem};
use super::trait_def::{Authenticator, LibraryEvent, LibraryHost, LibrarySubscription};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Guards against malformed fixtures where parents form a cycle.
const MAX_ANCESTOR_DEPTH: usize = 64;

#[derive(Debug, Clone, Deserialize)]
pub struct FolderFixture {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserFixture {
    pub id: String,
    pub token: String,
    #[serde(default)]
    pub is_admin: bool,
    /// Items this user is not allowed to see.
    #[serde(default)]
    pub hidden_items: HashSet<String>,
    #[serde(default)]
    pub played_items: HashSet<String>,
}

/// On-disk shape of a library fixture.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LibraryFixture {
    pub folders: Vec<FolderFixture>,
    pub items: Vec<LibraryItem>,
    pub users: Vec<UserFixture>,
}

impl LibraryFixture {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read library fixture: {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse library fixture: {:?}", path))
    }
}

#[derive(Default)]
struct LibraryState {
    folders: HashMap<String, FolderFixture>,
    items: HashMap<String, LibraryItem>,
    users: HashMap<String, UserFixture>,
}

pub struct InMemoryLibrary {
    state: RwLock<LibraryState>,
    subscribers: Mutex<HashMap<u64, mpsc::UnboundedSender<LibraryEvent>>>,
    next_subscription_id: AtomicU64,
}

impl InMemoryLibrary {
    pub fn new(fixture: LibraryFixture) -> Self {
        let state = LibraryState {
            folders: fixture
                .folders
                .into_iter()
                .map(|f| (f.id.clone(), f))
                .collect(),
            items: fixture
                .items
                .into_iter()
                .map(|i| (i.id.clone(), i))
                .collect(),
            users: fixture
                .users
                .into_iter()
                .map(|u| (u.id.to_lowercase(), u))
                .collect(),
        };
        info!(
            "Library loaded: {} folders, {} items, {} users",
            state.folders.len(),
            state.items.len(),
            state.users.len()
        );
        Self {
            state: RwLock::new(state),
            subscribers: Mutex::new(HashMap::new()),
            next_subscription_id: AtomicU64::new(1),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(LibraryFixture::load(path)?))
    }

    /// Insert or replace an item and notify subscribers.
    pub fn add_item(&self, item: LibraryItem) {
        let existed = {
            let mut state = self.state.write().unwrap();
            state.items.insert(item.id.clone(), item.clone()).is_some()
        };
        let event = if existed {
            LibraryEvent::ItemUpdated(item)
        } else {
            LibraryEvent::ItemAdded(item)
        };
        self.publish(event);
    }

    /// Remove an item and notify subscribers. Returns false if it was unknown.
    pub fn remove_item(&self, item_id: &str) -> bool {
        let removed = self.state.write().unwrap().items.remove(item_id).is_some();
        if removed {
            self.publish(LibraryEvent::ItemRemoved {
                item_id: item_id.to_string(),
            });
        }
        removed
    }

    pub fn set_played(&self, user_id: &str, item_id: &str, played: bool) {
        let mut state = self.state.write().unwrap();
        if let Some(user) = state.users.get_mut(&user_id.to_lowercase()) {
            if played {
                user.played_items.insert(item_id.to_string());
            } else {
                user.played_items.remove(item_id);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    fn publish(&self, event: LibraryEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        // Receivers dropped without unsubscribing are pruned here.
        subscribers.retain(|id, tx| {
            let delivered = tx.send(event.clone()).is_ok();
            if !delivered {
                debug!("Dropping closed library subscription {}", id);
            }
            delivered
        });
    }

    /// Parent chain of an item, nearest first, including item containers.
    fn parent_chain(state: &LibraryState, item_id: &str) -> Vec<LibraryFolder> {
        let mut chain = Vec::new();
        let mut next = state.items.get(item_id).and_then(|i| i.parent_id.clone());

        while let Some(parent_id) = next {
            if chain.len() >= MAX_ANCESTOR_DEPTH {
                break;
            }
            if let Some(folder) = state.folders.get(&parent_id) {
                chain.push(LibraryFolder {
                    id: folder.id.clone(),
                    name: folder.name.clone(),
                });
                next = folder.parent_id.clone();
            } else if let Some(container) = state.items.get(&parent_id) {
                chain.push(LibraryFolder {
                    id: container.id.clone(),
                    name: container.name.clone(),
                });
                next = container.parent_id.clone();
            } else {
                break;
            }
        }
        chain
    }
}

impl LibraryHost for InMemoryLibrary {
    fn get_item(&self, item_id: &str) -> Option<LibraryItem> {
        self.state.read().unwrap().items.get(item_id).cloned()
    }

    fn ancestors(&self, item_id: &str) -> Vec<LibraryFolder> {
        let state = self.state.read().unwrap();
        Self::parent_chain(&state, item_id)
    }

    fn root_collection(&self, item_id: &str) -> Option<LibraryFolder> {
        let state = self.state.read().unwrap();
        Self::parent_chain(&state, item_id).pop()
    }

    fn recent_items(&self, limit: usize) -> Vec<LibraryItem> {
        let state = self.state.read().unwrap();
        let mut items: Vec<LibraryItem> = state
            .items
            .values()
            .filter(|i| !i.is_folder && !i.is_virtual)
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            b.date_created
                .cmp(&a.date_created)
                .then_with(|| a.id.cmp(&b.id))
        });
        items.truncate(limit);
        items
    }

    fn user_exists(&self, user_id: &str) -> bool {
        self.state
            .read()
            .unwrap()
            .users
            .contains_key(&user_id.to_lowercase())
    }

    fn can_view(&self, user_id: &str, item_id: &str) -> bool {
        let state = self.state.read().unwrap();
        match state.users.get(&user_id.to_lowercase()) {
            Some(user) => state.items.contains_key(item_id) && !user.hidden_items.contains(item_id),
            None => false,
        }
    }

    fn is_played(&self, user_id: &str, item_id: &str) -> bool {
        let state = self.state.read().unwrap();
        state
            .users
            .get(&user_id.to_lowercase())
            .map(|u| u.played_items.contains(item_id))
            .unwrap_or(false)
    }

    fn subscribe(&self) -> LibrarySubscription {
        let id = self.next_subscription_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().insert(id, tx);
        debug!("Library subscription {} registered", id);
        LibrarySubscription { id, events: rx }
    }

    fn unsubscribe(&self, subscription_id: u64) {
        if self
            .subscribers
            .lock()
            .unwrap()
            .remove(&subscription_id)
            .is_some()
        {
            debug!("Library subscription {} removed", subscription_id);
        }
    }
}

impl Authenticator for InMemoryLibrary {
    fn authenticate(&self, token: &str) -> Option<Identity> {
        let state = self.state.read().unwrap();
        state
            .users
            .values()
            .find(|u| u.token == token)
            .map(|u| Identity {
                user_id: u.id.to_lowercase(),
                is_admin: u.is_admin,
            })
    }
}
