//! Host library trait definitions.

use super::models::{Identity, LibraryFolder, LibraryItem};
use tokio::sync::mpsc;

/// Change notification emitted by the host library.
#[derive(Debug, Clone, PartialEq)]
pub enum LibraryEvent {
    ItemAdded(LibraryItem),
    ItemUpdated(LibraryItem),
    ItemRemoved { item_id: String },
}

/// A live registration against the host's change stream.
///
/// Events are delivered over an unbounded channel so the host's dispatch
/// path never waits on the feed. Pass `id` back to
/// [`LibraryHost::unsubscribe`] on shutdown.
pub struct LibrarySubscription {
    pub id: u64,
    pub events: mpsc::UnboundedReceiver<LibraryEvent>,
}

/// Read access to the host library plus its change stream.
pub trait LibraryHost: Send + Sync {
    /// Get an item by ID.
    fn get_item(&self, item_id: &str) -> Option<LibraryItem>;

    /// Folders containing the item, nearest first.
    fn ancestors(&self, item_id: &str) -> Vec<LibraryFolder>;

    /// Top-level collection the item lives in.
    fn root_collection(&self, item_id: &str) -> Option<LibraryFolder>;

    /// Most recently created non-folder, non-virtual items, newest first.
    fn recent_items(&self, limit: usize) -> Vec<LibraryItem>;

    fn user_exists(&self, user_id: &str) -> bool;

    /// Whether the user is allowed to see the item.
    fn can_view(&self, user_id: &str, item_id: &str) -> bool;

    fn is_played(&self, user_id: &str, item_id: &str) -> bool;

    /// Register for change events.
    fn subscribe(&self) -> LibrarySubscription;

    /// Drop a registration. Unknown ids are ignored.
    fn unsubscribe(&self, subscription_id: u64);
}

/// Resolves request credentials into an identity.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: &str) -> Option<Identity>;
}
