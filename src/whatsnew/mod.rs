//! The what's-new feed: classification, quota-bounded storage, read state
//! and cached per-user views.

mod classifier;
mod models;
mod quota;
mod read_state;
mod refresh;
mod service;
mod snapshot_file;
mod store;
mod view_cache;

pub use classifier::{
    normalize_library_id, Classifier, ClassifierSettings, MOVIES_CATEGORY, MUSIC_CATEGORY,
    SERIES_CATEGORY,
};
pub use models::{
    datetime_to_ticks, tick_epoch, ticks_to_datetime, CategoryMapping, Classification,
    FeedSnapshot, FeedView, NotificationItem,
};
pub use quota::{
    apply_category_quota, category_counts, effective_limit, fingerprint,
    DEFAULT_LIMIT_PER_CATEGORY, MIN_LIMIT_PER_CATEGORY,
};
pub use read_state::ReadStateTracker;
pub use refresh::{RebuildTrigger, RefreshCoordinator, RefreshError, DEFAULT_REFRESH_COOLDOWN};
pub use service::{FeedError, WhatsNewService};
pub use snapshot_file::SnapshotFile;
pub use store::{NotificationStore, StoreError, StoreSettings};
pub use view_cache::{ComputedView, ViewCache};
