//! Per-category quota eviction and content fingerprinting.

use super::models::NotificationItem;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

pub const DEFAULT_LIMIT_PER_CATEGORY: usize = 10;
pub const MIN_LIMIT_PER_CATEGORY: usize = 3;

/// Clamp a configured limit to the supported floor.
pub fn effective_limit(configured: usize) -> usize {
    configured.max(MIN_LIMIT_PER_CATEGORY)
}

/// Keep only the `limit` most recently created items of every category.
///
/// The result is sorted by creation time, newest first. Items created at the
/// same instant keep their relative input order, so re-applying the quota to
/// its own output returns the same list.
pub fn apply_category_quota(
    mut items: Vec<NotificationItem>,
    limit: usize,
) -> Vec<NotificationItem> {
    items.sort_by(|a, b| b.date_created.cmp(&a.date_created));

    let mut kept_per_category: HashMap<String, usize> = HashMap::new();
    items.retain(|item| {
        let kept = kept_per_category.entry(item.category.clone()).or_insert(0);
        if *kept < limit {
            *kept += 1;
            true
        } else {
            false
        }
    });
    items
}

/// Content fingerprint of an ordered list.
///
/// Two lists share a fingerprint exactly when they serialize identically.
pub fn fingerprint(items: &[NotificationItem]) -> String {
    let mut hasher = Sha256::new();
    match serde_json::to_vec(items) {
        Ok(bytes) => hasher.update(&bytes),
        // Serializing plain data cannot fail; fall back to ids if it ever does.
        Err(_) => {
            for item in items {
                hasher.update(item.id.as_bytes());
                hasher.update([0u8]);
            }
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Number of retained items per category.
pub fn category_counts(items: &[NotificationItem]) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for item in items {
        *counts.entry(item.category.as_str()).or_insert(0) += 1;
    }
    counts
}
