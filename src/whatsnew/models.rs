//! What's-new feed data models

use crate::library::LibraryItem;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single "new content" entry of the feed.
///
/// Immutable once created: an edit of the underlying library item replaces
/// the whole entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NotificationItem {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_id: Option<String>,
    pub date_created: DateTime<Utc>,
    #[serde(rename = "Type")]
    pub item_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_time_ticks: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    #[serde(default)]
    pub backdrop_image_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_image_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_number: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_index_number: Option<i32>,
}

impl NotificationItem {
    pub fn from_library_item(item: &LibraryItem, category: String) -> Self {
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            category,
            series_name: item.series_name.clone(),
            series_id: item.series_id.clone(),
            date_created: item.date_created,
            item_type: item.kind.as_str().to_string(),
            run_time_ticks: item.run_time_ticks,
            production_year: item.production_year,
            overview: item.overview.clone(),
            backdrop_image_tags: item.backdrop_image_tags.clone(),
            primary_image_tag: item.primary_image_tag.clone(),
            index_number: item.index_number,
            parent_index_number: item.parent_index_number,
        }
    }
}

/// Overrides the category of everything matched through a given library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMapping {
    pub library_id: String,
    pub category: String,
}

/// Outcome of classifying an eligible item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: String,
    pub matched_library_id: String,
}

/// Consistent copy of the feed paired with the fingerprint it was taken at.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub items: Arc<Vec<NotificationItem>>,
    pub fingerprint: String,
}

/// Payload served to a user.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeedView {
    pub hash: String,
    pub last_seen: DateTime<Utc>,
    pub notifications: Vec<NotificationItem>,
}

/// Ticks are 100ns intervals since 0001-01-01T00:00:00Z.
const TICKS_PER_MICROSECOND: i64 = 10;

/// Start of the tick epoch, also the "never seen" last-seen value.
pub fn tick_epoch() -> DateTime<Utc> {
    let naive = NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();
    Utc.from_utc_datetime(&naive)
}

pub fn datetime_to_ticks(value: DateTime<Utc>) -> i64 {
    let micros = (value - tick_epoch()).num_microseconds().unwrap_or(0);
    micros.saturating_mul(TICKS_PER_MICROSECOND)
}

pub fn ticks_to_datetime(ticks: i64) -> DateTime<Utc> {
    tick_epoch() + chrono::Duration::microseconds(ticks / TICKS_PER_MICROSECOND)
}
