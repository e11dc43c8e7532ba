//! Specific background job implementations.

pub mod expiry_sweep;
pub mod feed_rebuild;

pub use expiry_sweep::{ExpirySweepJob, EXPIRY_SWEEP_JOB_ID};
pub use feed_rebuild::{FeedRebuildJob, FEED_REBUILD_JOB_ID};
