//! Shared constants for end-to-end tests
//!
//! When the test library changes (users, tokens, item ids), update only
//! this file and `fixtures.rs`.

// ============================================================================
// Test Users
// ============================================================================

/// Regular user who cannot see `MOVIE_4_ID`
pub const ALICE_ID: &str = "6f1c2d3e-4b5a-4c6d-8e7f-901234567890";
pub const ALICE_TOKEN: &str = "alice-token";

/// Second regular user with full visibility
pub const CAROL_ID: &str = "3c9e1f20-7a6b-4d5c-9e8f-0a1b2c3d4e5f";
pub const CAROL_TOKEN: &str = "carol-token";

pub const ADMIN_ID: &str = "11111111-2222-4333-8444-555555555555";
pub const ADMIN_TOKEN: &str = "admin-token";

/// Well-formed id that no user has
pub const UNKNOWN_USER_ID: &str = "99999999-9999-4999-8999-999999999999";

// ============================================================================
// Test Library
// ============================================================================

pub const MOVIES_LIBRARY_ID: &str = "movies-root";
pub const SHOWS_LIBRARY_ID: &str = "shows-root";
pub const MUSIC_LIBRARY_ID: &str = "music-root";

pub const MOVIE_1_ID: &str = "movie-1";
pub const MOVIE_2_ID: &str = "movie-2";
pub const MOVIE_3_ID: &str = "movie-3";
pub const MOVIE_4_ID: &str = "movie-4";
pub const EPISODE_1_ID: &str = "episode-1";
pub const EPISODE_2_ID: &str = "episode-2";
pub const ALBUM_1_ID: &str = "album-1";

/// Missing episode placeholder, never part of the feed
pub const VIRTUAL_EPISODE_ID: &str = "episode-missing";

/// Items the rebuilt feed holds
pub const FEED_ITEM_COUNT: usize = 7;

// ============================================================================
// Timeouts
// ============================================================================

pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Upper bound for background work (event ingestion, rebuilds) to land
pub const EVENTUAL_TIMEOUT_MS: u64 = 3000;
