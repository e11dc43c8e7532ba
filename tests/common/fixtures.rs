//! Test library fixture

use super::constants::*;
use serde_json::json;
use whatsnew_server::library::{LibraryFixture, LibraryItem};

pub fn create_test_library() -> LibraryFixture {
    serde_json::from_value(json!({
        "folders": [
            {"id": MOVIES_LIBRARY_ID, "name": "Movies"},
            {"id": SHOWS_LIBRARY_ID, "name": "Shows"},
            {"id": MUSIC_LIBRARY_ID, "name": "Music"},
        ],
        "items": [
            {"id": MOVIE_1_ID, "name": "First Movie", "kind": "Movie",
             "parent_id": MOVIES_LIBRARY_ID, "date_created": "2024-03-01T10:00:00Z",
             "production_year": 2023, "run_time_ticks": 72000000000_i64},
            {"id": MOVIE_2_ID, "name": "Second Movie", "kind": "Movie",
             "parent_id": MOVIES_LIBRARY_ID, "date_created": "2024-03-02T10:00:00Z"},
            {"id": MOVIE_3_ID, "name": "Third Movie", "kind": "Movie",
             "parent_id": MOVIES_LIBRARY_ID, "date_created": "2024-03-03T10:00:00Z"},
            {"id": MOVIE_4_ID, "name": "Restricted Movie", "kind": "Movie",
             "parent_id": MOVIES_LIBRARY_ID, "date_created": "2024-03-04T10:00:00Z"},
            {"id": "series-1", "name": "A Show", "kind": "Series", "is_folder": true,
             "parent_id": SHOWS_LIBRARY_ID, "date_created": "2024-02-01T10:00:00Z"},
            {"id": EPISODE_1_ID, "name": "Pilot", "kind": "Episode", "parent_id": "series-1",
             "series_name": "A Show", "series_id": "series-1",
             "index_number": 1, "parent_index_number": 1,
             "date_created": "2024-03-02T12:00:00Z"},
            {"id": EPISODE_2_ID, "name": "Second", "kind": "Episode", "parent_id": "series-1",
             "series_name": "A Show", "series_id": "series-1",
             "index_number": 2, "parent_index_number": 1,
             "date_created": "2024-03-05T12:00:00Z"},
            {"id": VIRTUAL_EPISODE_ID, "name": "Unaired", "kind": "Episode",
             "parent_id": "series-1", "is_virtual": true,
             "date_created": "2024-03-06T12:00:00Z"},
            {"id": ALBUM_1_ID, "name": "An Album", "kind": "MusicAlbum",
             "parent_id": MUSIC_LIBRARY_ID, "date_created": "2024-03-01T08:00:00Z"},
        ],
        "users": [
            {"id": ALICE_ID, "token": ALICE_TOKEN,
             "hidden_items": [MOVIE_4_ID], "played_items": [MOVIE_1_ID]},
            {"id": CAROL_ID, "token": CAROL_TOKEN},
            {"id": ADMIN_ID, "token": ADMIN_TOKEN, "is_admin": true},
        ],
    }))
    .expect("Invalid test library fixture")
}

/// A movie that is not in the fixture yet
pub fn new_movie(id: &str, date_created: &str) -> LibraryItem {
    serde_json::from_value(json!({
        "id": id,
        "name": format!("Movie {}", id),
        "kind": "Movie",
        "parent_id": MOVIES_LIBRARY_ID,
        "date_created": date_created,
    }))
    .expect("Invalid test movie")
}
