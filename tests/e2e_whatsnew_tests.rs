//! End-to-end tests for the what's-new feed endpoints
//!
//! Covers:
//! - Per-user filtered feed payloads and their caching
//! - Library change events reaching the feed
//! - Last-seen marking
//! - Played-state bulk lookup
//! - Manual refresh rate limiting

mod common;

use common::*;
use reqwest::StatusCode;

#[tokio::test]
async fn test_feed_is_filtered_per_user() {
    let server = TestServer::spawn().await;

    let carol = TestClient::carol(server.base_url.clone());
    let view = carol.get_data_json(CAROL_ID).await;
    let ids = notification_ids(&view);
    assert_eq!(ids.len(), FEED_ITEM_COUNT);
    assert!(ids.contains(&MOVIE_4_ID.to_string()));
    assert!(!ids.contains(&VIRTUAL_EPISODE_ID.to_string()));
    assert!(!ids.contains(&"series-1".to_string()));

    let alice = TestClient::alice(server.base_url.clone());
    let view = alice.get_data_json(ALICE_ID).await;
    let ids = notification_ids(&view);
    assert_eq!(ids.len(), FEED_ITEM_COUNT - 1);
    assert!(!ids.contains(&MOVIE_4_ID.to_string()));
}

#[tokio::test]
async fn test_feed_payload_shape() {
    let server = TestServer::spawn().await;
    let client = TestClient::carol(server.base_url.clone());

    let view = client.get_data_json(CAROL_ID).await;
    assert!(view["Hash"].as_str().is_some_and(|h| !h.is_empty()));
    assert_eq!(view["LastSeen"], "0001-01-01T00:00:00Z");

    let notifications = view["Notifications"].as_array().unwrap();
    // Newest first
    assert_eq!(notifications[0]["Id"], EPISODE_2_ID);
    assert_eq!(notifications[0]["Category"], "Series");
    assert_eq!(notifications[0]["SeriesName"], "A Show");
    assert_eq!(notifications[0]["Type"], "Episode");

    let album = notifications
        .iter()
        .find(|n| n["Id"] == ALBUM_1_ID)
        .expect("Album missing from feed");
    assert_eq!(album["Category"], "Music");

    let movie = notifications
        .iter()
        .find(|n| n["Id"] == MOVIE_1_ID)
        .expect("Movie missing from feed");
    assert_eq!(movie["Category"], "Movies");
    assert_eq!(movie["ProductionYear"], 2023);
}

#[tokio::test]
async fn test_unchanged_feed_is_served_identically() {
    let server = TestServer::spawn().await;
    let client = TestClient::carol(server.base_url.clone());

    let first = client.get_data(CAROL_ID).await.bytes().await.unwrap();
    let second = client.get_data(CAROL_ID).await.bytes().await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_library_changes_reach_the_feed() {
    let server = TestServer::spawn().await;
    let client = TestClient::carol(server.base_url.clone());
    let before = client.get_data_json(CAROL_ID).await;
    let client = &client;

    server
        .library
        .add_item(new_movie("movie-new", "2024-04-01T00:00:00Z"));
    let appeared = eventually(|| async move {
        notification_ids(&client.get_data_json(CAROL_ID).await).contains(&"movie-new".to_string())
    })
    .await;
    assert!(appeared, "New movie never reached the feed");

    let after = client.get_data_json(CAROL_ID).await;
    assert_ne!(before["Hash"], after["Hash"]);
    assert_eq!(notification_ids(&after)[0], "movie-new");

    server.library.remove_item(MOVIE_2_ID);
    let removed = eventually(|| async move {
        !notification_ids(&client.get_data_json(CAROL_ID).await).contains(&MOVIE_2_ID.to_string())
    })
    .await;
    assert!(removed, "Removed movie is still in the feed");
}

#[tokio::test]
async fn test_feed_snapshot_is_persisted() {
    let server = TestServer::spawn().await;
    let path = server.data_dir.path().join("notifications.json");

    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(stored.as_array().unwrap().len(), FEED_ITEM_COUNT);
}

#[tokio::test]
async fn test_mark_seen_updates_feed_payload() {
    let server = TestServer::spawn().await;
    let client = TestClient::alice(server.base_url.clone());

    // Prime the cached view
    let view = client.get_data_json(ALICE_ID).await;
    assert_eq!(view["LastSeen"], "0001-01-01T00:00:00Z");

    let response = client
        .mark_seen(ALICE_ID, Some("2024-03-03T00:00:00Z"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = client.get_last_seen(ALICE_ID).await;
    assert_eq!(response.status(), StatusCode::OK);
    let last_seen: String = response.json().await.unwrap();
    assert_eq!(last_seen, "2024-03-03T00:00:00Z");

    let view = client.get_data_json(ALICE_ID).await;
    assert_eq!(view["LastSeen"], "2024-03-03T00:00:00Z");
}

#[tokio::test]
async fn test_mark_seen_defaults_to_now() {
    let server = TestServer::spawn().await;
    let client = TestClient::alice(server.base_url.clone());
    let before = chrono::Utc::now();

    let response = client.mark_seen(ALICE_ID, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let last_seen: chrono::DateTime<chrono::Utc> =
        client.get_last_seen(ALICE_ID).await.json().await.unwrap();
    assert!(last_seen >= before);
}

#[tokio::test]
async fn test_mark_seen_rejects_bad_date() {
    let server = TestServer::spawn().await;
    let client = TestClient::alice(server.base_url.clone());

    let response = client.mark_seen(ALICE_ID, Some("last tuesday")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bulk_user_data_reports_played_state() {
    let server = TestServer::spawn().await;
    let client = TestClient::alice(server.base_url.clone());

    let response = client
        .bulk_user_data(ALICE_ID, &[MOVIE_1_ID, MOVIE_2_ID, "no-such-item"])
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({MOVIE_1_ID: true, MOVIE_2_ID: false, "no-such-item": false})
    );
}

#[tokio::test]
async fn test_refresh_is_rate_limited() {
    let server = TestServer::spawn().await;
    let admin = TestClient::admin(server.base_url.clone());

    let response = admin.refresh().await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = admin.refresh().await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
}

#[tokio::test]
async fn test_refresh_rebuilds_feed() {
    let server = TestServer::spawn().await;
    let admin = TestClient::admin(server.base_url.clone());

    // Expire everything, then let the rebuild repopulate from the library.
    server
        .whatsnew
        .store()
        .expire_older_than(chrono::Utc::now())
        .await
        .unwrap();
    assert!(server.whatsnew.store().is_empty().await.unwrap());

    assert_eq!(admin.refresh().await.status(), StatusCode::OK);

    let store = server.whatsnew.store();
    let rebuilt = eventually(|| async move {
        store.snapshot().await.unwrap().items.len() == FEED_ITEM_COUNT
    })
    .await;
    assert!(rebuilt, "Refresh did not rebuild the feed");
}

#[tokio::test]
async fn test_jobs_listing_for_admin() {
    let server = TestServer::spawn().await;

    let admin = TestClient::admin(server.base_url.clone());
    let response = admin.get_jobs().await;
    assert_eq!(response.status(), StatusCode::OK);
    let jobs: serde_json::Value = response.json().await.unwrap();
    assert_eq!(jobs[0]["id"], "whatsnew_rebuild");

    let response = admin.get_job("whatsnew_rebuild").await;
    assert_eq!(response.status(), StatusCode::OK);
    let job: serde_json::Value = response.json().await.unwrap();
    assert_eq!(job["schedule"]["type"], "hook");
    assert_eq!(admin.get_job("nope").await.status(), StatusCode::NOT_FOUND);

    let alice = TestClient::alice(server.base_url.clone());
    assert_eq!(alice.get_jobs().await.status(), StatusCode::FORBIDDEN);
}
