//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per what's-new endpoint. When routes or
//! request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use std::time::Duration;

/// HTTP test client sending a session token on every request
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
    token: Option<String>,
}

impl TestClient {
    /// Creates a client that sends no credentials
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            token: None,
        }
    }

    /// Creates a client that authenticates with the given token
    pub fn with_token(base_url: String, token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            ..Self::new(base_url)
        }
    }

    pub fn alice(base_url: String) -> Self {
        Self::with_token(base_url, ALICE_TOKEN)
    }

    pub fn carol(base_url: String) -> Self {
        Self::with_token(base_url, CAROL_TOKEN)
    }

    pub fn admin(base_url: String) -> Self {
        Self::with_token(base_url, ADMIN_TOKEN)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header("Authorization", token),
            None => request,
        }
    }

    // ========================================================================
    // Server
    // ========================================================================

    pub async fn get_home(&self) -> Response {
        self.client
            .get(self.url("/"))
            .send()
            .await
            .expect("Home request failed")
    }

    // ========================================================================
    // What's New Endpoints
    // ========================================================================

    /// GET /whatsnew/Data?userId=
    pub async fn get_data(&self, user_id: &str) -> Response {
        self.authorize(self.client.get(self.url("/whatsnew/Data")))
            .query(&[("userId", user_id)])
            .send()
            .await
            .expect("Data request failed")
    }

    /// GET /whatsnew/Data as JSON, asserting success
    pub async fn get_data_json(&self, user_id: &str) -> serde_json::Value {
        let response = self.get_data(user_id).await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        response.json().await.expect("Data is not JSON")
    }

    /// POST /whatsnew/Refresh
    pub async fn refresh(&self) -> Response {
        self.authorize(self.client.post(self.url("/whatsnew/Refresh")))
            .send()
            .await
            .expect("Refresh request failed")
    }

    /// GET /whatsnew/LastSeen/{userId}
    pub async fn get_last_seen(&self, user_id: &str) -> Response {
        self.authorize(
            self.client
                .get(self.url(&format!("/whatsnew/LastSeen/{}", user_id))),
        )
        .send()
        .await
        .expect("LastSeen request failed")
    }

    /// POST /whatsnew/LastSeen/{userId}?date=
    pub async fn mark_seen(&self, user_id: &str, date: Option<&str>) -> Response {
        let mut request = self.authorize(
            self.client
                .post(self.url(&format!("/whatsnew/LastSeen/{}", user_id))),
        );
        if let Some(date) = date {
            request = request.query(&[("date", date)]);
        }
        request.send().await.expect("Mark seen request failed")
    }

    /// POST /whatsnew/BulkUserData?userId=
    pub async fn bulk_user_data(&self, user_id: &str, item_ids: &[&str]) -> Response {
        self.authorize(self.client.post(self.url("/whatsnew/BulkUserData")))
            .query(&[("userId", user_id)])
            .json(&item_ids)
            .send()
            .await
            .expect("BulkUserData request failed")
    }

    /// GET /whatsnew/Jobs
    pub async fn get_jobs(&self) -> Response {
        self.authorize(self.client.get(self.url("/whatsnew/Jobs")))
            .send()
            .await
            .expect("Jobs request failed")
    }

    /// GET /whatsnew/Jobs/{jobId}
    pub async fn get_job(&self, job_id: &str) -> Response {
        self.authorize(
            self.client
                .get(self.url(&format!("/whatsnew/Jobs/{}", job_id))),
        )
        .send()
        .await
        .expect("Job request failed")
    }
}

/// Ids of the notifications in a Data payload, in feed order
pub fn notification_ids(view: &serde_json::Value) -> Vec<String> {
    view["Notifications"]
        .as_array()
        .expect("Notifications is not an array")
        .iter()
        .map(|n| n["Id"].as_str().expect("Notification without Id").to_string())
        .collect()
}

/// Poll `check` until it holds or the eventual timeout expires
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < Duration::from_millis(EVENTUAL_TIMEOUT_MS) {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
