//! Common test infrastructure
//!
//! This module provides all the infrastructure needed for end-to-end tests.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestServer, TestClient, ALICE_ID};
//! use reqwest::StatusCode;
//!
//! #[tokio::test]
//! async fn test_get_feed() {
//!     let server = TestServer::spawn().await;
//!     let client = TestClient::alice(server.base_url.clone());
//!
//!     let response = client.get_data(ALICE_ID).await;
//!     assert_eq!(response.status(), StatusCode::OK);
//! }
//! ```

mod client;
mod constants;
mod fixtures;
mod server;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use client::{eventually, notification_ids, TestClient};
pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::new_movie;
pub use server::TestServer;
