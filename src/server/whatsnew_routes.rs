//! What's-new API routes

use crate::whatsnew::{FeedError, RefreshError};

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use super::session::Session;
use super::state::{
    GuardedRefreshCoordinator, GuardedWhatsNewService, OptionalSchedulerHandle, ServerState,
};

#[derive(Deserialize)]
struct UserQuery {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

#[derive(Deserialize)]
struct LastSeenQuery {
    date: Option<String>,
}

/// Canonical form of a user id, or `None` if it is not a UUID.
fn parse_user_id(raw: &str) -> Option<String> {
    Uuid::parse_str(raw.trim())
        .ok()
        .map(|uuid| uuid.hyphenated().to_string())
}

/// Validate the target user and check the caller may act on it.
fn authorize_user(session: &Session, raw: Option<&str>) -> Result<String, Response> {
    let user_id = raw
        .and_then(parse_user_id)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "Invalid user id").into_response())?;
    if !session.can_access_user(&user_id) {
        return Err(StatusCode::FORBIDDEN.into_response());
    }
    Ok(user_id)
}

fn json_bytes(bytes: Vec<u8>) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// POST /Refresh - Start a full rebuild of the feed
async fn post_refresh(
    session: Session,
    State(refresh): State<GuardedRefreshCoordinator>,
) -> Response {
    if !session.is_admin {
        return StatusCode::FORBIDDEN.into_response();
    }
    match refresh.try_start_refresh().await {
        Ok(()) => (StatusCode::OK, "Refresh started").into_response(),
        Err(RefreshError::TooSoon { retry_after }) => {
            // Round up so clients never retry a moment too early.
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, secs.to_string())],
                format!("A refresh was started recently, wait {}s", secs),
            )
                .into_response()
        }
        Err(RefreshError::Busy) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "A refresh is being started, try again shortly",
        )
            .into_response(),
    }
}

/// GET /Data?userId= - The user's filtered feed
async fn get_data(
    session: Session,
    State(whatsnew): State<GuardedWhatsNewService>,
    Query(query): Query<UserQuery>,
) -> Response {
    let user_id = match authorize_user(&session, query.user_id.as_deref()) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match whatsnew.get_feed_view(&user_id).await {
        Ok(view) => json_bytes(view.to_vec()),
        Err(FeedError::UnknownUser(_)) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!("Failed to build feed for {}: {}", user_id, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /LastSeen/{userId}
async fn get_last_seen(
    session: Session,
    State(whatsnew): State<GuardedWhatsNewService>,
    Path(raw_user_id): Path<String>,
) -> Response {
    let user_id = match authorize_user(&session, Some(&raw_user_id)) {
        Ok(id) => id,
        Err(response) => return response,
    };
    Json(whatsnew.last_seen(&user_id).await).into_response()
}

/// POST /LastSeen/{userId}?date= - Mark the feed seen, now if no date is given
async fn post_last_seen(
    session: Session,
    State(whatsnew): State<GuardedWhatsNewService>,
    Path(raw_user_id): Path<String>,
    Query(query): Query<LastSeenQuery>,
) -> Response {
    let user_id = match authorize_user(&session, Some(&raw_user_id)) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let seen_at = match query.date.as_deref().map(str::trim) {
        None | Some("") => Utc::now(),
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(date) => date.with_timezone(&Utc),
            Err(e) => {
                warn!("Rejecting last-seen date {:?}: {}", raw, e);
                return (StatusCode::BAD_REQUEST, "Invalid date").into_response();
            }
        },
    };
    // The write completes in the background; reads see the new value at once.
    let _ = whatsnew.mark_seen(&user_id, seen_at);
    StatusCode::OK.into_response()
}

/// POST /BulkUserData?userId= - Played state of the given item ids
async fn post_bulk_user_data(
    session: Session,
    State(whatsnew): State<GuardedWhatsNewService>,
    Query(query): Query<UserQuery>,
    Json(item_ids): Json<Vec<String>>,
) -> Response {
    let user_id = match authorize_user(&session, query.user_id.as_deref()) {
        Ok(id) => id,
        Err(response) => return response,
    };
    Json(whatsnew.played_status(&user_id, &item_ids)).into_response()
}

/// GET /Jobs - Background jobs and their last runs (admin only)
async fn get_jobs(
    session: Session,
    State(scheduler): State<OptionalSchedulerHandle>,
) -> Response {
    if !session.is_admin {
        return StatusCode::FORBIDDEN.into_response();
    }
    match scheduler {
        Some(handle) => Json(handle.list_jobs().await).into_response(),
        None => Json(Vec::<crate::background_jobs::JobInfo>::new()).into_response(),
    }
}

/// GET /Jobs/{jobId} - One background job (admin only)
async fn get_job(
    session: Session,
    State(scheduler): State<OptionalSchedulerHandle>,
    Path(job_id): Path<String>,
) -> Response {
    if !session.is_admin {
        return StatusCode::FORBIDDEN.into_response();
    }
    let Some(handle) = scheduler else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match handle.get_job(&job_id).await {
        Some(info) => Json(info).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub fn make_whatsnew_routes(state: ServerState) -> Router {
    Router::new()
        .route("/Refresh", post(post_refresh))
        .route("/Data", get(get_data))
        .route("/LastSeen/{user_id}", get(get_last_seen).post(post_last_seen))
        .route("/BulkUserData", post(post_bulk_user_data))
        .route("/Jobs", get(get_jobs))
        .route("/Jobs/{job_id}", get(get_job))
        .with_state(state)
}
