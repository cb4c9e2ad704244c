use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;

use reclaim_types::api::MarkReadResponse;
use reclaim_types::models::Notification;

use crate::AppState;

/// Inbox and replay share this cap: at most 20 unread, newest first.
const UNREAD_LIMIT: u32 = 20;

pub async fn unread(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.unread_notifications(&user_id, UNREAD_LIMIT))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let notifications: Vec<Notification> =
        rows.into_iter().map(|row| row.into_notification()).collect();
    Ok(Json(notifications))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(notification_id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let id = notification_id.clone();
    let updated = tokio::task::spawn_blocking(move || db.mark_notification_read(&id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if !updated {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(MarkReadResponse {
        id: notification_id,
        read: true,
    }))
}
