use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use reclaim_db::models::PostRow;
use reclaim_types::api::CreatePostRequest;
use reclaim_types::models::{Location, Post};

use crate::AppState;

/// Accept a raw report. Identity is assigned here; the classifier later
/// snapshots it into the lost or found store, keyed by this id.
pub async fn create_post(
    State(state): State<AppState>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.title.trim().is_empty() || req.kind.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Normalized the way the matching stores expect them: kind and tags
    // upper-case, free text trimmed.
    let tags: Vec<String> = req
        .tags
        .iter()
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect();

    let post = Post {
        id: Uuid::new_v4().to_string(),
        kind: req.kind.trim().to_uppercase(),
        title: req.title.trim().to_string(),
        description: req.description.trim().to_string(),
        images: req.images,
        location: Location {
            place: req.place.trim().to_string(),
            area: req.area.trim().to_string(),
        },
        tags,
        submitter: req.submitter,
        created_at: chrono::Utc::now(),
        is_solved: false,
    };

    // Run blocking DB insert off the async runtime
    let row = PostRow::from_post(&post);
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || db.insert_post(&row))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Failed to store post: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn list_posts(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.list_posts())
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let posts: Vec<Post> = rows.into_iter().map(|row| row.into_post()).collect();
    Ok(Json(posts))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let id = post_id.clone();
    let row = tokio::task::spawn_blocking(move || db.get_post(&id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    match row {
        Some(row) => Ok(Json(row.into_post())),
        None => Err(StatusCode::NOT_FOUND),
    }
}
