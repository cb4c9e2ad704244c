use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::error;

use reclaim_match::ingest;
use reclaim_types::api::RunMatchingResponse;

use crate::AppState;

/// Operator hatch: run one ingest + matching cycle now instead of waiting
/// for the change monitor.
pub async fn run(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let ingested = tokio::task::spawn_blocking(move || ingest::classify_and_store(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Ingest pass failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let pass = state.matcher.run_pass().await.map_err(|e| {
        error!("Matching pass failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(RunMatchingResponse {
        inserted_lost: ingested.inserted_lost,
        inserted_found: ingested.inserted_found,
        lost_considered: pass.lost_considered,
        records_written: pass.records_written,
        notifications_sent: pass.notifications_sent,
    }))
}
