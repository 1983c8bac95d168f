//! Bulk sync control handlers.

use crate::api::AppState;
use crate::error::AppError;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

/// GET /market/bulk-sync/status
pub async fn get_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = state.bulk_sync.status().await;
    Json(json!({
        "success": true,
        "status": status,
    }))
}

/// GET /market/bulk-sync/info
pub async fn get_info(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let info = state.bulk_sync.sync_info().await?;
    Ok(Json(json!({
        "success": true,
        "info": info,
    })))
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub start_date: String,
    pub end_date: String,
    #[serde(default = "default_skip_synced")]
    pub skip_synced: bool,
    // Accepted for wire compatibility; holdings prioritization belongs to
    // the per-symbol sync path that the date-based worker replaced.
    #[serde(default)]
    pub portfolio_id: Option<Uuid>,
    #[serde(default)]
    pub priority_holdings: bool,
}

fn default_skip_synced() -> bool {
    true
}

/// POST /market/bulk-sync/start
pub async fn start(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let start_date = parse_date(&request.start_date, "start_date")?;
    let end_date = parse_date(&request.end_date, "end_date")?;

    state
        .bulk_sync
        .clone()
        .start(start_date, end_date, request.skip_synced)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "message": "bulk sync started",
            "mode": "date",
        })),
    ))
}

/// POST /market/bulk-sync/stop
pub async fn stop(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    state.bulk_sync.stop().await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "message": "sync stopped",
        })),
    ))
}

fn parse_date(raw: &str, field: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("invalid {} format, use YYYY-MM-DD", field)))
}
