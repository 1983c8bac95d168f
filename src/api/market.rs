//! Market-data handlers: OHLCV reads and aggregate refresh.

use crate::api::events::parse_symbol;
use crate::api::AppState;
use crate::domain::Timeframe;
use crate::error::AppError;
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;

#[derive(Debug, Deserialize)]
pub struct OhlcvQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<i64>,
    pub timeframe: Option<String>,
}

/// GET /stocks/{symbol}/ohlcv?from&to&limit&timeframe
pub async fn get_ohlcv(
    Path(symbol): Path<String>,
    Query(params): Query<OhlcvQuery>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let symbol = parse_symbol(&symbol)?;

    let from = parse_date(params.from.as_deref(), "from")?;
    let to = parse_date(params.to.as_deref(), "to")?;
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(AppError::Validation(
                "from must not be after to".to_string(),
            ));
        }
    }

    let timeframe = match params.timeframe.as_deref() {
        None => Timeframe::Daily,
        Some(raw) => Timeframe::from_str(raw).map_err(AppError::Validation)?,
    };

    let limit = params.limit.unwrap_or(100).clamp(1, 10_000);

    let bars = state
        .repo
        .get_bars(symbol.code(), timeframe, from, to, limit)
        .await?;

    Ok(Json(json!({
        "success": true,
        "symbol": symbol.code(),
        "timeframe": timeframe.to_string(),
        "count": bars.len(),
        "data": bars,
    })))
}

/// POST /market/refresh-aggregates
pub async fn refresh_aggregates(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.repo.refresh_aggregates().await?;
    Ok(Json(json!({
        "success": true,
        "message": "aggregates refreshed",
    })))
}

fn parse_date(raw: Option<&str>, field: &str) -> Result<Option<NaiveDate>, AppError> {
    match raw {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                AppError::Validation(format!("invalid {} date, use YYYY-MM-DD", field))
            }),
    }
}
