//! Realtime quote handlers.

use crate::api::events::parse_symbol;
use crate::api::AppState;
use crate::domain::Symbol;
use crate::error::AppError;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

/// GET /market/status
pub async fn get_market_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = state.realtime.market_status();
    Json(json!({
        "success": true,
        "data": status,
    }))
}

/// GET /realtime/{symbol}
pub async fn get_quote(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let symbol = parse_symbol(&symbol)?;
    let quote = state.realtime.get_quote(&symbol).await?;
    Ok(Json(json!({
        "success": true,
        "data": quote,
    })))
}

#[derive(Debug, Deserialize)]
pub struct BatchQuotesQuery {
    pub symbols: String,
}

/// GET /realtime?symbols=2330,2317
pub async fn get_batch_quotes(
    Query(params): Query<BatchQuotesQuery>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let symbols: Vec<Symbol> = params
        .symbols
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_symbol(s.trim()))
        .collect::<Result<_, _>>()?;

    if symbols.is_empty() {
        return Err(AppError::Validation(
            "at least one symbol is required".to_string(),
        ));
    }

    let quotes = state.realtime.get_batch_quotes(&symbols).await?;
    Ok(Json(json!({
        "success": true,
        "count": quotes.len(),
        "data": quotes,
    })))
}
