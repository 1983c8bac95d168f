//! Event-log handlers: recording events and serving the derived views.

use crate::api::AppState;
use crate::domain::{
    Decimal, LedgerEvent, Position, RealizedPnl, RecordEventRequest, Symbol, UnrealizedPnl,
};
use crate::error::AppError;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::str::FromStr;
use uuid::Uuid;

/// POST /events
pub async fn record_event(
    State(state): State<AppState>,
    Json(request): Json<RecordEventRequest>,
) -> Result<(StatusCode, Json<LedgerEvent>), AppError> {
    let event = state.repo.record_event(request).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<i64>,
}

/// GET /portfolios/{portfolio_id}/events
pub async fn get_events(
    Path(portfolio_id): Path<Uuid>,
    Query(params): Query<EventsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<LedgerEvent>>, AppError> {
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);
    let events = state.repo.get_events(portfolio_id, limit).await?;
    Ok(Json(events))
}

/// GET /portfolios/{portfolio_id}/events/{symbol}
pub async fn get_events_by_symbol(
    Path((portfolio_id, symbol)): Path<(Uuid, String)>,
    State(state): State<AppState>,
) -> Result<Json<Vec<LedgerEvent>>, AppError> {
    let symbol = parse_symbol(&symbol)?;
    let events = state
        .repo
        .get_events_by_symbol(portfolio_id, symbol.code())
        .await?;
    Ok(Json(events))
}

/// GET /portfolios/{portfolio_id}/positions
pub async fn get_positions(
    Path(portfolio_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Position>>, AppError> {
    let positions = state.repo.get_positions(portfolio_id).await?;
    Ok(Json(positions))
}

/// GET /portfolios/{portfolio_id}/positions/{symbol}
pub async fn get_position(
    Path((portfolio_id, symbol)): Path<(Uuid, String)>,
    State(state): State<AppState>,
) -> Result<Json<Position>, AppError> {
    let symbol = parse_symbol(&symbol)?;
    let position = state
        .repo
        .get_position(portfolio_id, symbol.code())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no position for symbol {}", symbol)))?;
    Ok(Json(position))
}

#[derive(Debug, Deserialize)]
pub struct PnlQuery {
    pub current_price: Option<Decimal>,
}

/// GET /portfolios/{portfolio_id}/positions/{symbol}/pnl?current_price=X
pub async fn get_unrealized_pnl(
    Path((portfolio_id, symbol)): Path<(Uuid, String)>,
    Query(params): Query<PnlQuery>,
    State(state): State<AppState>,
) -> Result<Json<UnrealizedPnl>, AppError> {
    let symbol = parse_symbol(&symbol)?;
    let current_price = params
        .current_price
        .ok_or_else(|| AppError::Validation("current_price is required".to_string()))?;
    if current_price.is_negative() {
        return Err(AppError::Validation(
            "current_price must not be negative".to_string(),
        ));
    }

    let position = state
        .repo
        .get_position(portfolio_id, symbol.code())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no position for symbol {}", symbol)))?;

    Ok(Json(UnrealizedPnl::from_position(&position, current_price)))
}

#[derive(Debug, Deserialize)]
pub struct RealizedPnlQuery {
    pub symbol: Option<String>,
}

/// GET /portfolios/{portfolio_id}/realized-pnl
pub async fn get_realized_pnl(
    Path(portfolio_id): Path<Uuid>,
    Query(params): Query<RealizedPnlQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<RealizedPnl>>, AppError> {
    let symbol = match params.symbol.as_deref() {
        Some(raw) => Some(parse_symbol(raw)?),
        None => None,
    };
    let rows = state
        .repo
        .get_realized_pnl(portfolio_id, symbol.as_ref().map(|s| s.code()))
        .await?;
    Ok(Json(rows))
}

pub(crate) fn parse_symbol(raw: &str) -> Result<Symbol, AppError> {
    Symbol::from_str(raw).map_err(|e| AppError::Validation(format!("invalid symbol: {}", e)))
}
