//! HTTP surface: router assembly and shared handler state.

pub mod bulk_sync;
pub mod events;
pub mod health;
pub mod indicators;
pub mod market;
pub mod portfolios;
pub mod realtime;
pub mod ws;

use crate::analysis::IndicatorService;
use crate::db::Repository;
use crate::realtime::RealtimeService;
use crate::sync::BulkSyncWorker;
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub realtime: Arc<RealtimeService>,
    pub bulk_sync: Arc<BulkSyncWorker>,
    pub indicators: Arc<IndicatorService>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        // Event log
        .route("/events", post(events::record_event))
        .route("/portfolios", get(portfolios::list_portfolios))
        .route("/portfolios", post(portfolios::create_portfolio))
        .route("/portfolios/{portfolio_id}", get(portfolios::get_portfolio))
        .route("/portfolios/{portfolio_id}/events", get(events::get_events))
        .route(
            "/portfolios/{portfolio_id}/events/{symbol}",
            get(events::get_events_by_symbol),
        )
        .route(
            "/portfolios/{portfolio_id}/positions",
            get(events::get_positions),
        )
        .route(
            "/portfolios/{portfolio_id}/positions/{symbol}",
            get(events::get_position),
        )
        .route(
            "/portfolios/{portfolio_id}/positions/{symbol}/pnl",
            get(events::get_unrealized_pnl),
        )
        .route(
            "/portfolios/{portfolio_id}/realized-pnl",
            get(events::get_realized_pnl),
        )
        // Market data
        .route("/stocks/{symbol}/ohlcv", get(market::get_ohlcv))
        .route(
            "/market/refresh-aggregates",
            post(market::refresh_aggregates),
        )
        // Bulk sync control
        .route("/market/bulk-sync/status", get(bulk_sync::get_status))
        .route("/market/bulk-sync/info", get(bulk_sync::get_info))
        .route("/market/bulk-sync/start", post(bulk_sync::start))
        .route("/market/bulk-sync/stop", post(bulk_sync::stop))
        // Indicators
        .route("/indicators/{symbol}/ma", get(indicators::get_ma))
        .route("/indicators/{symbol}/rsi", get(indicators::get_rsi))
        .route("/indicators/{symbol}/macd", get(indicators::get_macd))
        .route("/indicators/{symbol}/bb", get(indicators::get_bollinger))
        .route("/indicators/{symbol}/kdj", get(indicators::get_kdj))
        .route("/indicators/{symbol}/batch", post(indicators::get_batch))
        .route(
            "/indicators/{symbol}/cache",
            delete(indicators::clear_cache),
        )
        // Realtime
        .route("/market/status", get(realtime::get_market_status))
        .route("/realtime/{symbol}", get(realtime::get_quote))
        .route("/realtime", get(realtime::get_batch_quotes))
        .route("/ws/realtime", get(ws::realtime_ws))
        .with_state(state)
}
