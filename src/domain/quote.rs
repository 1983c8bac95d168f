//! Realtime quote, 5-level order book and market-hours status.

use crate::domain::Decimal;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// A single price level in the order book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: Decimal,
    pub volume: i64,
}

/// Best five bid and ask levels.
///
/// Bids are ordered best (highest price) first; asks best (lowest) first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
}

/// Ephemeral realtime quote, rebuilt from upstream on each poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeQuote {
    pub symbol: String,
    pub name: String,
    pub price: Decimal,
    pub change: Decimal,
    pub change_percent: Decimal,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub prev_close: Decimal,
    /// Shares, converted from upstream lots of 1000.
    pub volume: i64,
    pub turnover: Decimal,
    pub bid_price: Decimal,
    pub ask_price: Decimal,
    /// Upstream trade time, "HH:MM:SS" in exchange local time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_time: Option<String>,
    pub is_open: bool,
    pub limit_up: Decimal,
    pub limit_down: Decimal,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_book: Option<OrderBook>,
}

/// Market-hours state derived from the wall clock. Holidays are not a
/// clock state; they are inferred from empty ingestion snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketState {
    PreMarket,
    Open,
    AfterHours,
    Closed,
}

/// Snapshot of the market clock, recomputed on every request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketStatus {
    pub is_open: bool,
    pub status: MarketState,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_open_time: Option<DateTime<Tz>>,
    pub server_time: DateTime<Tz>,
}
