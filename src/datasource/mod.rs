//! Exchange feed abstraction for daily snapshots and realtime quotes.

use crate::domain::{OhlcvBar, RealtimeQuote, Symbol};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

pub mod mock;
pub mod twse;

pub use mock::MockFeed;
pub use twse::TwseFeed;

/// Upstream exchange feed.
///
/// Implementations carry per-call timeouts; callers decide retry policy
/// (the bulk worker records failed days and moves on, the broadcaster
/// simply waits for its next cycle).
#[async_trait]
pub trait ExchangeFeed: Send + Sync + fmt::Debug {
    /// Fetch the exchange-wide snapshot for one trading day.
    ///
    /// An empty vector means the exchange reported no trading for the day
    /// (holiday); errors are transport or parse failures.
    async fn fetch_daily_snapshot(&self, date: NaiveDate) -> Result<Vec<OhlcvBar>, FeedError>;

    /// Fetch realtime quotes for up to 20 symbols in one round-trip.
    async fn fetch_quotes(&self, symbols: &[Symbol]) -> Result<Vec<RealtimeQuote>, FeedError>;
}

/// Error type for feed operations.
#[derive(Debug, Clone, Error)]
pub enum FeedError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("no data for {0}")]
    NoData(String),
}
