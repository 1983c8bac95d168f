//! Mock exchange feed for testing without network calls.

use super::{ExchangeFeed, FeedError};
use crate::domain::{OhlcvBar, RealtimeQuote, Symbol};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Mock feed with scripted per-day snapshots and canned quotes.
///
/// Unscripted days behave like holidays (empty snapshot). Request counters
/// let tests assert how many upstream calls a flow actually made.
#[derive(Debug, Default)]
pub struct MockFeed {
    snapshots: HashMap<NaiveDate, Result<Vec<OhlcvBar>, FeedError>>,
    quotes: Vec<RealtimeQuote>,
    snapshot_calls: AtomicUsize,
    quote_calls: AtomicUsize,
}

impl MockFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful snapshot for a day.
    pub fn with_snapshot(mut self, date: NaiveDate, bars: Vec<OhlcvBar>) -> Self {
        self.snapshots.insert(date, Ok(bars));
        self
    }

    /// Script an upstream failure for a day.
    pub fn with_snapshot_error(mut self, date: NaiveDate, error: FeedError) -> Self {
        self.snapshots.insert(date, Err(error));
        self
    }

    /// Set the quotes returned for any quote request.
    pub fn with_quotes(mut self, quotes: Vec<RealtimeQuote>) -> Self {
        self.quotes = quotes;
        self
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExchangeFeed for MockFeed {
    async fn fetch_daily_snapshot(&self, date: NaiveDate) -> Result<Vec<OhlcvBar>, FeedError> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        match self.snapshots.get(&date) {
            Some(result) => result.clone(),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_quotes(&self, symbols: &[Symbol]) -> Result<Vec<RealtimeQuote>, FeedError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        let requested: Vec<&str> = symbols.iter().map(|s| s.code()).collect();
        Ok(self
            .quotes
            .iter()
            .filter(|q| requested.contains(&q.symbol.as_str()))
            .cloned()
            .collect())
    }
}
