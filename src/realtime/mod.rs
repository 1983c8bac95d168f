//! Realtime quote service: upstream quote fetches, the subscriber fabric
//! and the periodic broadcaster.
//!
//! The service owns the subscriber set; each client owns its sink. Delivery
//! is non-blocking: a sink whose buffer is full misses that update rather
//! than stalling the broadcaster.

pub mod push;

pub use push::{ClientAction, ClientRequest, PushEnvelope};

use crate::datasource::ExchangeFeed;
use crate::domain::{MarketStatus, RealtimeQuote, Symbol};
use crate::engine::clock::current_market_status;
use crate::error::AppError;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Batch endpoint cap; the broadcaster partitions larger sets by this.
pub const MAX_BATCH_SYMBOLS: usize = 20;

/// Identifies one registered push sink (one client connection).
pub type SinkId = u64;

#[derive(Default)]
struct Fabric {
    sinks: HashMap<SinkId, mpsc::Sender<PushEnvelope>>,
    subscriptions: HashMap<String, SymbolSubscribers>,
}

struct SymbolSubscribers {
    symbol: Symbol,
    sinks: HashSet<SinkId>,
}

pub struct RealtimeService {
    feed: Arc<dyn ExchangeFeed>,
    fabric: RwLock<Fabric>,
    next_sink_id: AtomicU64,
    broadcast_interval: Duration,
    broadcaster: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeService {
    pub fn new(feed: Arc<dyn ExchangeFeed>, broadcast_interval: Duration) -> Self {
        Self {
            feed,
            fabric: RwLock::new(Fabric::default()),
            next_sink_id: AtomicU64::new(1),
            broadcast_interval,
            broadcaster: Mutex::new(None),
        }
    }

    // =========================================================================
    // Quotes
    // =========================================================================

    /// Market status derived from the wall clock.
    pub fn market_status(&self) -> MarketStatus {
        current_market_status()
    }

    /// One quote, one upstream round-trip.
    pub async fn get_quote(&self, symbol: &Symbol) -> Result<RealtimeQuote, AppError> {
        let quotes = self.feed.fetch_quotes(std::slice::from_ref(symbol)).await?;
        quotes
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("no quote for symbol {}", symbol)))
    }

    /// Quotes for up to [`MAX_BATCH_SYMBOLS`] symbols in one round-trip;
    /// symbols beyond the cap are dropped.
    pub async fn get_batch_quotes(
        &self,
        symbols: &[Symbol],
    ) -> Result<Vec<RealtimeQuote>, AppError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let capped = &symbols[..symbols.len().min(MAX_BATCH_SYMBOLS)];
        Ok(self.feed.fetch_quotes(capped).await?)
    }

    // =========================================================================
    // Subscriber fabric
    // =========================================================================

    /// Register a client sink and return its id.
    pub async fn register_sink(&self, sender: mpsc::Sender<PushEnvelope>) -> SinkId {
        let id = self.next_sink_id.fetch_add(1, Ordering::SeqCst);
        self.fabric.write().await.sinks.insert(id, sender);
        id
    }

    /// Remove a sink from the registry and from every symbol.
    pub async fn drop_sink(&self, id: SinkId) {
        let mut fabric = self.fabric.write().await;
        fabric.sinks.remove(&id);
        fabric.subscriptions.retain(|_, entry| {
            entry.sinks.remove(&id);
            !entry.sinks.is_empty()
        });
    }

    pub async fn subscribe(&self, id: SinkId, symbol: &Symbol) {
        let mut fabric = self.fabric.write().await;
        fabric
            .subscriptions
            .entry(symbol.code().to_string())
            .or_insert_with(|| SymbolSubscribers {
                symbol: symbol.clone(),
                sinks: HashSet::new(),
            })
            .sinks
            .insert(id);
    }

    pub async fn unsubscribe(&self, id: SinkId, symbol: &Symbol) {
        let mut fabric = self.fabric.write().await;
        if let Some(entry) = fabric.subscriptions.get_mut(symbol.code()) {
            entry.sinks.remove(&id);
            if entry.sinks.is_empty() {
                fabric.subscriptions.remove(symbol.code());
            }
        }
    }

    /// Union of symbols with at least one subscriber.
    pub async fn subscribed_symbols(&self) -> Vec<Symbol> {
        let fabric = self.fabric.read().await;
        fabric
            .subscriptions
            .values()
            .map(|entry| entry.symbol.clone())
            .collect()
    }

    /// Deliver a quote to every sink of its symbol, non-blockingly. Sinks
    /// with a full buffer miss the update.
    pub async fn broadcast(&self, quote: &RealtimeQuote) {
        let fabric = self.fabric.read().await;
        let Some(entry) = fabric.subscriptions.get(&quote.symbol) else {
            return;
        };
        for sink_id in &entry.sinks {
            if let Some(sender) = fabric.sinks.get(sink_id) {
                if sender
                    .try_send(PushEnvelope::Quote {
                        data: quote.clone(),
                    })
                    .is_err()
                {
                    debug!(sink = sink_id, symbol = %quote.symbol, "slow sink, dropping quote");
                }
            }
        }
    }

    // =========================================================================
    // Periodic broadcaster
    // =========================================================================

    /// Spawn the periodic broadcaster. Idempotent; the task lives until
    /// [`shutdown`](Self::shutdown).
    pub async fn start_broadcaster(self: Arc<Self>) {
        let mut guard = self.broadcaster.lock().await;
        if guard.is_some() {
            return;
        }

        let service = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(service.broadcast_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                service.broadcast_cycle().await;
            }
        });
        *guard = Some(handle);
    }

    /// Stop the broadcaster task.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.broadcaster.lock().await.take() {
            handle.abort();
        }
    }

    /// One broadcast cycle: union the subscriptions, fetch quotes in
    /// batch-capped chunks, then deliver a status envelope to every sink
    /// followed by each symbol's quote to its subscribers. Upstream errors
    /// are logged; the next cycle retries implicitly.
    pub async fn broadcast_cycle(&self) {
        let symbols = self.subscribed_symbols().await;
        if symbols.is_empty() {
            return;
        }

        let mut quotes: Vec<RealtimeQuote> = Vec::new();
        for chunk in symbols.chunks(MAX_BATCH_SYMBOLS) {
            match self.feed.fetch_quotes(chunk).await {
                Ok(batch) => quotes.extend(batch),
                Err(e) => {
                    warn!(error = %e, "broadcast quote fetch failed");
                    return;
                }
            }
        }

        let status = self.market_status();
        {
            let fabric = self.fabric.read().await;
            for (sink_id, sender) in &fabric.sinks {
                if sender
                    .try_send(PushEnvelope::Status {
                        data: status.clone(),
                    })
                    .is_err()
                {
                    debug!(sink = sink_id, "slow sink, dropping status");
                }
            }
        }

        for quote in &quotes {
            self.broadcast(quote).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::MockFeed;
    use crate::domain::Decimal;
    use chrono::Utc;
    use std::str::FromStr;

    fn quote(symbol: &str, price: &str) -> RealtimeQuote {
        RealtimeQuote {
            symbol: symbol.to_string(),
            name: String::new(),
            price: Decimal::from_str(price).unwrap(),
            change: Decimal::zero(),
            change_percent: Decimal::zero(),
            open: Decimal::zero(),
            high: Decimal::zero(),
            low: Decimal::zero(),
            prev_close: Decimal::zero(),
            volume: 0,
            turnover: Decimal::zero(),
            bid_price: Decimal::zero(),
            ask_price: Decimal::zero(),
            trade_time: None,
            is_open: false,
            limit_up: Decimal::zero(),
            limit_down: Decimal::zero(),
            updated_at: Utc::now(),
            order_book: None,
        }
    }

    fn symbol(code: &str) -> Symbol {
        Symbol::from_str(code).unwrap()
    }

    fn service(feed: MockFeed) -> Arc<RealtimeService> {
        Arc::new(RealtimeService::new(
            Arc::new(feed),
            Duration::from_secs(5),
        ))
    }

    #[tokio::test]
    async fn test_subscribe_unsubscribe_union() {
        let svc = service(MockFeed::new());
        let (tx, _rx) = mpsc::channel(8);
        let sink = svc.register_sink(tx).await;

        svc.subscribe(sink, &symbol("2330")).await;
        svc.subscribe(sink, &symbol("2317")).await;

        let mut subscribed: Vec<String> = svc
            .subscribed_symbols()
            .await
            .iter()
            .map(|s| s.code().to_string())
            .collect();
        subscribed.sort();
        assert_eq!(subscribed, vec!["2317", "2330"]);

        svc.unsubscribe(sink, &symbol("2330")).await;
        let subscribed = svc.subscribed_symbols().await;
        assert_eq!(subscribed.len(), 1);
        assert_eq!(subscribed[0].code(), "2317");
    }

    #[tokio::test]
    async fn test_broadcast_reaches_only_symbol_subscribers() {
        let svc = service(MockFeed::new());
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let sink_a = svc.register_sink(tx_a).await;
        let sink_b = svc.register_sink(tx_b).await;

        svc.subscribe(sink_a, &symbol("2330")).await;
        svc.subscribe(sink_b, &symbol("2317")).await;

        svc.broadcast(&quote("2330", "585")).await;

        let env = rx_a.try_recv().expect("subscriber should receive quote");
        assert!(matches!(env, PushEnvelope::Quote { data } if data.symbol == "2330"));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_slow_sink_never_blocks_broadcast() {
        let svc = service(MockFeed::new());
        let (tx, mut rx) = mpsc::channel(1);
        let sink = svc.register_sink(tx).await;
        svc.subscribe(sink, &symbol("2330")).await;

        // Fill the buffer, then broadcast twice more; both drops are silent.
        svc.broadcast(&quote("2330", "585")).await;
        svc.broadcast(&quote("2330", "586")).await;
        svc.broadcast(&quote("2330", "587")).await;

        let env = rx.try_recv().unwrap();
        assert!(matches!(env, PushEnvelope::Quote { data } if data.price == Decimal::from_str("585").unwrap()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_drop_sink_removes_all_subscriptions() {
        let svc = service(MockFeed::new());
        let (tx, _rx) = mpsc::channel(8);
        let sink = svc.register_sink(tx).await;
        svc.subscribe(sink, &symbol("2330")).await;
        svc.subscribe(sink, &symbol("2317")).await;

        svc.drop_sink(sink).await;
        assert!(svc.subscribed_symbols().await.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_cycle_delivers_status_then_quote() {
        let feed = MockFeed::new().with_quotes(vec![quote("2330", "585")]);
        let svc = service(feed);
        let (tx, mut rx) = mpsc::channel(8);
        let sink = svc.register_sink(tx).await;
        svc.subscribe(sink, &symbol("2330")).await;

        svc.broadcast_cycle().await;

        let first = rx.try_recv().unwrap();
        assert!(matches!(first, PushEnvelope::Status { .. }));
        let second = rx.try_recv().unwrap();
        assert!(matches!(second, PushEnvelope::Quote { data } if data.symbol == "2330"));
    }

    #[tokio::test]
    async fn test_broadcast_cycle_noop_without_subscriptions() {
        let feed = MockFeed::new().with_quotes(vec![quote("2330", "585")]);
        let svc = service(feed);
        let (tx, mut rx) = mpsc::channel(8);
        let _sink = svc.register_sink(tx).await;

        svc.broadcast_cycle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribed_sink_still_gets_status_in_cycle() {
        let feed = MockFeed::new().with_quotes(vec![quote("2330", "585")]);
        let svc = service(feed);

        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let sink_a = svc.register_sink(tx_a).await;
        let sink_b = svc.register_sink(tx_b).await;
        svc.subscribe(sink_a, &symbol("2330")).await;
        svc.subscribe(sink_b, &symbol("2330")).await;

        svc.unsubscribe(sink_b, &symbol("2330")).await;
        svc.broadcast_cycle().await;

        // Subscriber gets status + quote; the unsubscribed sink only status.
        assert!(matches!(rx_a.try_recv().unwrap(), PushEnvelope::Status { .. }));
        assert!(matches!(rx_a.try_recv().unwrap(), PushEnvelope::Quote { .. }));
        assert!(matches!(rx_b.try_recv().unwrap(), PushEnvelope::Status { .. }));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_batch_quotes_caps_at_twenty() {
        let quotes: Vec<RealtimeQuote> = (0..21)
            .map(|i| quote(&format!("{:04}", 1000 + i), "100"))
            .collect();
        let feed = MockFeed::new().with_quotes(quotes);
        let svc = service(feed);

        let symbols: Vec<Symbol> = (0..21)
            .map(|i| symbol(&format!("{:04}", 1000 + i)))
            .collect();
        let result = svc.get_batch_quotes(&symbols).await.unwrap();
        assert_eq!(result.len(), 20);
    }
}
