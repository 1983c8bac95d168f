//! TWSE feed client: the MI_INDEX daily snapshot and the MIS realtime
//! quote endpoint.

use super::{ExchangeFeed, FeedError};
use crate::domain::{Decimal, OhlcvBar, OrderBook, OrderBookLevel, RealtimeQuote, Symbol};
use crate::engine::clock::current_market_status;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(30);
const QUOTE_TIMEOUT: Duration = Duration::from_secs(10);
const BATCH_QUOTE_TIMEOUT: Duration = Duration::from_secs(15);

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// TWSE data source for daily snapshots and realtime quotes.
#[derive(Debug, Clone)]
pub struct TwseFeed {
    client: Client,
    api_url: String,
    mis_url: String,
}

impl TwseFeed {
    pub fn new(api_url: String, mis_url: String) -> Self {
        Self {
            client: Client::new(),
            api_url,
            mis_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MiIndexResponse {
    stat: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    tables: Vec<MiIndexTable>,
}

#[derive(Debug, Deserialize)]
struct MiIndexTable {
    #[serde(default)]
    data: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct StockInfoResponse {
    #[serde(rename = "msgArray", default)]
    msg_array: Vec<MisQuote>,
}

/// One msgArray entry. Field names follow the upstream single-letter keys.
#[derive(Debug, Default, Deserialize)]
struct MisQuote {
    #[serde(rename = "c", default)]
    symbol: String,
    #[serde(rename = "n", default)]
    name: String,
    #[serde(rename = "z", default)]
    price: String,
    #[serde(rename = "o", default)]
    open: String,
    #[serde(rename = "h", default)]
    high: String,
    #[serde(rename = "l", default)]
    low: String,
    #[serde(rename = "y", default)]
    prev_close: String,
    #[serde(rename = "v", default)]
    volume: String,
    #[serde(rename = "tv", default)]
    turnover: String,
    #[serde(rename = "b", default)]
    bid_prices: String,
    #[serde(rename = "a", default)]
    ask_prices: String,
    #[serde(rename = "g", default)]
    bid_volumes: String,
    #[serde(rename = "f", default)]
    ask_volumes: String,
    #[serde(rename = "t", default)]
    trade_time: String,
    #[serde(rename = "u", default)]
    limit_up: String,
    #[serde(rename = "w", default)]
    limit_down: String,
}

#[async_trait]
impl ExchangeFeed for TwseFeed {
    async fn fetch_daily_snapshot(&self, date: NaiveDate) -> Result<Vec<OhlcvBar>, FeedError> {
        let url = format!(
            "{}/rwd/zh/afterTrading/MI_INDEX?response=json&date={}&type=ALL",
            self.api_url,
            date.format("%Y%m%d")
        );
        debug!(%url, "fetching daily snapshot");

        let response = self
            .client
            .get(&url)
            .timeout(SNAPSHOT_TIMEOUT)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json")
            .header("Accept-Language", "zh-TW,zh;q=0.9,en;q=0.8")
            .send()
            .await
            .map_err(|e| FeedError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Http {
                status: status.as_u16(),
                message: "snapshot request failed".to_string(),
            });
        }

        let body: MiIndexResponse = response
            .json()
            .await
            .map_err(|e| FeedError::Parse(e.to_string()))?;

        // A non-OK stat is how the exchange reports a non-trading day.
        if body.stat != "OK" {
            return Ok(Vec::new());
        }

        let snapshot_date =
            NaiveDate::parse_from_str(&body.date, "%Y%m%d").unwrap_or(date);

        Ok(parse_snapshot_tables(&body.tables, snapshot_date))
    }

    async fn fetch_quotes(&self, symbols: &[Symbol]) -> Result<Vec<RealtimeQuote>, FeedError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let ex_ch: Vec<String> = symbols.iter().map(|s| s.ex_ch()).collect();
        let url = format!(
            "{}/stock/api/getStockInfo.jsp?ex_ch={}",
            self.mis_url,
            ex_ch.join("|")
        );
        let timeout = if symbols.len() > 1 {
            BATCH_QUOTE_TIMEOUT
        } else {
            QUOTE_TIMEOUT
        };
        debug!(%url, "fetching realtime quotes");

        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json")
            .header("Referer", "https://mis.twse.com.tw/stock/fibest.jsp")
            .send()
            .await
            .map_err(|e| FeedError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Http {
                status: status.as_u16(),
                message: "quote request failed".to_string(),
            });
        }

        let body: StockInfoResponse = response
            .json()
            .await
            .map_err(|e| FeedError::Parse(e.to_string()))?;

        let is_open = current_market_status().is_open;
        let quotes = body
            .msg_array
            .iter()
            .filter_map(|msg| parse_quote(msg, is_open))
            .collect();

        Ok(quotes)
    }
}

fn parse_snapshot_tables(tables: &[MiIndexTable], date: NaiveDate) -> Vec<OhlcvBar> {
    // The snapshot table is the one with the most rows; the response also
    // carries small index-summary tables we do not care about.
    let Some(table) = tables.iter().max_by_key(|t| t.data.len()) else {
        return Vec::new();
    };

    let mut bars = Vec::with_capacity(table.data.len());
    for row in &table.data {
        if let Some(bar) = parse_snapshot_row(row, date) {
            bars.push(bar);
        }
    }
    bars
}

/// Parse one positional snapshot row.
///
/// Columns: 0 symbol, 2 volume (shares), 4 turnover, 5-8 open/high/low/close.
/// Rows with unparsable prices or with no trade (open and close both zero)
/// are skipped rather than failing the day.
fn parse_snapshot_row(row: &[String], date: NaiveDate) -> Option<OhlcvBar> {
    if row.len() < 9 {
        return None;
    }

    let symbol = row[0].trim();
    if symbol.is_empty() {
        return None;
    }

    let open = clean_decimal(&row[5])?;
    let high = clean_decimal(&row[6])?;
    let low = clean_decimal(&row[7])?;
    let close = clean_decimal(&row[8])?;

    if open.is_zero() && close.is_zero() {
        return None;
    }

    let volume = clean_integer(&row[2]).unwrap_or(0);
    let turnover = clean_decimal(&row[4]).unwrap_or_else(Decimal::zero);

    let bar = OhlcvBar {
        symbol: symbol.to_string(),
        date,
        open,
        high,
        low,
        close,
        volume,
        turnover,
    };

    if !bar.is_consistent() {
        warn!(symbol = %bar.symbol, %date, "dropping inconsistent snapshot row");
        return None;
    }

    Some(bar)
}

fn parse_quote(msg: &MisQuote, is_open: bool) -> Option<RealtimeQuote> {
    if msg.symbol.is_empty() {
        return None;
    }

    let price = quote_decimal(&msg.price).unwrap_or_else(Decimal::zero);
    let prev_close = quote_decimal(&msg.prev_close).unwrap_or_else(Decimal::zero);

    let (change, change_percent) = if !price.is_zero() && !prev_close.is_zero() {
        let change = price - prev_close;
        let pct = (change / prev_close * Decimal::hundred()).round_dp(2);
        (change, pct)
    } else {
        (Decimal::zero(), Decimal::zero())
    };

    // Upstream volume is in lots of 1000 shares.
    let volume = quote_integer(&msg.volume).map(|v| v * 1000).unwrap_or(0);

    let bid_price = first_level_price(&msg.bid_prices).unwrap_or_else(Decimal::zero);
    let ask_price = first_level_price(&msg.ask_prices).unwrap_or_else(Decimal::zero);

    Some(RealtimeQuote {
        symbol: msg.symbol.clone(),
        name: msg.name.clone(),
        price,
        change,
        change_percent,
        open: quote_decimal(&msg.open).unwrap_or_else(Decimal::zero),
        high: quote_decimal(&msg.high).unwrap_or_else(Decimal::zero),
        low: quote_decimal(&msg.low).unwrap_or_else(Decimal::zero),
        prev_close,
        volume,
        turnover: quote_decimal(&msg.turnover).unwrap_or_else(Decimal::zero),
        bid_price,
        ask_price,
        trade_time: if msg.trade_time.is_empty() || msg.trade_time == "-" {
            None
        } else {
            Some(msg.trade_time.clone())
        },
        is_open,
        limit_up: quote_decimal(&msg.limit_up).unwrap_or_else(Decimal::zero),
        limit_down: quote_decimal(&msg.limit_down).unwrap_or_else(Decimal::zero),
        updated_at: Utc::now(),
        order_book: parse_order_book(
            &msg.bid_prices,
            &msg.ask_prices,
            &msg.bid_volumes,
            &msg.ask_volumes,
        ),
    })
}

/// Parse the 5-level order book from `_`-separated parallel price/volume
/// lists. Levels whose price or volume does not parse are skipped. Returns
/// None when both sides come out empty.
pub fn parse_order_book(
    bid_prices: &str,
    ask_prices: &str,
    bid_volumes: &str,
    ask_volumes: &str,
) -> Option<OrderBook> {
    let mut book = OrderBook {
        bids: parse_book_side(bid_prices, bid_volumes),
        asks: parse_book_side(ask_prices, ask_volumes),
    };

    if book.bids.is_empty() && book.asks.is_empty() {
        return None;
    }

    // The upstream is expected to emit best-first; verify rather than trust.
    book.bids.sort_by(|a, b| b.price.cmp(&a.price));
    book.asks.sort_by(|a, b| a.price.cmp(&b.price));

    Some(book)
}

fn parse_book_side(prices: &str, volumes: &str) -> Vec<OrderBookLevel> {
    if is_sentinel(prices) || is_sentinel(volumes) {
        return Vec::new();
    }

    let prices: Vec<&str> = prices.split('_').collect();
    let volumes: Vec<&str> = volumes.split('_').collect();

    prices
        .iter()
        .zip(volumes.iter())
        .take(5)
        .filter_map(|(p, v)| {
            if p.is_empty() || v.is_empty() {
                return None;
            }
            let price = Decimal::from_str_canonical(p).ok()?;
            let volume = v.parse::<i64>().ok()?;
            Some(OrderBookLevel { price, volume })
        })
        .collect()
}

fn is_sentinel(s: &str) -> bool {
    s.is_empty() || s == "-"
}

/// First entry of a `_`-separated price list, if present and parseable.
fn first_level_price(prices: &str) -> Option<Decimal> {
    if is_sentinel(prices) {
        return None;
    }
    let first = prices.split('_').next()?;
    if first.is_empty() {
        return None;
    }
    Decimal::from_str_canonical(first).ok()
}

/// Parse a snapshot decimal: commas stripped, `--`/`---` treated as no value.
fn clean_decimal(s: &str) -> Option<Decimal> {
    let cleaned = s.trim().replace(',', "");
    if cleaned.is_empty() || cleaned == "--" || cleaned == "---" {
        return None;
    }
    Decimal::from_str_canonical(&cleaned).ok()
}

fn clean_integer(s: &str) -> Option<i64> {
    let cleaned = s.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<i64>().ok()
}

/// Parse a quote decimal: `-` means no value.
fn quote_decimal(s: &str) -> Option<Decimal> {
    if is_sentinel(s) {
        return None;
    }
    Decimal::from_str_canonical(s).ok()
}

fn quote_integer(s: &str) -> Option<i64> {
    if is_sentinel(s) {
        return None;
    }
    s.parse::<i64>().ok()
}
