//! Indicator service: reads the bar history, runs the engine math and
//! caches full series under (symbol, indicator, normalized params) keys.
//!
//! Storage is newest-first; computation is chronological. The cache holds
//! the FULL computed series; `limit` is served by tail-slicing.

use crate::db::Repository;
use crate::domain::{Decimal, OhlcvBar, Symbol, Timeframe};
use crate::engine::indicators;
use crate::error::AppError;
use chrono::{Duration, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

/// How many daily bars feed a computation. Enough history for any
/// supported parameter range.
const HISTORY_DEPTH: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaType {
    #[default]
    Sma,
    Ema,
}

impl fmt::Display for MaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaType::Sma => write!(f, "SMA"),
            MaType::Ema => write!(f, "EMA"),
        }
    }
}

impl FromStr for MaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SMA" => Ok(MaType::Sma),
            "EMA" => Ok(MaType::Ema),
            other => Err(format!("unknown MA type: {} (expected SMA or EMA)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaPoint {
    pub timestamp: NaiveDate,
    pub value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsiPoint {
    pub timestamp: NaiveDate,
    pub value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdPoint {
    pub timestamp: NaiveDate,
    pub macd: Decimal,
    pub signal: Decimal,
    pub histogram: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BollingerPoint {
    pub timestamp: NaiveDate,
    pub upper: Decimal,
    pub middle: Decimal,
    pub lower: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KdjPoint {
    pub timestamp: NaiveDate,
    pub k: Decimal,
    pub d: Decimal,
    pub j: Decimal,
}

pub struct IndicatorService {
    repo: Arc<Repository>,
    cache_ttl: Duration,
}

impl IndicatorService {
    pub fn new(repo: Arc<Repository>, cache_ttl_secs: i64) -> Self {
        Self {
            repo,
            cache_ttl: Duration::seconds(cache_ttl_secs),
        }
    }

    /// Moving average (SMA or EMA), period 2-200.
    pub async fn ma(
        &self,
        symbol: &Symbol,
        period: usize,
        ma_type: MaType,
        limit: usize,
    ) -> Result<Vec<MaPoint>, AppError> {
        if !(2..=200).contains(&period) {
            return Err(AppError::Validation(
                "MA period must be between 2 and 200".to_string(),
            ));
        }

        let key = format!("MA:{}:{}", ma_type, period);
        if let Some(cached) = self.cached::<MaPoint>(symbol, "MA", &key).await? {
            return Ok(tail(cached, limit));
        }

        let bars = self.load_history(symbol, period).await?;
        let closes = closes(&bars);
        let values = match ma_type {
            MaType::Sma => indicators::sma(&closes, period),
            MaType::Ema => indicators::ema(&closes, period),
        };

        let points: Vec<MaPoint> = bars
            .iter()
            .zip(values.iter())
            .filter_map(|(bar, v)| {
                Decimal::from_f64(*v).map(|value| MaPoint {
                    timestamp: bar.date,
                    value,
                })
            })
            .collect();

        self.store(symbol, "MA", &key, &points).await;
        Ok(tail(points, limit))
    }

    /// RSI with Wilder smoothing, period 2-100.
    pub async fn rsi(
        &self,
        symbol: &Symbol,
        period: usize,
        limit: usize,
    ) -> Result<Vec<RsiPoint>, AppError> {
        if !(2..=100).contains(&period) {
            return Err(AppError::Validation(
                "RSI period must be between 2 and 100".to_string(),
            ));
        }

        let key = format!("RSI:{}", period);
        if let Some(cached) = self.cached::<RsiPoint>(symbol, "RSI", &key).await? {
            return Ok(tail(cached, limit));
        }

        let bars = self.load_history(symbol, period).await?;
        let values = indicators::rsi(&closes(&bars), period);

        let points: Vec<RsiPoint> = bars
            .iter()
            .zip(values.iter())
            .filter_map(|(bar, v)| {
                Decimal::from_f64(*v).map(|value| RsiPoint {
                    timestamp: bar.date,
                    value,
                })
            })
            .collect();

        self.store(symbol, "RSI", &key, &points).await;
        Ok(tail(points, limit))
    }

    /// MACD; needs at least `slow` bars.
    pub async fn macd(
        &self,
        symbol: &Symbol,
        fast: usize,
        slow: usize,
        signal: usize,
        limit: usize,
    ) -> Result<Vec<MacdPoint>, AppError> {
        if fast == 0 || slow == 0 || signal == 0 {
            return Err(AppError::Validation(
                "MACD periods must be positive".to_string(),
            ));
        }
        if fast >= slow {
            return Err(AppError::Validation(
                "MACD fast period must be shorter than slow".to_string(),
            ));
        }

        let key = format!("MACD:{}:{}:{}", fast, slow, signal);
        if let Some(cached) = self.cached::<MacdPoint>(symbol, "MACD", &key).await? {
            return Ok(tail(cached, limit));
        }

        let bars = self.load_history(symbol, slow).await?;
        let (macd_line, signal_line, histogram) = indicators::macd(&closes(&bars), fast, slow, signal);

        let points: Vec<MacdPoint> = bars
            .iter()
            .enumerate()
            .filter_map(|(i, bar)| {
                let macd = Decimal::from_f64(macd_line[i])?;
                let signal = Decimal::from_f64(signal_line[i])?;
                let histogram = Decimal::from_f64(histogram[i])?;
                Some(MacdPoint {
                    timestamp: bar.date,
                    macd,
                    signal,
                    histogram,
                })
            })
            .collect();

        self.store(symbol, "MACD", &key, &points).await;
        Ok(tail(points, limit))
    }

    /// Bollinger Bands with population stddev.
    pub async fn bollinger(
        &self,
        symbol: &Symbol,
        period: usize,
        stddev: f64,
        limit: usize,
    ) -> Result<Vec<BollingerPoint>, AppError> {
        if !(2..=200).contains(&period) {
            return Err(AppError::Validation(
                "Bollinger period must be between 2 and 200".to_string(),
            ));
        }
        if !stddev.is_finite() || stddev <= 0.0 {
            return Err(AppError::Validation(
                "Bollinger stddev must be positive".to_string(),
            ));
        }

        let key = format!("BB:{}:{:.1}", period, stddev);
        if let Some(cached) = self.cached::<BollingerPoint>(symbol, "BB", &key).await? {
            return Ok(tail(cached, limit));
        }

        let bars = self.load_history(symbol, period).await?;
        let (upper, middle, lower) = indicators::bollinger(&closes(&bars), period, stddev);

        let points: Vec<BollingerPoint> = bars
            .iter()
            .enumerate()
            .filter_map(|(i, bar)| {
                Some(BollingerPoint {
                    timestamp: bar.date,
                    upper: Decimal::from_f64(upper[i])?,
                    middle: Decimal::from_f64(middle[i])?,
                    lower: Decimal::from_f64(lower[i])?,
                })
            })
            .collect();

        self.store(symbol, "BB", &key, &points).await;
        Ok(tail(points, limit))
    }

    /// KDJ (stochastic 3/3 smoothing, J = 3K - 2D).
    pub async fn kdj(
        &self,
        symbol: &Symbol,
        period: usize,
        limit: usize,
    ) -> Result<Vec<KdjPoint>, AppError> {
        if !(2..=100).contains(&period) {
            return Err(AppError::Validation(
                "KDJ period must be between 2 and 100".to_string(),
            ));
        }

        let key = format!("KDJ:{}", period);
        if let Some(cached) = self.cached::<KdjPoint>(symbol, "KDJ", &key).await? {
            return Ok(tail(cached, limit));
        }

        let bars = self.load_history(symbol, period).await?;
        let high: Vec<f64> = bars.iter().map(|b| b.high.to_f64()).collect();
        let low: Vec<f64> = bars.iter().map(|b| b.low.to_f64()).collect();
        let close: Vec<f64> = bars.iter().map(|b| b.close.to_f64()).collect();
        let (k, d, j) = indicators::kdj(&high, &low, &close, period);

        let points: Vec<KdjPoint> = bars
            .iter()
            .enumerate()
            .filter_map(|(i, bar)| {
                Some(KdjPoint {
                    timestamp: bar.date,
                    k: Decimal::from_f64(k[i])?,
                    d: Decimal::from_f64(d[i])?,
                    j: Decimal::from_f64(j[i])?,
                })
            })
            .collect();

        self.store(symbol, "KDJ", &key, &points).await;
        Ok(tail(points, limit))
    }

    /// Drop every cached series for a symbol. Writes to the underlying bars
    /// do not invalidate automatically; this is the explicit lever.
    pub async fn clear(&self, symbol: &Symbol) -> Result<u64, AppError> {
        Ok(self.repo.clear_cached_indicators(symbol.code()).await?)
    }

    /// Daily bars in chronological order, erroring when fewer than
    /// `min_points` exist.
    async fn load_history(
        &self,
        symbol: &Symbol,
        min_points: usize,
    ) -> Result<Vec<OhlcvBar>, AppError> {
        let mut bars = self
            .repo
            .get_bars(symbol.code(), Timeframe::Daily, None, None, HISTORY_DEPTH)
            .await?;
        bars.reverse();

        if bars.len() < min_points {
            return Err(AppError::InsufficientData(format!(
                "insufficient data for {}: need {}, got {}",
                symbol,
                min_points,
                bars.len()
            )));
        }
        Ok(bars)
    }

    async fn cached<T: DeserializeOwned>(
        &self,
        symbol: &Symbol,
        indicator: &str,
        key: &str,
    ) -> Result<Option<Vec<T>>, AppError> {
        let Some(data) = self
            .repo
            .get_cached_indicator(symbol.code(), indicator, key, Utc::now())
            .await?
        else {
            return Ok(None);
        };

        match serde_json::from_str(&data) {
            Ok(points) => Ok(Some(points)),
            Err(e) => {
                warn!(symbol = %symbol, key, error = %e, "discarding unreadable cache entry");
                Ok(None)
            }
        }
    }

    /// Best-effort cache write; a failure costs a recompute, never the
    /// response.
    async fn store<T: Serialize>(&self, symbol: &Symbol, indicator: &str, key: &str, points: &[T]) {
        let Ok(data) = serde_json::to_string(points) else {
            return;
        };
        let now = Utc::now();
        if let Err(e) = self
            .repo
            .put_cached_indicator(symbol.code(), indicator, key, &data, now, now + self.cache_ttl)
            .await
        {
            warn!(symbol = %symbol, key, error = %e, "failed to write indicator cache");
        }
    }
}

fn closes(bars: &[OhlcvBar]) -> Vec<f64> {
    bars.iter().map(|b| b.close.to_f64()).collect()
}

fn tail<T>(points: Vec<T>, limit: usize) -> Vec<T> {
    if points.len() > limit {
        let skip = points.len() - limit;
        points.into_iter().skip(skip).collect()
    } else {
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use tempfile::TempDir;

    async fn setup(symbol: &str, closes: &[f64]) -> (IndicatorService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        let repo = Arc::new(Repository::new(pool));

        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars: Vec<OhlcvBar> = closes
            .iter()
            .enumerate()
            .map(|(i, close)| {
                let close = Decimal::from_f64(*close).unwrap();
                OhlcvBar {
                    symbol: symbol.to_string(),
                    date: start + Duration::days(i as i64),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1000,
                    turnover: Decimal::zero(),
                }
            })
            .collect();
        repo.upsert_bars(&bars).await.unwrap();

        (IndicatorService::new(repo, 86_400), temp_dir)
    }

    fn sym(code: &str) -> Symbol {
        Symbol::from_str(code).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[tokio::test]
    async fn test_sma_exact_period_single_point() {
        let closes: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        let (svc, _temp) = setup("2330", &closes).await;

        let points = svc.ma(&sym("2330"), 20, MaType::Sma, 1).await.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, dec("10.5"));
    }

    #[tokio::test]
    async fn test_ma_limit_tail_slices_ascending() {
        let closes: Vec<f64> = (1..=30).map(|i| i as f64).collect();
        let (svc, _temp) = setup("2330", &closes).await;

        let points = svc.ma(&sym("2330"), 5, MaType::Sma, 3).await.unwrap();
        assert_eq!(points.len(), 3);
        // Timestamps strictly increase and are the latest three.
        assert!(points.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(
            points[2].timestamp,
            NaiveDate::from_ymd_opt(2024, 1, 30).unwrap()
        );
        assert_eq!(points[2].value, dec("28"));
    }

    #[tokio::test]
    async fn test_ma_insufficient_data() {
        let closes: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        let (svc, _temp) = setup("2330", &closes).await;

        let err = svc.ma(&sym("2330"), 20, MaType::Sma, 10).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientData(_)));
    }

    #[tokio::test]
    async fn test_ma_param_validation() {
        let (svc, _temp) = setup("2330", &[1.0, 2.0]).await;
        assert!(matches!(
            svc.ma(&sym("2330"), 1, MaType::Sma, 10).await.unwrap_err(),
            AppError::Validation(_)
        ));
        assert!(matches!(
            svc.ma(&sym("2330"), 201, MaType::Sma, 10).await.unwrap_err(),
            AppError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_cache_roundtrip_same_result() {
        let closes: Vec<f64> = (1..=40).map(|i| (i as f64).sin() * 10.0 + 100.0).collect();
        let (svc, _temp) = setup("2330", &closes).await;

        let first = svc.rsi(&sym("2330"), 14, 10).await.unwrap();
        let second = svc.rsi(&sym("2330"), 14, 10).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_clear_forces_recompute_after_new_bars() {
        let closes: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        let (svc, _temp) = setup("2330", &closes).await;

        let before = svc.ma(&sym("2330"), 5, MaType::Sma, 1).await.unwrap();

        // New bar lands; the cached series still serves until cleared.
        let new_bar = OhlcvBar {
            symbol: "2330".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 21).unwrap(),
            open: dec("100"),
            high: dec("100"),
            low: dec("100"),
            close: dec("100"),
            volume: 1000,
            turnover: Decimal::zero(),
        };
        svc.repo.upsert_bars(&[new_bar]).await.unwrap();

        let cached = svc.ma(&sym("2330"), 5, MaType::Sma, 1).await.unwrap();
        assert_eq!(cached, before);

        svc.clear(&sym("2330")).await.unwrap();
        let recomputed = svc.ma(&sym("2330"), 5, MaType::Sma, 1).await.unwrap();
        assert_ne!(recomputed, before);
        assert_eq!(
            recomputed[0].timestamp,
            NaiveDate::from_ymd_opt(2024, 1, 21).unwrap()
        );
    }

    #[tokio::test]
    async fn test_macd_output_and_validation() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + ((i * 3) % 11) as f64).collect();
        let (svc, _temp) = setup("2330", &closes).await;

        let points = svc.macd(&sym("2330"), 12, 26, 9, 5).await.unwrap();
        assert_eq!(points.len(), 5);
        // Float rounding at the decimal boundary leaves sub-epsilon drift.
        let epsilon = dec("0.000001");
        for p in &points {
            assert!((p.histogram - (p.macd - p.signal)).abs() < epsilon);
        }

        assert!(matches!(
            svc.macd(&sym("2330"), 26, 12, 9, 5).await.unwrap_err(),
            AppError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_bollinger_band_ordering() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + ((i * 7) % 13) as f64).collect();
        let (svc, _temp) = setup("2330", &closes).await;

        let points = svc.bollinger(&sym("2330"), 20, 2.0, 10).await.unwrap();
        assert!(!points.is_empty());
        for p in &points {
            assert!(p.upper >= p.middle);
            assert!(p.middle >= p.lower);
        }
    }

    #[tokio::test]
    async fn test_kdj_j_identity() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + ((i * 5) % 17) as f64).collect();
        let (svc, _temp) = setup("2330", &closes).await;

        let points = svc.kdj(&sym("2330"), 9, 10).await.unwrap();
        assert!(!points.is_empty());
        let three = dec("3");
        let two = dec("2");
        let epsilon = dec("0.000001");
        for p in &points {
            assert!((p.j - (three * p.k - two * p.d)).abs() < epsilon);
        }
    }

    #[tokio::test]
    async fn test_result_length_never_exceeds_limit() {
        let closes: Vec<f64> = (1..=60).map(|i| i as f64).collect();
        let (svc, _temp) = setup("2330", &closes).await;

        for limit in [1usize, 5, 100] {
            let points = svc.rsi(&sym("2330"), 14, limit).await.unwrap();
            assert!(points.len() <= limit);
        }
    }
}
