//! OHLCV bar storage: idempotent upserts, timeframe-routed reads, rollup
//! rebuilds and complete-day bookkeeping for the bulk sync worker.

use super::{row_date, row_decimal, Repository};
use crate::domain::{OhlcvBar, Timeframe};
use chrono::{Datelike, Duration, NaiveDate};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::{BTreeMap, HashSet};

impl Repository {
    // =========================================================================
    // Raw bars
    // =========================================================================

    /// Upsert a batch of bars in one transaction, idempotent by
    /// (symbol, date). Later writes overwrite earlier ones, reflecting
    /// corrections from the exchange.
    pub async fn upsert_bars(&self, bars: &[OhlcvBar]) -> Result<usize, sqlx::Error> {
        if bars.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool().begin().await?;
        for bar in bars {
            sqlx::query(
                r#"
                INSERT INTO stock_ohlcv (symbol, date, open, high, low, close, volume, turnover)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(symbol, date) DO UPDATE SET
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume,
                    turnover = excluded.turnover
                "#,
            )
            .bind(&bar.symbol)
            .bind(bar.date.to_string())
            .bind(bar.open.to_canonical_string())
            .bind(bar.high.to_canonical_string())
            .bind(bar.low.to_canonical_string())
            .bind(bar.close.to_canonical_string())
            .bind(bar.volume)
            .bind(bar.turnover.to_canonical_string())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(bars.len())
    }

    /// Bars for a symbol, newest first, routed to the raw table or a
    /// rollup by timeframe.
    pub async fn get_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        limit: i64,
    ) -> Result<Vec<OhlcvBar>, sqlx::Error> {
        let (table, date_col) = match timeframe {
            Timeframe::Daily => ("stock_ohlcv", "date"),
            Timeframe::Weekly => ("ohlcv_weekly", "bucket"),
            Timeframe::Monthly => ("ohlcv_monthly", "bucket"),
        };

        let query = format!(
            r#"
            SELECT symbol, {date_col} AS date, open, high, low, close, volume, turnover
            FROM {table}
            WHERE symbol = ?
              AND (? IS NULL OR {date_col} >= ?)
              AND (? IS NULL OR {date_col} <= ?)
            ORDER BY {date_col} DESC
            LIMIT ?
            "#
        );

        let from = from.map(|d| d.to_string());
        let to = to.map(|d| d.to_string());
        let rows = sqlx::query(&query)
            .bind(symbol)
            .bind(from.clone())
            .bind(from)
            .bind(to.clone())
            .bind(to)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;

        Ok(rows.iter().map(bar_from_row).collect())
    }

    /// Delete raw bars older than the cutoff. Rollups are retained.
    pub async fn prune_bars_before(&self, cutoff: NaiveDate) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM stock_ohlcv WHERE date < ?")
            .bind(cutoff.to_string())
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Symbols with at least one bar on or after the cutoff.
    pub async fn list_symbols_with_recent_data(
        &self,
        cutoff: NaiveDate,
    ) -> Result<Vec<String>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT DISTINCT symbol FROM stock_ohlcv WHERE date >= ? ORDER BY symbol",
        )
        .bind(cutoff.to_string())
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().map(|r| r.get("symbol")).collect())
    }

    // =========================================================================
    // Rollups
    // =========================================================================

    /// Rebuild the weekly and monthly rollups from the raw table.
    ///
    /// Buckets follow the calendar in the domain zone: weeks start Monday,
    /// months on the 1st. open = first bar, close = last bar, high/low =
    /// extremes, volume and turnover summed. The rebuild runs in one
    /// transaction so readers never see a half-built rollup.
    pub async fn refresh_aggregates(&self) -> Result<(), sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, date, open, high, low, close, volume, turnover
            FROM stock_ohlcv
            ORDER BY symbol ASC, date ASC
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        let bars: Vec<OhlcvBar> = rows.iter().map(bar_from_row).collect();

        let weekly = rollup(&bars, week_bucket);
        let monthly = rollup(&bars, month_bucket);

        let mut tx = self.pool().begin().await?;
        for (table, buckets) in [("ohlcv_weekly", weekly), ("ohlcv_monthly", monthly)] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;

            for bar in buckets {
                sqlx::query(&format!(
                    r#"
                    INSERT INTO {table} (symbol, bucket, open, high, low, close, volume, turnover)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#
                ))
                .bind(&bar.symbol)
                .bind(bar.date.to_string())
                .bind(bar.open.to_canonical_string())
                .bind(bar.high.to_canonical_string())
                .bind(bar.low.to_canonical_string())
                .bind(bar.close.to_canonical_string())
                .bind(bar.volume)
                .bind(bar.turnover.to_canonical_string())
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;

        Ok(())
    }

    // =========================================================================
    // Complete-day bookkeeping
    // =========================================================================

    /// Distinct row counts per day within a window.
    pub async fn count_bars_per_day(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<(NaiveDate, i64)>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT date, COUNT(*) AS cnt
            FROM stock_ohlcv
            WHERE date >= ? AND date <= ?
            GROUP BY date
            ORDER BY date ASC
            "#,
        )
        .bind(from.to_string())
        .bind(to.to_string())
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .iter()
            .map(|r| (row_date(r, "date"), r.get::<i64, _>("cnt")))
            .collect())
    }

    /// Days within a window holding more than `threshold` rows. Guards
    /// against treating a partial per-symbol sync as a finished day.
    pub async fn synced_dates(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        threshold: i64,
    ) -> Result<HashSet<NaiveDate>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT date
            FROM stock_ohlcv
            WHERE date >= ? AND date <= ?
            GROUP BY date
            HAVING COUNT(*) > ?
            "#,
        )
        .bind(from.to_string())
        .bind(to.to_string())
        .bind(threshold)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().map(|r| row_date(r, "date")).collect())
    }

    /// Earliest day with complete data, or None if no complete day exists.
    pub async fn first_synced_date(
        &self,
        threshold: i64,
    ) -> Result<Option<NaiveDate>, sqlx::Error> {
        self.edge_synced_date(threshold, "ASC").await
    }

    /// Latest day with complete data, or None if no complete day exists.
    pub async fn last_synced_date(
        &self,
        threshold: i64,
    ) -> Result<Option<NaiveDate>, sqlx::Error> {
        self.edge_synced_date(threshold, "DESC").await
    }

    async fn edge_synced_date(
        &self,
        threshold: i64,
        order: &str,
    ) -> Result<Option<NaiveDate>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT date
            FROM stock_ohlcv
            GROUP BY date
            HAVING COUNT(*) > ?
            ORDER BY date {order}
            LIMIT 1
            "#
        );
        let row = sqlx::query(&query)
            .bind(threshold)
            .fetch_optional(self.pool())
            .await?;

        Ok(row.map(|r| row_date(&r, "date")))
    }
}

fn bar_from_row(row: &SqliteRow) -> OhlcvBar {
    OhlcvBar {
        symbol: row.get("symbol"),
        date: row_date(row, "date"),
        open: row_decimal(row, "open"),
        high: row_decimal(row, "high"),
        low: row_decimal(row, "low"),
        close: row_decimal(row, "close"),
        volume: row.get("volume"),
        turnover: row_decimal(row, "turnover"),
    }
}

/// Monday of the bar's ISO week.
fn week_bucket(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// First calendar day of the bar's month.
fn month_bucket(date: NaiveDate) -> NaiveDate {
    date.with_day(1).expect("day 1 always exists")
}

/// Fold daily bars (sorted by symbol, date ascending) into bucketed bars.
fn rollup(bars: &[OhlcvBar], bucket_of: fn(NaiveDate) -> NaiveDate) -> Vec<OhlcvBar> {
    let mut buckets: BTreeMap<(String, NaiveDate), OhlcvBar> = BTreeMap::new();

    for bar in bars {
        let key = (bar.symbol.clone(), bucket_of(bar.date));
        match buckets.get_mut(&key) {
            None => {
                let mut rolled = bar.clone();
                rolled.date = key.1;
                buckets.insert(key, rolled);
            }
            Some(rolled) => {
                // Input ordering makes this bar the latest so far.
                rolled.close = bar.close;
                if bar.high > rolled.high {
                    rolled.high = bar.high;
                }
                if bar.low < rolled.low {
                    rolled.low = bar.low;
                }
                rolled.volume += bar.volume;
                rolled.turnover = rolled.turnover + bar.turnover;
            }
        }
    }

    buckets.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::setup_test_repo;
    use super::*;
    use crate::domain::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn bar(symbol: &str, day: &str, open: &str, high: &str, low: &str, close: &str, volume: i64) -> OhlcvBar {
        OhlcvBar {
            symbol: symbol.to_string(),
            date: date(day),
            open: dec(open),
            high: dec(high),
            low: dec(low),
            close: dec(close),
            volume,
            turnover: dec("1000"),
        }
    }

    #[tokio::test]
    async fn test_upsert_bars_idempotent() {
        let (repo, _temp) = setup_test_repo().await;
        let bars = vec![
            bar("2330", "2024-01-02", "585", "587", "580", "582", 100),
            bar("2317", "2024-01-02", "104", "105", "103", "104.5", 200),
        ];

        repo.upsert_bars(&bars).await.unwrap();
        repo.upsert_bars(&bars).await.unwrap();

        let stored = repo
            .get_bars("2330", Timeframe::Daily, None, None, 100)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0], bars[0]);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_with_corrections() {
        let (repo, _temp) = setup_test_repo().await;
        repo.upsert_bars(&[bar("2330", "2024-01-02", "585", "587", "580", "582", 100)])
            .await
            .unwrap();
        repo.upsert_bars(&[bar("2330", "2024-01-02", "585", "588", "580", "584", 150)])
            .await
            .unwrap();

        let stored = repo
            .get_bars("2330", Timeframe::Daily, None, None, 100)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].close, dec("584"));
        assert_eq!(stored[0].volume, 150);
    }

    #[tokio::test]
    async fn test_get_bars_newest_first_windowed() {
        let (repo, _temp) = setup_test_repo().await;
        repo.upsert_bars(&[
            bar("2330", "2024-01-02", "585", "587", "580", "582", 100),
            bar("2330", "2024-01-03", "582", "584", "579", "580", 100),
            bar("2330", "2024-01-04", "580", "586", "580", "585", 100),
        ])
        .await
        .unwrap();

        let stored = repo
            .get_bars(
                "2330",
                Timeframe::Daily,
                Some(date("2024-01-02")),
                Some(date("2024-01-03")),
                100,
            )
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].date, date("2024-01-03"));
        assert_eq!(stored[1].date, date("2024-01-02"));

        let limited = repo
            .get_bars("2330", Timeframe::Daily, None, None, 1)
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].date, date("2024-01-04"));
    }

    #[tokio::test]
    async fn test_refresh_aggregates_weekly_and_monthly() {
        let (repo, _temp) = setup_test_repo().await;
        // 2024-01-02..05 are Tue..Fri of one ISO week; 2024-01-08 is the
        // following Monday.
        repo.upsert_bars(&[
            bar("2330", "2024-01-02", "585", "587", "580", "582", 100),
            bar("2330", "2024-01-03", "582", "590", "581", "589", 110),
            bar("2330", "2024-01-05", "589", "591", "585", "586", 120),
            bar("2330", "2024-01-08", "586", "588", "584", "587", 130),
        ])
        .await
        .unwrap();

        repo.refresh_aggregates().await.unwrap();

        let weekly = repo
            .get_bars("2330", Timeframe::Weekly, None, None, 10)
            .await
            .unwrap();
        assert_eq!(weekly.len(), 2);
        // Newest first: week of Jan 8, then week of Jan 1.
        assert_eq!(weekly[0].date, date("2024-01-08"));
        assert_eq!(weekly[1].date, date("2024-01-01"));

        let first_week = &weekly[1];
        assert_eq!(first_week.open, dec("585"));
        assert_eq!(first_week.close, dec("586"));
        assert_eq!(first_week.high, dec("591"));
        assert_eq!(first_week.low, dec("580"));
        assert_eq!(first_week.volume, 330);
        assert_eq!(first_week.turnover, dec("3000"));

        let monthly = repo
            .get_bars("2330", Timeframe::Monthly, None, None, 10)
            .await
            .unwrap();
        assert_eq!(monthly.len(), 1);
        assert_eq!(monthly[0].date, date("2024-01-01"));
        assert_eq!(monthly[0].open, dec("585"));
        assert_eq!(monthly[0].close, dec("587"));
        assert_eq!(monthly[0].volume, 460);
    }

    #[tokio::test]
    async fn test_refresh_aggregates_rerun_is_stable() {
        let (repo, _temp) = setup_test_repo().await;
        repo.upsert_bars(&[bar("2330", "2024-01-02", "585", "587", "580", "582", 100)])
            .await
            .unwrap();

        repo.refresh_aggregates().await.unwrap();
        repo.refresh_aggregates().await.unwrap();

        let weekly = repo
            .get_bars("2330", Timeframe::Weekly, None, None, 10)
            .await
            .unwrap();
        assert_eq!(weekly.len(), 1);
    }

    #[tokio::test]
    async fn test_synced_dates_threshold() {
        let (repo, _temp) = setup_test_repo().await;

        // Day one: 3 symbols; day two: 1 symbol.
        repo.upsert_bars(&[
            bar("2330", "2024-01-02", "585", "587", "580", "582", 100),
            bar("2317", "2024-01-02", "104", "105", "103", "104", 100),
            bar("2454", "2024-01-02", "900", "910", "895", "905", 100),
            bar("2330", "2024-01-03", "582", "584", "579", "580", 100),
        ])
        .await
        .unwrap();

        let synced = repo
            .synced_dates(date("2024-01-01"), date("2024-01-31"), 2)
            .await
            .unwrap();
        assert!(synced.contains(&date("2024-01-02")));
        assert!(!synced.contains(&date("2024-01-03")));

        assert_eq!(
            repo.first_synced_date(2).await.unwrap(),
            Some(date("2024-01-02"))
        );
        assert_eq!(
            repo.last_synced_date(2).await.unwrap(),
            Some(date("2024-01-02"))
        );
        assert_eq!(repo.first_synced_date(10).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_count_bars_per_day() {
        let (repo, _temp) = setup_test_repo().await;
        repo.upsert_bars(&[
            bar("2330", "2024-01-02", "585", "587", "580", "582", 100),
            bar("2317", "2024-01-02", "104", "105", "103", "104", 100),
            bar("2330", "2024-01-03", "582", "584", "579", "580", 100),
        ])
        .await
        .unwrap();

        let counts = repo
            .count_bars_per_day(date("2024-01-01"), date("2024-01-31"))
            .await
            .unwrap();
        assert_eq!(
            counts,
            vec![(date("2024-01-02"), 2), (date("2024-01-03"), 1)]
        );
    }

    #[tokio::test]
    async fn test_prune_keeps_rollups() {
        let (repo, _temp) = setup_test_repo().await;
        repo.upsert_bars(&[
            bar("2330", "2018-06-01", "200", "201", "199", "200", 100),
            bar("2330", "2024-01-02", "585", "587", "580", "582", 100),
        ])
        .await
        .unwrap();
        repo.refresh_aggregates().await.unwrap();

        let pruned = repo.prune_bars_before(date("2020-01-01")).await.unwrap();
        assert_eq!(pruned, 1);

        let daily = repo
            .get_bars("2330", Timeframe::Daily, None, None, 10)
            .await
            .unwrap();
        assert_eq!(daily.len(), 1);

        let monthly = repo
            .get_bars("2330", Timeframe::Monthly, None, None, 10)
            .await
            .unwrap();
        assert_eq!(monthly.len(), 2);
    }

    #[tokio::test]
    async fn test_list_symbols_with_recent_data() {
        let (repo, _temp) = setup_test_repo().await;
        repo.upsert_bars(&[
            bar("2330", "2024-01-02", "585", "587", "580", "582", 100),
            bar("1101", "2018-06-01", "40", "41", "39", "40", 100),
        ])
        .await
        .unwrap();

        let symbols = repo
            .list_symbols_with_recent_data(date("2023-01-01"))
            .await
            .unwrap();
        assert_eq!(symbols, vec!["2330".to_string()]);
    }
}
