//! Parameter-keyed indicator cache rows with TTL.
//!
//! The cache holds the FULL computed series per (symbol, indicator, params)
//! key; callers tail-slice when serving. Expired rows are dropped on read so
//! stale data is never served past its TTL.

use super::Repository;
use chrono::{DateTime, Utc};
use sqlx::Row;

impl Repository {
    /// Fetch a cached series if present and not expired. An expired row is
    /// deleted on the way out.
    pub async fn get_cached_indicator(
        &self,
        symbol: &str,
        indicator: &str,
        params_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT data, expires_at
            FROM indicator_cache
            WHERE symbol = ? AND indicator = ? AND params_key = ?
            "#,
        )
        .bind(symbol)
        .bind(indicator)
        .bind(params_key)
        .fetch_optional(self.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at = super::row_datetime(&row, "expires_at");
        if expires_at <= now {
            sqlx::query(
                "DELETE FROM indicator_cache WHERE symbol = ? AND indicator = ? AND params_key = ?",
            )
            .bind(symbol)
            .bind(indicator)
            .bind(params_key)
            .execute(self.pool())
            .await?;
            return Ok(None);
        }

        Ok(Some(row.get("data")))
    }

    /// Store (or replace) a cached series.
    pub async fn put_cached_indicator(
        &self,
        symbol: &str,
        indicator: &str,
        params_key: &str,
        data: &str,
        calculated_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO indicator_cache
            (symbol, indicator, params_key, data, calculated_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(symbol)
        .bind(indicator)
        .bind(params_key)
        .bind(data)
        .bind(calculated_at.to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Drop every cached series for a symbol.
    pub async fn clear_cached_indicators(&self, symbol: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM indicator_cache WHERE symbol = ?")
            .bind(symbol)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }
}
