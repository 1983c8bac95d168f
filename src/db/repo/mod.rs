//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `ledger.rs` - events, positions, tax lots, realized P&L
//! - `bars.rs` - OHLCV bars, rollups and complete-day bookkeeping
//! - `indicator_cache.rs` - parameter-keyed indicator cache rows

mod bars;
mod indicator_cache;
mod ledger;

pub use ledger::LedgerError;

use crate::domain::{CorporateAction, CorporateActionType, Decimal, Portfolio};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Portfolio operations
    // =========================================================================

    /// Insert a portfolio and return the stored row.
    pub async fn create_portfolio(
        &self,
        user_id: Uuid,
        name: &str,
        description: Option<&str>,
        currency: &str,
    ) -> Result<Portfolio, sqlx::Error> {
        let portfolio = Portfolio {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            description: description.map(|s| s.to_string()),
            currency: currency.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO portfolios (id, user_id, name, description, currency, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(portfolio.id.to_string())
        .bind(portfolio.user_id.to_string())
        .bind(&portfolio.name)
        .bind(portfolio.description.as_deref())
        .bind(&portfolio.currency)
        .bind(portfolio.created_at.to_rfc3339())
        .bind(portfolio.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(portfolio)
    }

    pub async fn get_portfolio(&self, id: Uuid) -> Result<Option<Portfolio>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, user_id, name, description, currency, created_at, updated_at
             FROM portfolios WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| portfolio_from_row(&r)))
    }

    pub async fn list_portfolios(&self, user_id: Uuid) -> Result<Vec<Portfolio>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, user_id, name, description, currency, created_at, updated_at
             FROM portfolios WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(portfolio_from_row).collect())
    }

    // =========================================================================
    // Corporate actions (externally loaded, read-only to the core)
    // =========================================================================

    pub async fn insert_corporate_action(
        &self,
        action: &CorporateAction,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO corporate_actions
            (id, symbol, action_type, announcement_date, ex_date, record_date, payment_date,
             cash_dividend, stock_dividend, split_ratio, rights_ratio, subscription_price,
             adjustment_factor)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(action.id.to_string())
        .bind(&action.symbol)
        .bind(action.action_type.as_str())
        .bind(action.announcement_date.map(|d| d.to_string()))
        .bind(action.ex_date.map(|d| d.to_string()))
        .bind(action.record_date.map(|d| d.to_string()))
        .bind(action.payment_date.map(|d| d.to_string()))
        .bind(action.cash_dividend.map(|d| d.to_canonical_string()))
        .bind(action.stock_dividend.map(|d| d.to_canonical_string()))
        .bind(action.split_ratio.map(|d| d.to_canonical_string()))
        .bind(action.rights_ratio.map(|d| d.to_canonical_string()))
        .bind(action.subscription_price.map(|d| d.to_canonical_string()))
        .bind(action.adjustment_factor.map(|d| d.to_canonical_string()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_corporate_actions(
        &self,
        symbol: &str,
    ) -> Result<Vec<CorporateAction>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, symbol, action_type, announcement_date, ex_date, record_date,
                   payment_date, cash_dividend, stock_dividend, split_ratio, rights_ratio,
                   subscription_price, adjustment_factor
            FROM corporate_actions
            WHERE symbol = ?
            ORDER BY ex_date ASC
            "#,
        )
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| CorporateAction {
                id: row_uuid(r, "id"),
                symbol: r.get("symbol"),
                action_type: CorporateActionType::from_str(&r.get::<String, _>("action_type"))
                    .unwrap_or(CorporateActionType::Dividend),
                announcement_date: row_opt_date(r, "announcement_date"),
                ex_date: row_opt_date(r, "ex_date"),
                record_date: row_opt_date(r, "record_date"),
                payment_date: row_opt_date(r, "payment_date"),
                cash_dividend: row_opt_decimal(r, "cash_dividend"),
                stock_dividend: row_opt_decimal(r, "stock_dividend"),
                split_ratio: row_opt_decimal(r, "split_ratio"),
                rights_ratio: row_opt_decimal(r, "rights_ratio"),
                subscription_price: row_opt_decimal(r, "subscription_price"),
                adjustment_factor: row_opt_decimal(r, "adjustment_factor"),
            })
            .collect())
    }
}

fn portfolio_from_row(row: &SqliteRow) -> Portfolio {
    Portfolio {
        id: row_uuid(row, "id"),
        user_id: row_uuid(row, "user_id"),
        name: row.get("name"),
        description: row.get("description"),
        currency: row.get("currency"),
        created_at: row_datetime(row, "created_at"),
        updated_at: row_datetime(row, "updated_at"),
    }
}

// =========================================================================
// Row parsing helpers shared by the repo submodules. Stored values were
// written by this code; a parse failure means corruption, so we log and
// fall back to defaults rather than failing the whole query.
// =========================================================================

pub(crate) fn row_decimal(row: &SqliteRow, column: &str) -> Decimal {
    let raw: String = row.get(column);
    Decimal::from_str(&raw).unwrap_or_else(|e| {
        warn!(column, value = %raw, error = %e, "failed to parse stored decimal, using zero");
        Decimal::zero()
    })
}

pub(crate) fn row_opt_decimal(row: &SqliteRow, column: &str) -> Option<Decimal> {
    let raw: Option<String> = row.get(column);
    raw.and_then(|s| Decimal::from_str(&s).ok())
}

pub(crate) fn row_datetime(row: &SqliteRow, column: &str) -> DateTime<Utc> {
    let raw: String = row.get(column);
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!(column, value = %raw, error = %e, "failed to parse stored timestamp, using epoch");
            DateTime::<Utc>::UNIX_EPOCH
        })
}

pub(crate) fn row_date(row: &SqliteRow, column: &str) -> NaiveDate {
    let raw: String = row.get(column);
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").unwrap_or_else(|e| {
        warn!(column, value = %raw, error = %e, "failed to parse stored date, using epoch");
        NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
    })
}

pub(crate) fn row_opt_date(row: &SqliteRow, column: &str) -> Option<NaiveDate> {
    let raw: Option<String> = row.get(column);
    raw.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

pub(crate) fn row_uuid(row: &SqliteRow, column: &str) -> Uuid {
    let raw: String = row.get(column);
    Uuid::parse_str(&raw).unwrap_or_else(|e| {
        warn!(column, value = %raw, error = %e, "failed to parse stored uuid, using nil");
        Uuid::nil()
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::setup_test_repo;
    use crate::domain::{CorporateAction, CorporateActionType, Decimal};
    use chrono::NaiveDate;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_create_and_get_portfolio() {
        let (repo, _temp) = setup_test_repo().await;
        let user_id = Uuid::new_v4();

        let created = repo
            .create_portfolio(user_id, "core holdings", None, "TWD")
            .await
            .expect("create failed");

        let fetched = repo
            .get_portfolio(created.id)
            .await
            .expect("query failed")
            .expect("portfolio missing");

        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.user_id, user_id);
        assert_eq!(fetched.name, "core holdings");
        assert_eq!(fetched.currency, "TWD");
    }

    #[tokio::test]
    async fn test_list_portfolios_scoped_to_user() {
        let (repo, _temp) = setup_test_repo().await;
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();

        repo.create_portfolio(user_a, "a", None, "TWD").await.unwrap();
        repo.create_portfolio(user_b, "b", None, "TWD").await.unwrap();

        let listed = repo.list_portfolios(user_a).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "a");
    }

    #[tokio::test]
    async fn test_corporate_action_roundtrip() {
        let (repo, _temp) = setup_test_repo().await;

        let action = CorporateAction {
            id: Uuid::new_v4(),
            symbol: "2330".to_string(),
            action_type: CorporateActionType::Dividend,
            announcement_date: NaiveDate::from_ymd_opt(2024, 5, 1),
            ex_date: NaiveDate::from_ymd_opt(2024, 6, 13),
            record_date: NaiveDate::from_ymd_opt(2024, 6, 20),
            payment_date: NaiveDate::from_ymd_opt(2024, 7, 11),
            cash_dividend: Some(Decimal::from_str_canonical("3.5").unwrap()),
            stock_dividend: None,
            split_ratio: None,
            rights_ratio: None,
            subscription_price: None,
            adjustment_factor: None,
        };

        repo.insert_corporate_action(&action).await.unwrap();
        let listed = repo.list_corporate_actions("2330").await.unwrap();
        assert_eq!(listed, vec![action]);
    }
}
