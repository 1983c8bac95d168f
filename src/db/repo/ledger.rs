//! Ledger operations: the append-only event log plus derived positions,
//! FIFO tax lots and realized P&L.
//!
//! `record_event` is the only write path. Event insert, lot mutation,
//! realized rows and the projection refresh all commit in one transaction.

use super::{row_datetime, row_decimal, row_uuid, Repository};
use crate::domain::{
    Decimal, EventType, LedgerEvent, Position, RealizedPnl, RecordEventRequest, Symbol, TaxLot,
};
use crate::engine::fifo::{match_sell, FifoError, OpenLot};
use crate::engine::projection::fold_position;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0}")]
    Validation(String),
    #[error("portfolio {0} not found")]
    PortfolioMissing(Uuid),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl Repository {
    // =========================================================================
    // Event recording
    // =========================================================================

    /// Record a ledger event and update all derived state atomically.
    ///
    /// # Errors
    /// `Validation` for malformed symbols, non-positive quantity, negative
    /// fee/tax/price, missing SPLIT ratio or a SELL exceeding open lots;
    /// `PortfolioMissing` when the portfolio does not exist. Any failure
    /// rolls the transaction back.
    pub async fn record_event(
        &self,
        request: RecordEventRequest,
    ) -> Result<LedgerEvent, LedgerError> {
        let symbol = Symbol::from_str(&request.symbol)
            .map_err(|e| LedgerError::Validation(format!("invalid symbol: {}", e)))?;
        let event_type =
            EventType::from_str(&request.event_type).map_err(LedgerError::Validation)?;

        if !request.quantity.is_positive() {
            return Err(LedgerError::Validation(
                "quantity must be positive".to_string(),
            ));
        }
        if request.price.is_negative() {
            return Err(LedgerError::Validation(
                "price must not be negative".to_string(),
            ));
        }
        if request.fee.is_negative() || request.tax.is_negative() {
            return Err(LedgerError::Validation(
                "fee and tax must not be negative".to_string(),
            ));
        }

        let gross = request.quantity * request.price;
        let total_amount = match event_type {
            EventType::Buy => gross + request.fee + request.tax,
            EventType::Sell => gross - request.fee - request.tax,
            _ => gross,
        };

        let event = LedgerEvent {
            event_id: Uuid::new_v4(),
            portfolio_id: request.portfolio_id,
            event_type,
            symbol: symbol.code().to_string(),
            quantity: request.quantity,
            price: request.price,
            fee: request.fee,
            tax: request.tax,
            total_amount,
            occurred_at: request.occurred_at,
            recorded_at: Utc::now(),
            source: "manual".to_string(),
            notes: request.notes,
            payload: request.payload,
        };

        let mut tx = self.pool().begin().await?;

        let portfolio_exists: Option<(String,)> =
            sqlx::query_as("SELECT id FROM portfolios WHERE id = ?")
                .bind(event.portfolio_id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
        if portfolio_exists.is_none() {
            return Err(LedgerError::PortfolioMissing(event.portfolio_id));
        }

        insert_event(&mut tx, &event).await?;

        match event.event_type {
            EventType::Buy | EventType::Rights => {
                open_lot(&mut tx, &event).await?;
            }
            EventType::Sell => {
                consume_lots(&mut tx, &event).await?;
            }
            EventType::Split => {
                let ratio = event.split_ratio().ok_or_else(|| {
                    LedgerError::Validation(
                        "SPLIT event requires a positive payload.ratio".to_string(),
                    )
                })?;
                if !ratio.is_positive() {
                    return Err(LedgerError::Validation(
                        "SPLIT event requires a positive payload.ratio".to_string(),
                    ));
                }
                apply_split(&mut tx, &event, ratio).await?;
            }
            EventType::Dividend | EventType::Correction => {}
        }

        refresh_position(&mut tx, event.portfolio_id, &event.symbol).await?;

        tx.commit().await?;
        Ok(event)
    }

    // =========================================================================
    // Event queries
    // =========================================================================

    /// Events for a portfolio, newest first.
    pub async fn get_events(
        &self,
        portfolio_id: Uuid,
        limit: i64,
    ) -> Result<Vec<LedgerEvent>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, portfolio_id, event_type, symbol, quantity, price, fee, tax,
                   total_amount, occurred_at, recorded_at, source, notes, payload
            FROM ledger_events
            WHERE portfolio_id = ?
            ORDER BY occurred_at DESC, recorded_at DESC
            LIMIT ?
            "#,
        )
        .bind(portfolio_id.to_string())
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().map(event_from_row).collect())
    }

    /// Events for one symbol in a portfolio, newest first.
    pub async fn get_events_by_symbol(
        &self,
        portfolio_id: Uuid,
        symbol: &str,
    ) -> Result<Vec<LedgerEvent>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, portfolio_id, event_type, symbol, quantity, price, fee, tax,
                   total_amount, occurred_at, recorded_at, source, notes, payload
            FROM ledger_events
            WHERE portfolio_id = ? AND symbol = ?
            ORDER BY occurred_at DESC, recorded_at DESC
            "#,
        )
        .bind(portfolio_id.to_string())
        .bind(symbol)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().map(event_from_row).collect())
    }

    // =========================================================================
    // Positions
    // =========================================================================

    pub async fn get_positions(&self, portfolio_id: Uuid) -> Result<Vec<Position>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT portfolio_id, symbol, total_quantity, total_cost, avg_cost_per_share,
                   last_updated
            FROM positions_current
            WHERE portfolio_id = ?
            ORDER BY symbol ASC
            "#,
        )
        .bind(portfolio_id.to_string())
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().map(position_from_row).collect())
    }

    pub async fn get_position(
        &self,
        portfolio_id: Uuid,
        symbol: &str,
    ) -> Result<Option<Position>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT portfolio_id, symbol, total_quantity, total_cost, avg_cost_per_share,
                   last_updated
            FROM positions_current
            WHERE portfolio_id = ? AND symbol = ?
            "#,
        )
        .bind(portfolio_id.to_string())
        .bind(symbol)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|r| position_from_row(&r)))
    }

    // =========================================================================
    // Tax lots and realized P&L
    // =========================================================================

    pub async fn get_tax_lots(
        &self,
        portfolio_id: Uuid,
        symbol: &str,
    ) -> Result<Vec<TaxLot>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, portfolio_id, symbol, buy_event_id, purchase_date, purchase_price,
                   original_quantity, remaining_quantity, is_closed
            FROM tax_lots
            WHERE portfolio_id = ? AND symbol = ?
            ORDER BY purchase_date ASC, rowid ASC
            "#,
        )
        .bind(portfolio_id.to_string())
        .bind(symbol)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .iter()
            .map(|r| TaxLot {
                id: row_uuid(r, "id"),
                portfolio_id: row_uuid(r, "portfolio_id"),
                symbol: r.get("symbol"),
                buy_event_id: row_uuid(r, "buy_event_id"),
                purchase_date: row_datetime(r, "purchase_date"),
                purchase_price: row_decimal(r, "purchase_price"),
                original_quantity: row_decimal(r, "original_quantity"),
                remaining_quantity: row_decimal(r, "remaining_quantity"),
                is_closed: r.get::<i64, _>("is_closed") != 0,
            })
            .collect())
    }

    /// Realized P&L rows for a portfolio, newest sells first.
    pub async fn get_realized_pnl(
        &self,
        portfolio_id: Uuid,
        symbol: Option<&str>,
    ) -> Result<Vec<RealizedPnl>, sqlx::Error> {
        let rows = match symbol {
            Some(symbol) => {
                sqlx::query(
                    r#"
                    SELECT id, portfolio_id, symbol, buy_event_id, sell_event_id, quantity,
                           buy_price, sell_price, realized_pnl, total_fees, total_taxes,
                           buy_date, sell_date, holding_days, created_at
                    FROM realized_pnl
                    WHERE portfolio_id = ? AND symbol = ?
                    ORDER BY sell_date DESC, created_at DESC
                    "#,
                )
                .bind(portfolio_id.to_string())
                .bind(symbol)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, portfolio_id, symbol, buy_event_id, sell_event_id, quantity,
                           buy_price, sell_price, realized_pnl, total_fees, total_taxes,
                           buy_date, sell_date, holding_days, created_at
                    FROM realized_pnl
                    WHERE portfolio_id = ?
                    ORDER BY sell_date DESC, created_at DESC
                    "#,
                )
                .bind(portfolio_id.to_string())
                .fetch_all(self.pool())
                .await?
            }
        };

        Ok(rows.iter().map(realized_from_row).collect())
    }
}

async fn insert_event(
    tx: &mut Transaction<'_, Sqlite>,
    event: &LedgerEvent,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO ledger_events
        (event_id, portfolio_id, event_type, symbol, quantity, price, fee, tax,
         total_amount, occurred_at, recorded_at, source, notes, payload)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.event_id.to_string())
    .bind(event.portfolio_id.to_string())
    .bind(event.event_type.as_str())
    .bind(&event.symbol)
    .bind(event.quantity.to_canonical_string())
    .bind(event.price.to_canonical_string())
    .bind(event.fee.to_canonical_string())
    .bind(event.tax.to_canonical_string())
    .bind(event.total_amount.to_canonical_string())
    .bind(event.occurred_at.to_rfc3339())
    .bind(event.recorded_at.to_rfc3339())
    .bind(&event.source)
    .bind(event.notes.as_deref())
    .bind(event.payload.as_ref().map(|p| p.to_string()))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Open a FIFO lot for a BUY (or RIGHTS) event at the fee-inclusive
/// per-share cost.
async fn open_lot(
    tx: &mut Transaction<'_, Sqlite>,
    event: &LedgerEvent,
) -> Result<(), sqlx::Error> {
    let purchase_price = event.total_amount / event.quantity;

    sqlx::query(
        r#"
        INSERT INTO tax_lots
        (id, portfolio_id, symbol, buy_event_id, purchase_date, purchase_price,
         original_quantity, remaining_quantity, is_closed)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(event.portfolio_id.to_string())
    .bind(&event.symbol)
    .bind(event.event_id.to_string())
    .bind(event.occurred_at.to_rfc3339())
    .bind(purchase_price.to_canonical_string())
    .bind(event.quantity.to_canonical_string())
    .bind(event.quantity.to_canonical_string())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Consume open lots oldest-first for a SELL, emitting one realized P&L
/// row per match.
async fn consume_lots(
    tx: &mut Transaction<'_, Sqlite>,
    event: &LedgerEvent,
) -> Result<(), LedgerError> {
    let rows = sqlx::query(
        r#"
        SELECT id, buy_event_id, purchase_date, purchase_price, remaining_quantity
        FROM tax_lots
        WHERE portfolio_id = ? AND symbol = ? AND is_closed = 0
        ORDER BY purchase_date ASC, rowid ASC
        "#,
    )
    .bind(event.portfolio_id.to_string())
    .bind(&event.symbol)
    .fetch_all(&mut **tx)
    .await?;

    let lots: Vec<OpenLot> = rows
        .iter()
        .map(|r| OpenLot {
            id: row_uuid(r, "id"),
            buy_event_id: row_uuid(r, "buy_event_id"),
            purchase_date: row_datetime(r, "purchase_date"),
            purchase_price: row_decimal(r, "purchase_price"),
            remaining_quantity: row_decimal(r, "remaining_quantity"),
        })
        .collect();

    let matches = match_sell(&lots, event.quantity, event.price, event.fee, event.tax).map_err(
        |e| match e {
            FifoError::InsufficientQuantity { .. } => LedgerError::Validation(e.to_string()),
        },
    )?;

    for m in &matches {
        let lot = lots
            .iter()
            .find(|l| l.id == m.lot_id)
            .expect("match refers to a loaded lot");
        let remaining = lot.remaining_quantity - m.quantity;

        sqlx::query("UPDATE tax_lots SET remaining_quantity = ?, is_closed = ? WHERE id = ?")
            .bind(remaining.to_canonical_string())
            .bind(remaining.is_zero() as i64)
            .bind(m.lot_id.to_string())
            .execute(&mut **tx)
            .await?;

        let holding_days = (event.occurred_at.date_naive() - m.purchase_date.date_naive())
            .num_days();

        sqlx::query(
            r#"
            INSERT INTO realized_pnl
            (id, portfolio_id, symbol, buy_event_id, sell_event_id, quantity, buy_price,
             sell_price, realized_pnl, total_fees, total_taxes, buy_date, sell_date,
             holding_days, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(event.portfolio_id.to_string())
        .bind(&event.symbol)
        .bind(m.buy_event_id.to_string())
        .bind(event.event_id.to_string())
        .bind(m.quantity.to_canonical_string())
        .bind(m.buy_price.to_canonical_string())
        .bind(event.price.to_canonical_string())
        .bind(m.realized_pnl.to_canonical_string())
        .bind(m.allocated_fee.to_canonical_string())
        .bind(m.allocated_tax.to_canonical_string())
        .bind(m.purchase_date.to_rfc3339())
        .bind(event.occurred_at.to_rfc3339())
        .bind(holding_days)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// Scale open lots for a SPLIT: quantities multiplied, per-share cost
/// divided, so lot cost is preserved.
async fn apply_split(
    tx: &mut Transaction<'_, Sqlite>,
    event: &LedgerEvent,
    ratio: Decimal,
) -> Result<(), sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, purchase_price, original_quantity, remaining_quantity
        FROM tax_lots
        WHERE portfolio_id = ? AND symbol = ? AND is_closed = 0
        "#,
    )
    .bind(event.portfolio_id.to_string())
    .bind(&event.symbol)
    .fetch_all(&mut **tx)
    .await?;

    for row in &rows {
        let id: String = row.get("id");
        let price = row_decimal(row, "purchase_price") / ratio;
        let original = row_decimal(row, "original_quantity") * ratio;
        let remaining = row_decimal(row, "remaining_quantity") * ratio;

        sqlx::query(
            "UPDATE tax_lots SET purchase_price = ?, original_quantity = ?, remaining_quantity = ? WHERE id = ?",
        )
        .bind(price.to_canonical_string())
        .bind(original.to_canonical_string())
        .bind(remaining.to_canonical_string())
        .bind(id)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// Recompute the materialized position for one (portfolio, symbol) key from
/// its full event stream, inside the caller's transaction.
async fn refresh_position(
    tx: &mut Transaction<'_, Sqlite>,
    portfolio_id: Uuid,
    symbol: &str,
) -> Result<(), sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT event_id, portfolio_id, event_type, symbol, quantity, price, fee, tax,
               total_amount, occurred_at, recorded_at, source, notes, payload
        FROM ledger_events
        WHERE portfolio_id = ? AND symbol = ?
        ORDER BY occurred_at ASC, recorded_at ASC
        "#,
    )
    .bind(portfolio_id.to_string())
    .bind(symbol)
    .fetch_all(&mut **tx)
    .await?;

    let events: Vec<LedgerEvent> = rows.iter().map(event_from_row).collect();

    match fold_position(&events) {
        Some(totals) => {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO positions_current
                (portfolio_id, symbol, total_quantity, total_cost, avg_cost_per_share, last_updated)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(portfolio_id.to_string())
            .bind(symbol)
            .bind(totals.total_quantity.to_canonical_string())
            .bind(totals.total_cost.to_canonical_string())
            .bind(totals.avg_cost_per_share.to_canonical_string())
            .bind(Utc::now().to_rfc3339())
            .execute(&mut **tx)
            .await?;
        }
        None => {
            sqlx::query("DELETE FROM positions_current WHERE portfolio_id = ? AND symbol = ?")
                .bind(portfolio_id.to_string())
                .bind(symbol)
                .execute(&mut **tx)
                .await?;
        }
    }

    Ok(())
}

fn event_from_row(row: &SqliteRow) -> LedgerEvent {
    let payload: Option<String> = row.get("payload");
    LedgerEvent {
        event_id: row_uuid(row, "event_id"),
        portfolio_id: row_uuid(row, "portfolio_id"),
        event_type: EventType::from_str(&row.get::<String, _>("event_type"))
            .unwrap_or(EventType::Correction),
        symbol: row.get("symbol"),
        quantity: row_decimal(row, "quantity"),
        price: row_decimal(row, "price"),
        fee: row_decimal(row, "fee"),
        tax: row_decimal(row, "tax"),
        total_amount: row_decimal(row, "total_amount"),
        occurred_at: row_datetime(row, "occurred_at"),
        recorded_at: row_datetime(row, "recorded_at"),
        source: row.get("source"),
        notes: row.get("notes"),
        payload: payload.and_then(|p| serde_json::from_str(&p).ok()),
    }
}

fn position_from_row(row: &SqliteRow) -> Position {
    Position {
        portfolio_id: row_uuid(row, "portfolio_id"),
        symbol: row.get("symbol"),
        total_quantity: row_decimal(row, "total_quantity"),
        total_cost: row_decimal(row, "total_cost"),
        avg_cost_per_share: row_decimal(row, "avg_cost_per_share"),
        last_updated: row_datetime(row, "last_updated"),
    }
}

fn realized_from_row(row: &SqliteRow) -> RealizedPnl {
    RealizedPnl {
        id: row_uuid(row, "id"),
        portfolio_id: row_uuid(row, "portfolio_id"),
        symbol: row.get("symbol"),
        buy_event_id: row_uuid(row, "buy_event_id"),
        sell_event_id: row_uuid(row, "sell_event_id"),
        quantity: row_decimal(row, "quantity"),
        buy_price: row_decimal(row, "buy_price"),
        sell_price: row_decimal(row, "sell_price"),
        realized_pnl: row_decimal(row, "realized_pnl"),
        total_fees: row_decimal(row, "total_fees"),
        total_taxes: row_decimal(row, "total_taxes"),
        buy_date: row_datetime(row, "buy_date"),
        sell_date: row_datetime(row, "sell_date"),
        holding_days: row.get("holding_days"),
        created_at: row_datetime(row, "created_at"),
    }
}
