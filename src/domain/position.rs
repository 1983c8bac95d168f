//! Derived position state: the materialized projection, FIFO tax lots and
//! realized P&L rows.

use crate::domain::Decimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current holdings for one (portfolio, symbol) key.
///
/// Materialized from the event log; the row is absent when
/// `total_quantity <= 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub portfolio_id: Uuid,
    pub symbol: String,
    pub total_quantity: Decimal,
    pub total_cost: Decimal,
    pub avg_cost_per_share: Decimal,
    pub last_updated: DateTime<Utc>,
}

/// A FIFO-tracked fraction of a BUY, consumed oldest-first by SELLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxLot {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    pub symbol: String,
    pub buy_event_id: Uuid,
    pub purchase_date: DateTime<Utc>,
    /// Fee-inclusive per-share cost: BUY total_amount / quantity.
    pub purchase_price: Decimal,
    pub original_quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub is_closed: bool,
}

/// One FIFO match between a BUY lot and a SELL event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealizedPnl {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    pub symbol: String,
    pub buy_event_id: Uuid,
    pub sell_event_id: Uuid,
    pub quantity: Decimal,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub realized_pnl: Decimal,
    pub total_fees: Decimal,
    pub total_taxes: Decimal,
    pub buy_date: DateTime<Utc>,
    pub sell_date: DateTime<Utc>,
    pub holding_days: i64,
    pub created_at: DateTime<Utc>,
}

/// Unrealized P&L derived from the position snapshot and a quoted price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnrealizedPnl {
    pub symbol: String,
    pub quantity: Decimal,
    pub avg_cost: Decimal,
    pub current_price: Decimal,
    pub market_value: Decimal,
    pub cost_basis: Decimal,
    pub unrealized_pnl: Decimal,
    pub unrealized_pnl_pct: Decimal,
}

impl UnrealizedPnl {
    /// Derive from a position snapshot. Values come from the snapshot, not
    /// from re-reading events.
    pub fn from_position(position: &Position, current_price: Decimal) -> Self {
        let market_value = position.total_quantity * current_price;
        let cost_basis = position.total_cost;
        let unrealized_pnl = market_value - cost_basis;
        let unrealized_pnl_pct = if cost_basis.is_positive() {
            (unrealized_pnl / cost_basis * Decimal::hundred()).round_dp(2)
        } else {
            Decimal::zero()
        };

        UnrealizedPnl {
            symbol: position.symbol.clone(),
            quantity: position.total_quantity,
            avg_cost: position.avg_cost_per_share,
            current_price,
            market_value,
            cost_basis,
            unrealized_pnl,
            unrealized_pnl_pct,
        }
    }
}

/// A user's portfolio; exclusively owns its events and derived rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(qty: &str, cost: &str, avg: &str) -> Position {
        Position {
            portfolio_id: Uuid::new_v4(),
            symbol: "2330".to_string(),
            total_quantity: Decimal::from_str_canonical(qty).unwrap(),
            total_cost: Decimal::from_str_canonical(cost).unwrap(),
            avg_cost_per_share: Decimal::from_str_canonical(avg).unwrap(),
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_unrealized_pnl_from_snapshot() {
        let pos = position("1000", "580826.50", "580.8265");
        let pnl =
            UnrealizedPnl::from_position(&pos, Decimal::from_str_canonical("600").unwrap());

        assert_eq!(
            pnl.market_value,
            Decimal::from_str_canonical("600000").unwrap()
        );
        assert_eq!(
            pnl.cost_basis,
            Decimal::from_str_canonical("580826.50").unwrap()
        );
        assert_eq!(
            pnl.unrealized_pnl,
            Decimal::from_str_canonical("19173.50").unwrap()
        );
        // 19173.50 / 580826.50 * 100 = 3.3010...
        assert_eq!(
            pnl.unrealized_pnl_pct,
            Decimal::from_str_canonical("3.30").unwrap()
        );
    }

    #[test]
    fn test_unrealized_pnl_zero_cost_basis() {
        let pos = position("1", "0", "0");
        let pnl = UnrealizedPnl::from_position(&pos, Decimal::from_str_canonical("10").unwrap());
        assert_eq!(pnl.unrealized_pnl, Decimal::from_str_canonical("10").unwrap());
        assert_eq!(pnl.unrealized_pnl_pct, Decimal::zero());
    }
}
