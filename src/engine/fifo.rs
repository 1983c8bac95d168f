//! FIFO tax-lot matching.
//!
//! SELLs consume open lots oldest-first. Each consumption yields one match
//! carrying the realized P&L with the sell-side fees and taxes prorated by
//! matched-quantity weight.

use crate::domain::Decimal;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// An open lot as loaded from storage, in FIFO order.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenLot {
    pub id: Uuid,
    pub buy_event_id: Uuid,
    pub purchase_date: DateTime<Utc>,
    /// Fee-inclusive per-share cost (BUY total_amount / quantity).
    pub purchase_price: Decimal,
    pub remaining_quantity: Decimal,
}

/// One lot consumption produced by a SELL.
#[derive(Debug, Clone, PartialEq)]
pub struct LotMatch {
    pub lot_id: Uuid,
    pub buy_event_id: Uuid,
    pub purchase_date: DateTime<Utc>,
    pub buy_price: Decimal,
    pub quantity: Decimal,
    pub allocated_fee: Decimal,
    pub allocated_tax: Decimal,
    pub realized_pnl: Decimal,
}

#[derive(Debug, Error, PartialEq)]
pub enum FifoError {
    #[error("sell quantity {requested} exceeds open lots ({available} available)")]
    InsufficientQuantity {
        requested: Decimal,
        available: Decimal,
    },
}

/// Match a SELL against open lots in the order given (callers load lots
/// ascending by purchase date).
///
/// Fees and taxes are prorated across matches by matched-quantity weight;
/// the remainder after rounding lands on the final match so the totals are
/// preserved exactly.
pub fn match_sell(
    lots: &[OpenLot],
    sell_quantity: Decimal,
    sell_price: Decimal,
    sell_fee: Decimal,
    sell_tax: Decimal,
) -> Result<Vec<LotMatch>, FifoError> {
    let available = lots
        .iter()
        .fold(Decimal::zero(), |acc, lot| acc + lot.remaining_quantity);
    if sell_quantity > available {
        return Err(FifoError::InsufficientQuantity {
            requested: sell_quantity,
            available,
        });
    }

    let mut matches = Vec::new();
    let mut remaining = sell_quantity;
    let mut fee_allocated = Decimal::zero();
    let mut tax_allocated = Decimal::zero();

    for lot in lots {
        if remaining.is_zero() {
            break;
        }

        let matched = if lot.remaining_quantity < remaining {
            lot.remaining_quantity
        } else {
            remaining
        };
        remaining = remaining - matched;

        let (fee_share, tax_share) = if remaining.is_zero() {
            // Last match takes whatever is left of the totals.
            (sell_fee - fee_allocated, sell_tax - tax_allocated)
        } else {
            let weight = matched / sell_quantity;
            ((sell_fee * weight).round_dp(4), (sell_tax * weight).round_dp(4))
        };
        fee_allocated = fee_allocated + fee_share;
        tax_allocated = tax_allocated + tax_share;

        let realized = (sell_price - lot.purchase_price) * matched - fee_share - tax_share;

        matches.push(LotMatch {
            lot_id: lot.id,
            buy_event_id: lot.buy_event_id,
            purchase_date: lot.purchase_date,
            buy_price: lot.purchase_price,
            quantity: matched,
            allocated_fee: fee_share,
            allocated_tax: tax_share,
            realized_pnl: realized,
        });
    }

    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn lot(price: &str, remaining: &str, day: u32) -> OpenLot {
        OpenLot {
            id: Uuid::new_v4(),
            buy_event_id: Uuid::new_v4(),
            purchase_date: chrono::DateTime::parse_from_rfc3339(&format!(
                "2024-01-{:02}T01:00:00Z",
                day
            ))
            .unwrap()
            .with_timezone(&Utc),
            purchase_price: dec(price),
            remaining_quantity: dec(remaining),
        }
    }

    #[test]
    fn test_sell_matches_oldest_lot_first() {
        let lots = vec![lot("580.8265", "1000", 2), lot("590.842", "500", 3)];
        let matches = match_sell(&lots, dec("300"), dec("600"), dec("256.95"), dec("540")).unwrap();

        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.quantity, dec("300"));
        assert_eq!(m.buy_price, dec("580.8265"));
        assert_eq!(m.allocated_fee, dec("256.95"));
        assert_eq!(m.allocated_tax, dec("540"));
        // (600 - 580.8265) * 300 - 796.95 = 5752.05 - 796.95
        assert_eq!(m.realized_pnl, dec("4955.10"));
    }

    #[test]
    fn test_sell_spans_multiple_lots() {
        let lots = vec![lot("100", "300", 2), lot("110", "300", 3)];
        let matches = match_sell(&lots, dec("500"), dec("120"), dec("50"), dec("0")).unwrap();

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].quantity, dec("300"));
        assert_eq!(matches[1].quantity, dec("200"));

        // Matched quantities sum to the SELL quantity.
        let total: Decimal = matches
            .iter()
            .fold(Decimal::zero(), |acc, m| acc + m.quantity);
        assert_eq!(total, dec("500"));

        // Fee proration: 300/500 and 200/500 of 50, summing exactly.
        assert_eq!(matches[0].allocated_fee, dec("30"));
        assert_eq!(matches[1].allocated_fee, dec("20"));

        assert_eq!(matches[0].realized_pnl, dec("5970")); // (120-100)*300 - 30
        assert_eq!(matches[1].realized_pnl, dec("1980")); // (120-110)*200 - 20
    }

    #[test]
    fn test_fee_remainder_lands_on_last_match() {
        let lots = vec![lot("100", "1", 2), lot("100", "1", 3), lot("100", "1", 4)];
        let matches = match_sell(&lots, dec("3"), dec("110"), dec("10"), dec("0")).unwrap();

        let total_fee: Decimal = matches
            .iter()
            .fold(Decimal::zero(), |acc, m| acc + m.allocated_fee);
        assert_eq!(total_fee, dec("10"));
    }

    #[test]
    fn test_sell_exceeding_open_lots_rejected() {
        let lots = vec![lot("100", "300", 2)];
        let err = match_sell(&lots, dec("301"), dec("120"), dec("0"), dec("0")).unwrap_err();
        assert_eq!(
            err,
            FifoError::InsufficientQuantity {
                requested: dec("301"),
                available: dec("300"),
            }
        );
    }

    #[test]
    fn test_sell_exact_quantity_closes_everything() {
        let lots = vec![lot("100", "300", 2)];
        let matches = match_sell(&lots, dec("300"), dec("120"), dec("0"), dec("0")).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].quantity, dec("300"));
    }

    #[test]
    fn test_zero_price_lot_accepted() {
        let lots = vec![lot("0", "1", 2)];
        let matches = match_sell(&lots, dec("1"), dec("5"), dec("0"), dec("0")).unwrap();
        assert_eq!(matches[0].realized_pnl, dec("5"));
    }
}
