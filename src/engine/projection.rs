//! Position projection: deterministic fold of a (portfolio, symbol) event
//! stream into current totals.

use crate::domain::{Decimal, EventType, LedgerEvent};

/// Folded position totals. `None` from [`fold_position`] means no open
/// position (quantity <= 0) and the materialized row should be absent.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionTotals {
    pub total_quantity: Decimal,
    pub total_cost: Decimal,
    pub avg_cost_per_share: Decimal,
}

/// Fold events (chronologically ascending) into position totals.
///
/// BUY adds quantity and total_amount; SELL removes both; SPLIT scales the
/// quantity by payload.ratio; RIGHTS behaves like a BUY; DIVIDEND never
/// moves the position; CORRECTION applies its explicit payload deltas.
pub fn fold_position(events: &[LedgerEvent]) -> Option<PositionTotals> {
    let mut quantity = Decimal::zero();
    let mut cost = Decimal::zero();

    for event in events {
        match event.event_type {
            EventType::Buy | EventType::Rights => {
                quantity = quantity + event.quantity;
                cost = cost + event.total_amount;
            }
            EventType::Sell => {
                quantity = quantity - event.quantity;
                cost = cost - event.total_amount;
            }
            EventType::Split => {
                if let Some(ratio) = event.split_ratio() {
                    if ratio.is_positive() {
                        quantity = quantity * ratio;
                    }
                }
            }
            EventType::Dividend => {}
            EventType::Correction => {
                if let Some(delta) = event.correction_quantity_delta() {
                    quantity = quantity + delta;
                }
                if let Some(delta) = event.correction_cost_delta() {
                    cost = cost + delta;
                }
            }
        }
    }

    if !quantity.is_positive() {
        return None;
    }

    Some(PositionTotals {
        total_quantity: quantity,
        total_cost: cost,
        avg_cost_per_share: cost / quantity,
    })
}
