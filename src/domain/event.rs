//! Ledger event types: the append-only source of truth for portfolio actions.

use crate::domain::Decimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of ledger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Buy,
    Sell,
    Dividend,
    Split,
    Rights,
    Correction,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Buy => "BUY",
            EventType::Sell => "SELL",
            EventType::Dividend => "DIVIDEND",
            EventType::Split => "SPLIT",
            EventType::Rights => "RIGHTS",
            EventType::Correction => "CORRECTION",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(EventType::Buy),
            "SELL" => Ok(EventType::Sell),
            "DIVIDEND" => Ok(EventType::Dividend),
            "SPLIT" => Ok(EventType::Split),
            "RIGHTS" => Ok(EventType::Rights),
            "CORRECTION" => Ok(EventType::Correction),
            other => Err(format!("unknown event type: {}", other)),
        }
    }
}

/// An immutable record of a portfolio action. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub event_id: Uuid,
    pub portfolio_id: Uuid,
    pub event_type: EventType,
    pub symbol: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
    pub tax: Decimal,
    /// Signed total. BUY: outflow stored positive; SELL: net inflow.
    pub total_amount: Decimal,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl LedgerEvent {
    /// SPLIT ratio carried in the payload, e.g. `{"ratio": 2}`.
    pub fn split_ratio(&self) -> Option<Decimal> {
        self.payload
            .as_ref()
            .and_then(|p| p.get("ratio"))
            .and_then(payload_decimal)
    }

    /// Signed quantity adjustment carried by a CORRECTION payload.
    pub fn correction_quantity_delta(&self) -> Option<Decimal> {
        self.payload
            .as_ref()
            .and_then(|p| p.get("quantity_delta"))
            .and_then(payload_decimal)
    }

    /// Signed cost adjustment carried by a CORRECTION payload.
    pub fn correction_cost_delta(&self) -> Option<Decimal> {
        self.payload
            .as_ref()
            .and_then(|p| p.get("cost_delta"))
            .and_then(payload_decimal)
    }
}

fn payload_decimal(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) => Decimal::from_str_canonical(s).ok(),
        serde_json::Value::Number(n) => Decimal::from_str_canonical(&n.to_string()).ok(),
        _ => None,
    }
}

/// Request body for recording a new event. The event type arrives as a raw
/// string so the ledger can reject unknown kinds as validation failures.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordEventRequest {
    pub portfolio_id: Uuid,
    pub event_type: String,
    pub symbol: String,
    pub quantity: Decimal,
    pub price: Decimal,
    #[serde(default)]
    pub fee: Decimal,
    #[serde(default)]
    pub tax: Decimal,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}
