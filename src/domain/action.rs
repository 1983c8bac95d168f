//! Corporate actions, externally loaded and read-only to the core.

use crate::domain::Decimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorporateActionType {
    Dividend,
    StockDividend,
    Split,
    Rights,
    Merger,
}

impl CorporateActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorporateActionType::Dividend => "DIVIDEND",
            CorporateActionType::StockDividend => "STOCK_DIVIDEND",
            CorporateActionType::Split => "SPLIT",
            CorporateActionType::Rights => "RIGHTS",
            CorporateActionType::Merger => "MERGER",
        }
    }
}

impl fmt::Display for CorporateActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CorporateActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DIVIDEND" => Ok(CorporateActionType::Dividend),
            "STOCK_DIVIDEND" => Ok(CorporateActionType::StockDividend),
            "SPLIT" => Ok(CorporateActionType::Split),
            "RIGHTS" => Ok(CorporateActionType::Rights),
            "MERGER" => Ok(CorporateActionType::Merger),
            other => Err(format!("unknown corporate action type: {}", other)),
        }
    }
}

/// One announced corporate action.
///
/// When all dates are present they are ordered
/// announcement <= ex <= record <= payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorporateAction {
    pub id: Uuid,
    pub symbol: String,
    pub action_type: CorporateActionType,
    pub announcement_date: Option<NaiveDate>,
    pub ex_date: Option<NaiveDate>,
    pub record_date: Option<NaiveDate>,
    pub payment_date: Option<NaiveDate>,
    pub cash_dividend: Option<Decimal>,
    pub stock_dividend: Option<Decimal>,
    pub split_ratio: Option<Decimal>,
    pub rights_ratio: Option<Decimal>,
    pub subscription_price: Option<Decimal>,
    pub adjustment_factor: Option<Decimal>,
}

impl CorporateAction {
    /// Check the date-ordering invariant over whichever dates are present.
    pub fn dates_ordered(&self) -> bool {
        let dates = [
            self.announcement_date,
            self.ex_date,
            self.record_date,
            self.payment_date,
        ];
        let present: Vec<NaiveDate> = dates.into_iter().flatten().collect();
        present.windows(2).all(|w| w[0] <= w[1])
    }
}
