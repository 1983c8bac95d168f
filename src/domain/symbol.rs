//! Stock symbol newtype with Taiwan exchange suffix handling.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Exchange segment a symbol trades on.
///
/// Listed (TSE) unless the input carried a `.TWO` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MarketSegment {
    #[default]
    Tse,
    Otc,
}

impl MarketSegment {
    /// Segment prefix used by the realtime quote endpoint.
    pub fn ex_prefix(&self) -> &'static str {
        match self {
            MarketSegment::Tse => "tse",
            MarketSegment::Otc => "otc",
        }
    }
}

/// A Taiwan stock symbol: a 4-6 digit numeric code plus the segment it
/// trades on. Suffixes (`.TW`, `.TWO`) are accepted on input and stripped;
/// storage and joins use the bare code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    code: String,
    segment: MarketSegment,
}

impl Symbol {
    /// The bare numeric code (e.g. "2330").
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn segment(&self) -> MarketSegment {
        self.segment
    }

    /// The `ex_ch` token for the realtime endpoint, e.g. "tse_2330.tw".
    pub fn ex_ch(&self) -> String {
        format!("{}_{}.tw", self.segment.ex_prefix(), self.code)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

impl FromStr for Symbol {
    type Err = SymbolParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SymbolParseError::Empty);
        }

        let (core, segment) = if let Some(core) = s.strip_suffix(".TWO") {
            (core, MarketSegment::Otc)
        } else if let Some(core) = s.strip_suffix(".TW") {
            (core, MarketSegment::Tse)
        } else {
            (s, MarketSegment::Tse)
        };

        if core.len() < 4 || core.len() > 6 {
            return Err(SymbolParseError::InvalidLength(core.len()));
        }
        if !core.chars().all(|c| c.is_ascii_digit()) {
            return Err(SymbolParseError::NonNumeric);
        }

        Ok(Symbol {
            code: core.to_string(),
            segment,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolParseError {
    #[error("symbol cannot be empty")]
    Empty,
    #[error("symbol code must be 4-6 digits, got {0} characters")]
    InvalidLength(usize),
    #[error("symbol code must be numeric")]
    NonNumeric,
}
