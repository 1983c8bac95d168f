//! Domain value types shared across the service.

pub mod action;
pub mod bar;
pub mod decimal;
pub mod event;
pub mod position;
pub mod quote;
pub mod symbol;

pub use action::{CorporateAction, CorporateActionType};
pub use bar::{OhlcvBar, Timeframe};
pub use decimal::Decimal;
pub use event::{EventType, LedgerEvent, RecordEventRequest};
pub use position::{Portfolio, Position, RealizedPnl, TaxLot, UnrealizedPnl};
pub use quote::{MarketState, MarketStatus, OrderBook, OrderBookLevel, RealtimeQuote};
pub use symbol::{MarketSegment, Symbol, SymbolParseError};
