pub mod analysis;
pub mod api;
pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod realtime;
pub mod sync;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Decimal, EventType, LedgerEvent, MarketStatus, OhlcvBar, Position, RealtimeQuote, Symbol,
    Timeframe,
};
pub use error::AppError;
