//! Technical indicator math.
//!
//! All functions take chronologically ascending series and return vectors
//! aligned with the input; warm-up slots hold NaN and are elided by the
//! caller at the decimal boundary. f64 is used internally for speed, never
//! for stored or returned values.

pub mod bollinger;
pub mod kdj;
pub mod ma;
pub mod macd;
pub mod rsi;

pub use bollinger::bollinger;
pub use kdj::kdj;
pub use ma::{ema, sma};
pub use macd::macd;
pub use rsi::rsi;
