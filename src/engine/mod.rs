//! Pure computation: FIFO matching, position folding, the market clock and
//! indicator math. Nothing in here touches the database or the network.

pub mod clock;
pub mod fifo;
pub mod indicators;
pub mod projection;

pub use clock::{current_market_status, market_status_at};
pub use fifo::{match_sell, FifoError, LotMatch, OpenLot};
pub use projection::{fold_position, PositionTotals};
