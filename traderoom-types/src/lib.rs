pub mod events;

pub use events::{TradeEvent, TradeSide, TradeStatus};
