use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a room trade relative to the room's token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// SOL in, room token out.
    Buy,
    /// Room token in, SOL out.
    Sell,
}

/// Final visibility of a trade as far as the chat layer is concerned.
///
/// `Unconfirmed` is not a failure: the transaction was broadcast but the
/// confirmation wait elapsed, so the UI should point at an explorer link
/// instead of rendering an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Confirmed,
    Unconfirmed,
}

/// A chat-visible trade record, emitted once per landed swap.
///
/// The price-subscription layer and the room UI both consume these; the
/// engine only produces them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    pub trade_id: Uuid,
    /// Mint of the token the room is about.
    pub room_mint: String,
    pub side: TradeSide,
    pub signature: String,
    /// Input amount in the input mint's smallest unit.
    pub input_amount: u64,
    /// Output amount in the output mint's smallest unit.
    pub output_amount: u64,
    /// Platform fee actually charged, in lamports.
    pub fee_lamports: u64,
    pub status: TradeStatus,
    pub timestamp: DateTime<Utc>,
}
