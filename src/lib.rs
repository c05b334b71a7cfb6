// Public modules that are part of the API
pub mod aggregator;
pub mod assembler;
pub mod blockhash;
pub mod classifier;
pub mod config;
pub mod confirmation;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod fee_account;
pub mod instructions;
pub mod monitoring;
pub mod submitter;

// Re-export common types
pub use engine::{
    ChannelRecorder,
    SwapEngine,
    TradeOutcome,
    TradeRecorder,
    TradeRequest,
    WSOL_MINT,
};

pub use submitter::{KeypairSigner, TradeSigner};

pub use error::{EngineError, Result, SwapFailureKind};

pub use traderoom_types::{TradeEvent, TradeSide, TradeStatus};
