use std::fmt;
use thiserror::Error;

mod utils;
pub use utils::*;

/// Engine-wide error type. Every failure a trade attempt can hit is
/// classified into one of these before it reaches the caller; lower layers
/// never swallow errors silently.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidSettings(String),

    #[error("Quote failed: {0}")]
    QuoteFailed(String),

    #[error("Malformed transaction: {0}")]
    TransactionMalformed(String),

    #[error("Blockhash unavailable after {attempts} attempts: {last_error}")]
    BlockhashUnavailable { attempts: u32, last_error: String },

    #[error("Submission rejected: {kind} - {message}")]
    SubmissionRejected {
        kind: SwapFailureKind,
        message: String,
    },

    #[error("Swap program failed with code {code:#x}: {message}")]
    ProgramError { code: u64, message: String },

    #[error("Transaction {signature} unconfirmed after {elapsed_ms}ms; check an explorer")]
    ConfirmationTimeout { signature: String, elapsed_ms: u64 },

    #[error("User declined to sign the transaction")]
    UserCancelled,

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Solana RPC error: {0}")]
    SolanaRpc(String),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Closed taxonomy of user-facing swap failure causes (see `classifier`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwapFailureKind {
    InsufficientFunds,
    SlippageExceeded,
    MissingTokenLedger,
    IncompatibleFeeTokenProgram,
    OutputAmountMismatch,
    InvalidTokenAccount,
    AccessRestricted,
    Connectivity,
    Cancelled,
    SimulationFailed,
    Unknown,
}

impl fmt::Display for SwapFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientFunds => write!(f, "Insufficient funds"),
            Self::SlippageExceeded => write!(f, "Slippage tolerance exceeded"),
            Self::MissingTokenLedger => write!(f, "Missing token ledger"),
            Self::IncompatibleFeeTokenProgram => write!(f, "Incompatible fee token program"),
            Self::OutputAmountMismatch => write!(f, "Output amount mismatch"),
            Self::InvalidTokenAccount => write!(f, "Invalid token account"),
            Self::AccessRestricted => write!(f, "RPC access restricted"),
            Self::Connectivity => write!(f, "Blockchain connection failed"),
            Self::Cancelled => write!(f, "Cancelled by user"),
            Self::SimulationFailed => write!(f, "Transaction simulation failed"),
            Self::Unknown => write!(f, "Unknown swap failure"),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn submission(kind: SwapFailureKind, message: impl Into<String>) -> Self {
        EngineError::SubmissionRejected {
            kind,
            message: message.into(),
        }
    }

    pub fn rpc(message: impl Into<String>) -> Self {
        EngineError::SolanaRpc(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        EngineError::Internal(message.into())
    }

    /// Whether retrying the same operation could plausibly succeed.
    /// Quote failures are deliberately not retryable: a stale quote must be
    /// re-fetched by the caller, never replayed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::SolanaRpc(_)
                | EngineError::SubmissionRejected {
                    kind: SwapFailureKind::Connectivity,
                    ..
                }
        )
    }

    /// A user rejection is a silent outcome, not a failure toast.
    pub fn is_user_cancelled(&self) -> bool {
        matches!(self, EngineError::UserCancelled)
            || matches!(
                self,
                EngineError::SubmissionRejected {
                    kind: SwapFailureKind::Cancelled,
                    ..
                }
            )
    }

    /// A confirmation timeout means "pending, check explorer" - the
    /// transaction may still land.
    pub fn is_pending(&self) -> bool {
        matches!(self, EngineError::ConfirmationTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_helper() {
        let err = EngineError::submission(SwapFailureKind::SlippageExceeded, "0x1771");
        assert!(matches!(
            err,
            EngineError::SubmissionRejected {
                kind: SwapFailureKind::SlippageExceeded,
                ..
            }
        ));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(EngineError::rpc("connection reset").is_retryable());
        assert!(!EngineError::QuoteFailed("no route".into()).is_retryable());
        assert!(!EngineError::TransactionMalformed("bad base64".into()).is_retryable());
    }

    #[test]
    fn test_user_cancel_is_silent() {
        assert!(EngineError::UserCancelled.is_user_cancelled());
        assert!(
            EngineError::submission(SwapFailureKind::Cancelled, "user rejected the request")
                .is_user_cancelled()
        );
        assert!(!EngineError::UserCancelled.is_retryable());
    }

    #[test]
    fn test_timeout_is_pending_not_failed() {
        let err = EngineError::ConfirmationTimeout {
            signature: "sig".into(),
            elapsed_ms: 30_000,
        };
        assert!(err.is_pending());
        assert!(!err.is_retryable());
    }
}
