use once_cell::sync::Lazy;
use solana_rpc_client_api::client_error::{Error as ClientError, ErrorKind as ClientErrorKind};
use solana_rpc_client_api::request::{RpcError, RpcResponseErrorData};
use std::collections::HashMap;

use crate::error::{EngineError, SwapFailureKind};

/// The aggregator's on-chain program; its failure log line carries the
/// custom error code we classify on.
pub const AGGREGATOR_PROGRAM_ID: &str = "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4";

/// Known custom error codes of the aggregator program (plus the system
/// program's insufficient-funds code 0x1). Anything else becomes a generic
/// "swap program failed with code X" that keeps the raw code visible.
static KNOWN_CODES: Lazy<HashMap<u64, SwapFailureKind>> = Lazy::new(|| {
    HashMap::from([
        (0x1, SwapFailureKind::InsufficientFunds),
        (0x1771, SwapFailureKind::SlippageExceeded),
        (0x177d, SwapFailureKind::MissingTokenLedger),
        (0x177e, SwapFailureKind::IncompatibleFeeTokenProgram),
        (0x1781, SwapFailureKind::OutputAmountMismatch),
        (0x1788, SwapFailureKind::InvalidTokenAccount),
    ])
});

const USER_REJECTION_PHRASES: &[&str] = &[
    "user rejected",
    "rejected the request",
    "user declined",
    "approval denied",
    "transaction cancelled",
];

/// A raw failure after classification: a closed kind, a message fit for a
/// user, and the original error text for diagnostics.
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    pub kind: SwapFailureKind,
    pub message: String,
    pub raw: String,
    /// Program custom error code, when one was parsed from the logs.
    pub code: Option<u64>,
}

impl ClassifiedError {
    pub fn into_engine_error(self) -> EngineError {
        match (self.kind, self.code) {
            (SwapFailureKind::Cancelled, _) => EngineError::UserCancelled,
            (SwapFailureKind::Unknown, Some(code)) => EngineError::ProgramError {
                code,
                message: self.message,
            },
            (kind, _) => EngineError::submission(kind, self.message),
        }
    }
}

/// Layered best-effort classification: a program error code from the logs
/// wins over substring matching on the message, which wins over the generic
/// fallback.
pub fn classify(raw_message: &str, logs: Option<&[String]>) -> ClassifiedError {
    if let Some(code) = logs.and_then(extract_program_error_code) {
        let (kind, message) = match KNOWN_CODES.get(&code) {
            Some(kind) => (*kind, kind.to_string()),
            None => (
                SwapFailureKind::Unknown,
                format!("Swap program failed with code {:#x}", code),
            ),
        };
        return ClassifiedError {
            kind,
            message,
            raw: raw_message.to_string(),
            code: Some(code),
        };
    }

    if let Some(kind) = match_substring(raw_message) {
        return ClassifiedError {
            kind,
            message: kind.to_string(),
            raw: raw_message.to_string(),
            code: None,
        };
    }

    ClassifiedError {
        kind: SwapFailureKind::Unknown,
        message: format!("Swap failed: {}", raw_message),
        raw: raw_message.to_string(),
        code: None,
    }
}

/// Classifies an RPC client failure from transaction submission, pulling
/// simulation logs out of a preflight failure when they are present.
pub fn classify_client_error(error: &ClientError) -> ClassifiedError {
    let logs = preflight_logs(error);
    classify(&error.to_string(), logs.as_deref())
}

pub fn is_user_rejection(message: &str) -> bool {
    let lower = message.to_lowercase();
    USER_REJECTION_PHRASES
        .iter()
        .any(|phrase| lower.contains(phrase))
}

fn preflight_logs(error: &ClientError) -> Option<Vec<String>> {
    if let ClientErrorKind::RpcError(RpcError::RpcResponseError {
        data: RpcResponseErrorData::SendTransactionPreflightFailure(simulation),
        ..
    }) = &error.kind
    {
        return simulation.logs.clone();
    }
    None
}

/// Finds the aggregator program's failure line and parses its hex error
/// code, e.g. `Program JUP6... failed: custom program error: 0x1771`.
fn extract_program_error_code(logs: &[String]) -> Option<u64> {
    for line in logs {
        // Only the aggregator's own failure line; other programs share the
        // same custom error code space and must not hit this table.
        if !line.contains(AGGREGATOR_PROGRAM_ID) || !line.contains("custom program error") {
            continue;
        }
        if let Some(position) = line.rfind("0x") {
            let hex = line[position + 2..]
                .chars()
                .take_while(|c| c.is_ascii_hexdigit())
                .collect::<String>();
            if let Ok(code) = u64::from_str_radix(&hex, 16) {
                return Some(code);
            }
        }
    }
    None
}

fn match_substring(message: &str) -> Option<SwapFailureKind> {
    let lower = message.to_lowercase();
    if is_user_rejection(&lower) {
        Some(SwapFailureKind::Cancelled)
    } else if lower.contains("403") || lower.contains("forbidden") {
        Some(SwapFailureKind::AccessRestricted)
    } else if lower.contains("blockhash") {
        Some(SwapFailureKind::Connectivity)
    } else if lower.contains("insufficient") {
        Some(SwapFailureKind::InsufficientFunds)
    } else if lower.contains("simulation failed") {
        Some(SwapFailureKind::SimulationFailed)
    } else {
        None
    }
}
