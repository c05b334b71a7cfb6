use std::time::Duration;

use futures::StreamExt;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_pubsub_client::nonblocking::pubsub_client::PubsubClient;
use solana_rpc_client_api::config::RpcSignatureSubscribeConfig;
use solana_rpc_client_api::response::RpcSignatureResult;
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_sdk::signature::Signature;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};

pub const CONFIRMATION_TIMEOUT_SECS: u64 = 30;
const POLL_INTERVAL_MS: u64 = 1_000;

/// Lifecycle of a submitted trade. Terminal states are sticky; a late
/// signal can never pull a trade back out of Confirmed or Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationState {
    Submitted,
    Pending,
    Confirmed,
    Failed,
    TimedOut,
}

impl ConfirmationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed | Self::TimedOut)
    }

    /// Applies `next` if the current state is not already terminal.
    pub fn transition(self, next: Self) -> Self {
        if self.is_terminal() {
            self
        } else {
            next
        }
    }
}

/// Outcome of a confirmation wait. `landed == false` means the window
/// closed without a verdict; the transaction may still land afterwards,
/// so a timeout is never reported as a failure.
#[derive(Debug, Clone)]
pub struct ConfirmationResult {
    pub signature: Signature,
    pub state: ConfirmationState,
    pub landed: bool,
    /// Commitment level the signature was observed at, when it landed.
    pub commitment: Option<CommitmentLevel>,
    pub elapsed: Duration,
    /// On-chain error text, only set when the transaction landed and failed.
    pub on_chain_error: Option<String>,
}

impl ConfirmationResult {
    /// Error form of a timed-out wait, for callers that would rather
    /// propagate than render a pending state.
    pub fn timeout_error(&self) -> Option<EngineError> {
        match self.state {
            ConfirmationState::TimedOut => Some(EngineError::ConfirmationTimeout {
                signature: self.signature.to_string(),
                elapsed_ms: self.elapsed.as_millis() as u64,
            }),
            _ => None,
        }
    }
}

/// Watches a signature until it reaches confirmed commitment, fails on
/// chain, or the timeout window closes. A websocket subscription (when a
/// ws url is configured) races the 1s status poll; whichever answers first
/// wins, and a broken subscription quietly degrades to polling alone.
pub struct ConfirmationTracker {
    ws_url: Option<String>,
    timeout: Duration,
}

impl ConfirmationTracker {
    pub fn new(ws_url: Option<String>) -> Self {
        Self {
            ws_url,
            timeout: Duration::from_secs(CONFIRMATION_TIMEOUT_SECS),
        }
    }

    #[cfg(test)]
    pub fn with_timeout(ws_url: Option<String>, timeout: Duration) -> Self {
        Self { ws_url, timeout }
    }

    pub async fn wait_for_confirmation(
        &self,
        rpc: &RpcClient,
        signature: &Signature,
    ) -> Result<ConfirmationResult> {
        let started = Instant::now();
        let verdict = timeout(self.timeout, async {
            tokio::select! {
                verdict = self.poll_for_verdict(rpc, signature) => verdict,
                verdict = self.subscribe_for_verdict(signature) => verdict,
            }
        })
        .await;

        let elapsed = started.elapsed();
        let result = match verdict {
            Ok(Verdict::Confirmed) => ConfirmationResult {
                signature: *signature,
                state: ConfirmationState::Submitted.transition(ConfirmationState::Confirmed),
                landed: true,
                commitment: Some(CommitmentLevel::Confirmed),
                elapsed,
                on_chain_error: None,
            },
            Ok(Verdict::Failed(error)) => ConfirmationResult {
                signature: *signature,
                state: ConfirmationState::Submitted.transition(ConfirmationState::Failed),
                landed: true,
                commitment: Some(CommitmentLevel::Confirmed),
                elapsed,
                on_chain_error: Some(error),
            },
            Err(_) => {
                debug!(signature = %signature, elapsed_ms = elapsed.as_millis() as u64,
                    "confirmation window closed without a verdict");
                ConfirmationResult {
                    signature: *signature,
                    state: ConfirmationState::Pending.transition(ConfirmationState::TimedOut),
                    landed: false,
                    commitment: None,
                    elapsed,
                    on_chain_error: None,
                }
            }
        };
        Ok(result)
    }

    async fn poll_for_verdict(&self, rpc: &RpcClient, signature: &Signature) -> Verdict {
        let mut ticker = interval(Duration::from_millis(POLL_INTERVAL_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match rpc.get_signature_statuses(&[*signature]).await {
                Ok(response) => {
                    if let Some(Some(status)) = response.value.into_iter().next() {
                        if let Some(error) = status.err {
                            return Verdict::Failed(error.to_string());
                        }
                        if status.satisfies_commitment(CommitmentConfig::confirmed()) {
                            return Verdict::Confirmed;
                        }
                    }
                }
                Err(e) => {
                    // Transient status-poll failures do not decide anything;
                    // the next tick tries again.
                    debug!(error = %e, "signature status poll failed");
                }
            }
        }
    }

    /// Resolves only when the subscription delivers a verdict. Any setup or
    /// stream failure parks this branch forever so the poll loop decides.
    async fn subscribe_for_verdict(&self, signature: &Signature) -> Verdict {
        let Some(ws_url) = &self.ws_url else {
            return futures::future::pending().await;
        };
        let client = match PubsubClient::new(ws_url).await {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "websocket connect failed, falling back to polling");
                return futures::future::pending().await;
            }
        };
        let config = RpcSignatureSubscribeConfig {
            commitment: Some(CommitmentConfig {
                commitment: CommitmentLevel::Confirmed,
            }),
            ..RpcSignatureSubscribeConfig::default()
        };
        let (mut stream, _unsubscribe) =
            match client.signature_subscribe(signature, Some(config)).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    warn!(error = %e, "signature subscribe failed, falling back to polling");
                    return futures::future::pending().await;
                }
            };
        while let Some(response) = stream.next().await {
            match response.value {
                RpcSignatureResult::ProcessedSignature(processed) => {
                    return match processed.err {
                        Some(error) => Verdict::Failed(error.to_string()),
                        None => Verdict::Confirmed,
                    };
                }
                // Received-only notifications carry no verdict.
                RpcSignatureResult::ReceivedSignature(_) => continue,
            }
        }
        warn!("signature subscription closed before a notification");
        futures::future::pending().await
    }
}

enum Verdict {
    Confirmed,
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_terminal_states_are_sticky() {
        let state = ConfirmationState::Confirmed;
        assert_eq!(
            state.transition(ConfirmationState::Failed),
            ConfirmationState::Confirmed
        );
        assert_eq!(
            ConfirmationState::Failed.transition(ConfirmationState::Confirmed),
            ConfirmationState::Failed
        );
        assert_eq!(
            ConfirmationState::TimedOut.transition(ConfirmationState::Confirmed),
            ConfirmationState::TimedOut
        );
    }

    #[test]
    fn test_pending_can_progress() {
        assert_eq!(
            ConfirmationState::Submitted.transition(ConfirmationState::Pending),
            ConfirmationState::Pending
        );
        assert_eq!(
            ConfirmationState::Pending.transition(ConfirmationState::Confirmed),
            ConfirmationState::Confirmed
        );
    }

    #[tokio::test]
    async fn test_timeout_is_not_a_failure() {
        // An unreachable RPC means polling never yields a verdict, so the
        // (shortened) window closes as TimedOut with landed == false.
        let tracker = ConfirmationTracker::with_timeout(None, Duration::from_millis(50));
        let rpc = RpcClient::new("http://127.0.0.1:1".to_string());
        let signature = Signature::default();
        let result = tracker
            .wait_for_confirmation(&rpc, &signature)
            .await
            .unwrap();
        assert_eq!(result.state, ConfirmationState::TimedOut);
        assert!(!result.landed);
        assert!(result.on_chain_error.is_none());
        assert!(matches!(
            result.timeout_error(),
            Some(EngineError::ConfirmationTimeout { .. })
        ));
    }
}
