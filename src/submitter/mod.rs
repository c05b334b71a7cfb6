use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::config::RpcSendTransactionConfig;
use solana_sdk::message::VersionedMessage;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::VersionedTransaction;
use tracing::{debug, warn};

use crate::assembler::AssembledTransaction;
use crate::classifier;
use crate::error::{EngineError, Result};

const MAX_SEND_RETRIES: usize = 3;

/// Anything that can authorize a trade. The engine never touches key
/// material directly, so a wallet bridge or a remote signer can slot in
/// behind the same seam as the local keypair.
#[async_trait]
pub trait TradeSigner: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    /// Signs the serialized message bytes. A user declining in their wallet
    /// surfaces here as `EngineError::UserCancelled`.
    async fn sign_message(&self, message: &[u8]) -> Result<Signature>;
}

/// Local keypair signer, decoded from the base58 secret the settings carry.
pub struct KeypairSigner {
    keypair: Keypair,
}

impl KeypairSigner {
    pub fn from_base58(encoded: &str) -> Result<Self> {
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| EngineError::Signing(format!("invalid base58 private key: {}", e)))?;
        let keypair = Keypair::from_bytes(&bytes)
            .map_err(|e| EngineError::Signing(format!("invalid keypair bytes: {}", e)))?;
        Ok(Self { keypair })
    }

    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }
}

#[async_trait]
impl TradeSigner for KeypairSigner {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Signature> {
        Ok(self.keypair.sign_message(message))
    }
}

/// The signatures returned from submission. The auxiliary signature is
/// best-effort and its absence never fails the trade.
#[derive(Debug, Clone)]
pub struct SubmittedTrade {
    pub primary: Signature,
    pub auxiliary: Option<Signature>,
}

pub struct Submitter {
    send_config: RpcSendTransactionConfig,
}

impl Submitter {
    pub fn new() -> Self {
        Self {
            send_config: RpcSendTransactionConfig {
                skip_preflight: false,
                max_retries: Some(MAX_SEND_RETRIES),
                ..RpcSendTransactionConfig::default()
            },
        }
    }

    /// Signs and sends the primary transaction, then the auxiliary one if
    /// present. An auxiliary failure is logged and swallowed; the trade
    /// already went out.
    pub async fn submit(
        &self,
        rpc: &RpcClient,
        signer: &dyn TradeSigner,
        assembled: &AssembledTransaction,
    ) -> Result<SubmittedTrade> {
        let primary = self
            .sign_and_send(rpc, signer, assembled.primary.clone())
            .await?;
        debug!(signature = %primary, "primary transaction submitted");

        let mut auxiliary = None;
        if let Some(message) = &assembled.auxiliary {
            match self.sign_and_send(rpc, signer, message.clone()).await {
                Ok(signature) => {
                    debug!(signature = %signature, "auxiliary transaction submitted");
                    auxiliary = Some(signature);
                }
                Err(e) => {
                    warn!(error = %e, "auxiliary transaction failed, continuing without it");
                }
            }
        }

        Ok(SubmittedTrade { primary, auxiliary })
    }

    async fn sign_and_send(
        &self,
        rpc: &RpcClient,
        signer: &dyn TradeSigner,
        message: VersionedMessage,
    ) -> Result<Signature> {
        let signature = match signer.sign_message(&message.serialize()).await {
            Ok(signature) => signature,
            Err(e) if classifier::is_user_rejection(&e.to_string()) => {
                return Err(EngineError::UserCancelled);
            }
            Err(e) => return Err(e),
        };
        let transaction = VersionedTransaction {
            signatures: vec![signature],
            message,
        };

        rpc.send_transaction_with_config(&transaction, self.send_config)
            .await
            .map_err(|e| classifier::classify_client_error(&e).into_engine_error())
    }
}

impl Default for Submitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use solana_sdk::hash::Hash;
    use solana_sdk::message::Message;

    struct RejectingSigner {
        pubkey: Pubkey,
    }

    #[async_trait]
    impl TradeSigner for RejectingSigner {
        fn pubkey(&self) -> Pubkey {
            self.pubkey
        }

        async fn sign_message(&self, _message: &[u8]) -> Result<Signature> {
            Err(EngineError::Signing(
                "User rejected the request".to_string(),
            ))
        }
    }

    #[test]
    fn test_keypair_signer_round_trips_base58() {
        let keypair = Keypair::new();
        let encoded = bs58::encode(keypair.to_bytes()).into_string();
        let signer = KeypairSigner::from_base58(&encoded).unwrap();
        assert_eq!(signer.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_keypair_signer_rejects_garbage() {
        assert!(KeypairSigner::from_base58("not-base58-0OIl").is_err());
        // Valid base58 but wrong length.
        assert!(KeypairSigner::from_base58("3yZe7d").is_err());
    }

    #[tokio::test]
    async fn test_signature_verifies_against_message() {
        let keypair = Keypair::new();
        let signer = KeypairSigner::new(keypair.insecure_clone());
        let message =
            VersionedMessage::Legacy(Message::new_with_blockhash(&[], None, &Hash::default()));
        let bytes = message.serialize();
        let signature = signer.sign_message(&bytes).await.unwrap();
        assert!(signature.verify(keypair.pubkey().as_ref(), &bytes));
    }

    #[tokio::test]
    async fn test_wallet_rejection_maps_to_user_cancelled() {
        let submitter = Submitter::new();
        let rpc = RpcClient::new("http://127.0.0.1:1".to_string());
        let signer = RejectingSigner {
            pubkey: Pubkey::new_unique(),
        };
        let assembled = AssembledTransaction {
            primary: VersionedMessage::Legacy(Message::new_with_blockhash(
                &[],
                None,
                &Hash::default(),
            )),
            auxiliary: None,
        };
        let err = submitter
            .submit(&rpc, &signer, &assembled)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UserCancelled));
    }
}
