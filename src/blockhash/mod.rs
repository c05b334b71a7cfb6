use parking_lot::RwLock;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::error::{retry_with_backoff, EngineError, Result};

/// Attempts before giving up on the chain entirely.
const MAX_ATTEMPTS: u32 = 3;
/// First backoff delay; doubles per attempt (1s, 2s).
const BASE_DELAY_MS: u64 = 1_000;
/// Age past which a hash fetched at assembly time should be replaced
/// immediately before signing.
const STALE_AFTER_SECS: u64 = 10;

/// Round-robin pool over a fixed set of RPC connections. Index advancement
/// is the only mutation; the clients themselves are stateless once built.
pub struct RpcPool {
    clients: Vec<Arc<RpcClient>>,
    next: AtomicUsize,
}

impl RpcPool {
    pub fn new(urls: &[String], commitment: CommitmentConfig) -> Result<Self> {
        if urls.is_empty() {
            return Err(EngineError::InvalidSettings(
                "RPC pool needs at least one url".to_string(),
            ));
        }
        let clients = urls
            .iter()
            .map(|url| Arc::new(RpcClient::new_with_commitment(url.clone(), commitment)))
            .collect();
        Ok(Self {
            clients,
            next: AtomicUsize::new(0),
        })
    }

    pub fn client(&self) -> Arc<RpcClient> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        self.clients[index].clone()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

struct CachedBlockhash {
    hash: Hash,
    fetched_at: Instant,
}

/// Fetches recent blockhashes with bounded retry, tracking the age of the
/// last hash so the engine can refresh right before signing.
pub struct BlockhashProvider {
    pool: Arc<RpcPool>,
    last: RwLock<Option<CachedBlockhash>>,
}

impl BlockhashProvider {
    pub fn new(pool: Arc<RpcPool>) -> Self {
        Self {
            pool,
            last: RwLock::new(None),
        }
    }

    /// Fresh blockhash plus the connection that produced it, retried up to
    /// `MAX_ATTEMPTS` with exponential backoff. Exhaustion is a fatal
    /// blockchain-connection failure carrying the last cause.
    pub async fn latest(&self) -> Result<(Hash, Arc<RpcClient>)> {
        let result = retry_with_backoff(
            || async {
                let client = self.pool.client();
                match client.get_latest_blockhash().await {
                    Ok(hash) => Ok((hash, client)),
                    Err(e) => Err(EngineError::rpc(format!(
                        "Failed to get latest blockhash: {}",
                        e
                    ))),
                }
            },
            MAX_ATTEMPTS,
            BASE_DELAY_MS,
        )
        .await;

        match result {
            Ok((hash, client)) => {
                debug!(%hash, "Fetched recent blockhash");
                *self.last.write() = Some(CachedBlockhash {
                    hash,
                    fetched_at: Instant::now(),
                });
                Ok((hash, client))
            }
            Err(e) => Err(EngineError::BlockhashUnavailable {
                attempts: MAX_ATTEMPTS,
                last_error: e.to_string(),
            }),
        }
    }

    /// Whether enough time has passed since the last fetch that signing with
    /// it would court a blockhash-expiry failure.
    pub fn is_stale(&self) -> bool {
        match &*self.last.read() {
            Some(cached) => cached.fetched_at.elapsed().as_secs() >= STALE_AFTER_SECS,
            None => true,
        }
    }

    /// Last fetched hash, if any. Callers wanting freshness go through
    /// `latest()`; this exists for logging and tests.
    pub fn cached(&self) -> Option<Hash> {
        self.last.read().as_ref().map(|c| c.hash)
    }
}
