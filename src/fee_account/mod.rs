use dashmap::DashMap;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;
use tracing::{debug, warn};

/// Process-wide cache of platform-fee token accounts, keyed by mint.
///
/// An associated token account address is deterministic for a given
/// (owner, mint) pair, so entries are populated once and never invalidated;
/// only the account's existence is uncertain, and that is re-checked by the
/// downstream account queries, not by this cache. Concurrent population is
/// harmless because resolution is idempotent.
pub struct FeeAccountCache {
    recipient: Pubkey,
    entries: DashMap<Pubkey, Option<Pubkey>>,
}

impl FeeAccountCache {
    pub fn new(recipient: Pubkey) -> Self {
        Self {
            recipient,
            entries: DashMap::new(),
        }
    }

    pub fn recipient(&self) -> Pubkey {
        self.recipient
    }

    /// Resolves the fee recipient's token account for `mint`, validating
    /// owner and mint before first use. `None` means "charge the fee on the
    /// native leg instead" - either the recipient holds no account for this
    /// mint or the derived address holds something that is not it.
    pub async fn resolve(&self, rpc: &RpcClient, mint: &Pubkey) -> Option<Pubkey> {
        if let Some(entry) = self.entries.get(mint) {
            return *entry;
        }

        let ata = get_associated_token_address(&self.recipient, mint);
        let resolved = match rpc.get_token_account(&ata).await {
            Ok(Some(account)) => {
                let owner_ok = account.owner == self.recipient.to_string();
                let mint_ok = account.mint == mint.to_string();
                if owner_ok && mint_ok {
                    Some(ata)
                } else {
                    warn!(
                        %ata, %mint, account_owner = %account.owner,
                        "Derived fee account exists but fails owner/mint validation"
                    );
                    None
                }
            }
            Ok(None) => {
                debug!(%ata, %mint, "No fee token account for mint; falling back to native fee");
                None
            }
            Err(e) => {
                // Transport failure, not a verdict - leave the entry
                // unpopulated so a later attempt can try again.
                warn!(%ata, %mint, error = %e, "Fee account lookup failed; not caching");
                return None;
            }
        };

        self.entries.insert(*mint, resolved);
        resolved
    }

    #[cfg(test)]
    fn seed(&self, mint: Pubkey, value: Option<Pubkey>) {
        self.entries.insert(mint, value);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}
