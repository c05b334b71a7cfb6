use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::address_lookup_table::state::AddressLookupTable;
use solana_sdk::address_lookup_table::AddressLookupTableAccount;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::message::{v0, Message, MessageHeader, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::{Transaction, VersionedTransaction};
use std::str::FromStr;
use tracing::debug;

use crate::aggregator::SwapTransactionPayload;
use crate::error::{EngineError, Result};

/// An aggregator transaction after decoding, with the wire format decided
/// exactly once. Downstream stages carry this tag instead of re-sniffing
/// the payload.
#[derive(Debug, Clone)]
pub enum DecodedTransaction {
    Legacy {
        instructions: Vec<Instruction>,
    },
    Versioned {
        instructions: Vec<Instruction>,
        lookup_tables: Vec<AddressLookupTableAccount>,
    },
}

impl DecodedTransaction {
    pub fn instructions(&self) -> &[Instruction] {
        match self {
            Self::Legacy { instructions } => instructions,
            Self::Versioned { instructions, .. } => instructions,
        }
    }

    pub fn lookup_tables(&self) -> &[AddressLookupTableAccount] {
        match self {
            Self::Legacy { .. } => &[],
            Self::Versioned { lookup_tables, .. } => lookup_tables,
        }
    }

    pub fn is_versioned(&self) -> bool {
        matches!(self, Self::Versioned { .. })
    }
}

/// Decodes the aggregator's base64 transaction payload. Versioned format is
/// attempted first, then legacy; if both fail the payload is malformed and
/// the trade attempt is dead (no retry will fix bad bytes).
///
/// For versioned messages every referenced lookup table - from the message
/// itself or from the aggregator's hint list - is fetched and the message is
/// decompiled into an explicit instruction list that later stages reason
/// about and re-compile.
pub async fn decode(rpc: &RpcClient, payload: &SwapTransactionPayload) -> Result<DecodedTransaction> {
    let bytes = BASE64_STANDARD
        .decode(&payload.swap_transaction)
        .map_err(|e| EngineError::TransactionMalformed(format!("invalid base64: {}", e)))?;

    match bincode::deserialize::<VersionedTransaction>(&bytes) {
        Ok(tx) => match tx.message {
            VersionedMessage::V0(message) => {
                let table_keys = collect_table_keys(&message, &payload.lookup_table_addresses)?;
                let lookup_tables = resolve_lookup_tables(rpc, &table_keys).await?;
                let instructions = decompile_v0(&message, &lookup_tables)?;
                debug!(
                    instruction_count = instructions.len(),
                    table_count = lookup_tables.len(),
                    "Decoded versioned swap transaction"
                );
                Ok(DecodedTransaction::Versioned {
                    instructions,
                    lookup_tables,
                })
            }
            VersionedMessage::Legacy(message) => {
                let instructions = decompile_legacy(&message)?;
                debug!(
                    instruction_count = instructions.len(),
                    "Decoded legacy swap transaction"
                );
                Ok(DecodedTransaction::Legacy { instructions })
            }
        },
        Err(versioned_err) => match bincode::deserialize::<Transaction>(&bytes) {
            Ok(tx) => {
                let instructions = decompile_legacy(&tx.message)?;
                Ok(DecodedTransaction::Legacy { instructions })
            }
            Err(legacy_err) => Err(EngineError::TransactionMalformed(format!(
                "not decodable as versioned ({}) or legacy ({})",
                versioned_err, legacy_err
            ))),
        },
    }
}

/// Union of the tables the message references and the aggregator's hint
/// list, deduplicated in first-seen order.
fn collect_table_keys(message: &v0::Message, hints: &[String]) -> Result<Vec<Pubkey>> {
    let mut keys: Vec<Pubkey> = message
        .address_table_lookups
        .iter()
        .map(|lookup| lookup.account_key)
        .collect();

    for hint in hints {
        let key = Pubkey::from_str(hint).map_err(|e| {
            EngineError::TransactionMalformed(format!(
                "aggregator hinted an invalid lookup table address '{}': {}",
                hint, e
            ))
        })?;
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    Ok(keys)
}

async fn resolve_lookup_tables(
    rpc: &RpcClient,
    keys: &[Pubkey],
) -> Result<Vec<AddressLookupTableAccount>> {
    let mut tables = Vec::with_capacity(keys.len());
    for key in keys {
        let account = rpc.get_account(key).await.map_err(|e| {
            EngineError::TransactionMalformed(format!(
                "referenced lookup table {} not found on-chain: {}",
                key, e
            ))
        })?;
        let table = AddressLookupTable::deserialize(&account.data).map_err(|e| {
            EngineError::TransactionMalformed(format!(
                "failed to deserialize lookup table {}: {}",
                key, e
            ))
        })?;
        tables.push(AddressLookupTableAccount {
            key: *key,
            addresses: table.addresses.to_vec(),
        });
    }
    Ok(tables)
}

// Writability of a static message key, from the header alone. The runtime's
// rule: signers are writable unless in the readonly-signed tail, non-signers
// are writable unless in the readonly-unsigned tail.
fn is_writable_index(header: &MessageHeader, num_static_keys: usize, index: usize) -> bool {
    let num_signed = header.num_required_signatures as usize;
    if index < num_signed {
        index < num_signed.saturating_sub(header.num_readonly_signed_accounts as usize)
    } else {
        index < num_static_keys.saturating_sub(header.num_readonly_unsigned_accounts as usize)
    }
}

fn decompile_legacy(message: &Message) -> Result<Vec<Instruction>> {
    let keys = &message.account_keys;
    message
        .instructions
        .iter()
        .map(|compiled| {
            let program_id = *keys.get(compiled.program_id_index as usize).ok_or_else(|| {
                EngineError::TransactionMalformed("program id index out of range".to_string())
            })?;
            let accounts = compiled
                .accounts
                .iter()
                .map(|&index| {
                    let index = index as usize;
                    let pubkey = *keys.get(index).ok_or_else(|| {
                        EngineError::TransactionMalformed(
                            "account index out of range".to_string(),
                        )
                    })?;
                    Ok(AccountMeta {
                        pubkey,
                        is_signer: index < message.header.num_required_signatures as usize,
                        is_writable: is_writable_index(&message.header, keys.len(), index),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Instruction {
                program_id,
                accounts,
                data: compiled.data.clone(),
            })
        })
        .collect()
}

/// Expands a v0 message back into explicit instructions. The combined key
/// array follows the loading order the runtime uses: static keys, then every
/// table's writable addresses, then every table's readonly addresses.
fn decompile_v0(
    message: &v0::Message,
    tables: &[AddressLookupTableAccount],
) -> Result<Vec<Instruction>> {
    let num_static = message.account_keys.len();
    let mut combined: Vec<(Pubkey, bool)> = message
        .account_keys
        .iter()
        .enumerate()
        .map(|(i, key)| (*key, is_writable_index(&message.header, num_static, i)))
        .collect();

    let mut loaded_writable = Vec::new();
    let mut loaded_readonly = Vec::new();
    for lookup in &message.address_table_lookups {
        let table = tables
            .iter()
            .find(|t| t.key == lookup.account_key)
            .ok_or_else(|| {
                EngineError::TransactionMalformed(format!(
                    "message references unresolved lookup table {}",
                    lookup.account_key
                ))
            })?;
        for &index in &lookup.writable_indexes {
            let address = *table.addresses.get(index as usize).ok_or_else(|| {
                EngineError::TransactionMalformed(format!(
                    "lookup table {} has no entry at index {}",
                    lookup.account_key, index
                ))
            })?;
            loaded_writable.push(address);
        }
        for &index in &lookup.readonly_indexes {
            let address = *table.addresses.get(index as usize).ok_or_else(|| {
                EngineError::TransactionMalformed(format!(
                    "lookup table {} has no entry at index {}",
                    lookup.account_key, index
                ))
            })?;
            loaded_readonly.push(address);
        }
    }
    combined.extend(loaded_writable.into_iter().map(|key| (key, true)));
    combined.extend(loaded_readonly.into_iter().map(|key| (key, false)));

    message
        .instructions
        .iter()
        .map(|compiled| {
            let (program_id, _) =
                *combined.get(compiled.program_id_index as usize).ok_or_else(|| {
                    EngineError::TransactionMalformed(
                        "program id index out of range".to_string(),
                    )
                })?;
            let accounts = compiled
                .accounts
                .iter()
                .map(|&index| {
                    let index = index as usize;
                    let (pubkey, is_writable) = *combined.get(index).ok_or_else(|| {
                        EngineError::TransactionMalformed(
                            "account index out of range".to_string(),
                        )
                    })?;
                    Ok(AccountMeta {
                        pubkey,
                        is_signer: index < message.header.num_required_signatures as usize,
                        is_writable,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Instruction {
                program_id,
                accounts,
                data: compiled.data.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use solana_sdk::hash::Hash;
    use solana_sdk::signature::Signature;
    use solana_sdk::system_instruction;

    fn offline_rpc() -> RpcClient {
        // Never contacted in these tests; decoding without lookup tables
        // performs no network calls.
        RpcClient::new("http://127.0.0.1:1".to_string())
    }

    fn payload_from_tx(tx: &VersionedTransaction) -> SwapTransactionPayload {
        SwapTransactionPayload {
            swap_transaction: BASE64_STANDARD.encode(bincode::serialize(tx).unwrap()),
            last_valid_block_height: None,
            lookup_table_addresses: vec![],
        }
    }

    fn sample_instructions(payer: &Pubkey) -> Vec<Instruction> {
        vec![
            system_instruction::transfer(payer, &Pubkey::new_unique(), 1_000),
            system_instruction::transfer(payer, &Pubkey::new_unique(), 2_000),
        ]
    }

    #[tokio::test]
    async fn test_legacy_payload_keeps_its_format_tag() {
        let payer = Pubkey::new_unique();
        let ixs = sample_instructions(&payer);
        let message = Message::new_with_blockhash(&ixs, Some(&payer), &Hash::new_unique());
        let tx = VersionedTransaction {
            signatures: vec![Signature::default()],
            message: VersionedMessage::Legacy(message),
        };

        let decoded = decode(&offline_rpc(), &payload_from_tx(&tx)).await.unwrap();
        assert!(!decoded.is_versioned());
        assert_eq!(decoded.instructions(), &ixs[..]);
    }

    #[tokio::test]
    async fn test_versioned_payload_without_tables() {
        let payer = Pubkey::new_unique();
        let ixs = sample_instructions(&payer);
        let message =
            v0::Message::try_compile(&payer, &ixs, &[], Hash::new_unique()).unwrap();
        let tx = VersionedTransaction {
            signatures: vec![Signature::default()],
            message: VersionedMessage::V0(message),
        };

        let decoded = decode(&offline_rpc(), &payload_from_tx(&tx)).await.unwrap();
        assert!(decoded.is_versioned());
        assert_eq!(decoded.instructions(), &ixs[..]);
    }

    #[tokio::test]
    async fn test_decoding_is_idempotent() {
        let payer = Pubkey::new_unique();
        let ixs = sample_instructions(&payer);
        let message = Message::new_with_blockhash(&ixs, Some(&payer), &Hash::new_unique());
        let tx = VersionedTransaction {
            signatures: vec![Signature::default()],
            message: VersionedMessage::Legacy(message),
        };
        let payload = payload_from_tx(&tx);

        let rpc = offline_rpc();
        let first = decode(&rpc, &payload).await.unwrap();
        let second = decode(&rpc, &payload).await.unwrap();
        assert_eq!(first.instructions(), second.instructions());
    }

    #[tokio::test]
    async fn test_garbage_base64_is_malformed() {
        let payload = SwapTransactionPayload {
            swap_transaction: "!!!not base64!!!".to_string(),
            last_valid_block_height: None,
            lookup_table_addresses: vec![],
        };
        let err = decode(&offline_rpc(), &payload).await.unwrap_err();
        assert!(matches!(err, EngineError::TransactionMalformed(_)));
    }

    #[tokio::test]
    async fn test_undecodable_bytes_are_malformed() {
        let payload = SwapTransactionPayload {
            swap_transaction: BASE64_STANDARD.encode([0xffu8; 16]),
            last_valid_block_height: None,
            lookup_table_addresses: vec![],
        };
        let err = decode(&offline_rpc(), &payload).await.unwrap_err();
        assert!(matches!(err, EngineError::TransactionMalformed(_)));
    }

    #[tokio::test]
    async fn test_bad_hint_address_is_malformed() {
        let payer = Pubkey::new_unique();
        let ixs = sample_instructions(&payer);
        let message =
            v0::Message::try_compile(&payer, &ixs, &[], Hash::new_unique()).unwrap();
        let tx = VersionedTransaction {
            signatures: vec![Signature::default()],
            message: VersionedMessage::V0(message),
        };
        let mut payload = payload_from_tx(&tx);
        payload.lookup_table_addresses = vec!["not-a-pubkey".to_string()];

        let err = decode(&offline_rpc(), &payload).await.unwrap_err();
        assert!(matches!(err, EngineError::TransactionMalformed(_)));
    }

    #[test]
    fn test_header_writability_rule() {
        let header = MessageHeader {
            num_required_signatures: 2,
            num_readonly_signed_accounts: 1,
            num_readonly_unsigned_accounts: 1,
        };
        // keys: [payer(w,s), signer(ro,s), program-data(w), program(ro)]
        assert!(is_writable_index(&header, 4, 0));
        assert!(!is_writable_index(&header, 4, 1));
        assert!(is_writable_index(&header, 4, 2));
        assert!(!is_writable_index(&header, 4, 3));
    }
}
