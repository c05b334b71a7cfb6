use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::{v0, Message, VersionedMessage};
use solana_sdk::packet::PACKET_DATA_SIZE;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::decoder::DecodedTransaction;
use crate::error::{EngineError, Result};

/// Smallest guaranteed on-wire packet size; the same ceiling applies to
/// legacy and versioned messages.
pub const PACKET_SIZE_CEILING: usize = PACKET_DATA_SIZE;

/// The product of assembly: an unsigned primary message, and - when the
/// merged candidate would not fit on the wire - an auxiliary message holding
/// the fee/memo legs, sharing the primary's blockhash and fee payer.
#[derive(Debug, Clone)]
pub struct AssembledTransaction {
    pub primary: VersionedMessage,
    pub auxiliary: Option<VersionedMessage>,
}

impl AssembledTransaction {
    /// Swaps in a fresher blockhash right before signing. Both messages must
    /// keep sharing one hash so their fates stay tied to the same expiry.
    pub fn refresh_blockhash(&mut self, blockhash: Hash) {
        self.primary.set_recent_blockhash(blockhash);
        if let Some(aux) = &mut self.auxiliary {
            aux.set_recent_blockhash(blockhash);
        }
    }
}

/// Serialized transaction size for an unsigned message: signature-count
/// shortvec byte, the signatures themselves, then the message.
pub fn wire_size(message: &VersionedMessage) -> usize {
    let num_signatures = message.header().num_required_signatures as usize;
    1 + 64 * num_signatures + message.serialize().len()
}

/// Merges the decoded swap instructions with the optional fee and memo legs.
///
/// The candidate order is `[fee?, swap..., memo?]`: the fee is prepended so
/// it executes even if a later instruction aborts the tail of the
/// transaction on some paths, and the memo rides last because it is purely
/// informational. If the candidate overflows the packet ceiling, the swap
/// ships unmodified and the fee/memo legs move to an auxiliary transaction -
/// dropping them silently is not an option.
pub fn assemble(
    decoded: &DecodedTransaction,
    fee: Option<Instruction>,
    memo: Option<Instruction>,
    payer: &Pubkey,
    blockhash: Hash,
) -> Result<AssembledTransaction> {
    let originals = decoded.instructions();

    if fee.is_none() && memo.is_none() {
        return Ok(AssembledTransaction {
            primary: compile(decoded, originals, payer, blockhash)?,
            auxiliary: None,
        });
    }

    let candidate: Vec<Instruction> = fee
        .clone()
        .into_iter()
        .chain(originals.iter().cloned())
        .chain(memo.clone())
        .collect();

    match compile(decoded, &candidate, payer, blockhash) {
        Ok(message) if wire_size(&message) <= PACKET_SIZE_CEILING => {
            debug!(
                bytes = wire_size(&message),
                "Merged swap, fee and memo into a single transaction"
            );
            Ok(AssembledTransaction {
                primary: message,
                auxiliary: None,
            })
        }
        merged => {
            if let Ok(message) = &merged {
                debug!(
                    bytes = wire_size(message),
                    ceiling = PACKET_SIZE_CEILING,
                    "Merged candidate over packet ceiling; splitting fee/memo off"
                );
            }
            let primary = compile(decoded, originals, payer, blockhash)?;
            let extras: Vec<Instruction> = fee.into_iter().chain(memo).collect();
            let auxiliary = VersionedMessage::Legacy(Message::new_with_blockhash(
                &extras,
                Some(payer),
                &blockhash,
            ));
            Ok(AssembledTransaction {
                primary,
                auxiliary: Some(auxiliary),
            })
        }
    }
}

/// Re-compiles an instruction list in the same wire format the payload was
/// decoded from; the format tag never changes mid-pipeline.
fn compile(
    decoded: &DecodedTransaction,
    instructions: &[Instruction],
    payer: &Pubkey,
    blockhash: Hash,
) -> Result<VersionedMessage> {
    match decoded {
        DecodedTransaction::Legacy { .. } => Ok(VersionedMessage::Legacy(
            Message::new_with_blockhash(instructions, Some(payer), &blockhash),
        )),
        DecodedTransaction::Versioned { lookup_tables, .. } => {
            let message = v0::Message::try_compile(payer, instructions, lookup_tables, blockhash)
                .map_err(|e| {
                    EngineError::TransactionMalformed(format!(
                        "failed to compile versioned message: {}",
                        e
                    ))
                })?;
            Ok(VersionedMessage::V0(message))
        }
    }
}
