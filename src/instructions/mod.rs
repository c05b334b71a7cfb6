use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::{pubkey, system_instruction};

use crate::error::{EngineError, Result};

/// SPL memo program. Instruction data is raw UTF-8, no framing.
pub const MEMO_PROGRAM_ID: Pubkey = pubkey!("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr");

/// Hard cap on memo instruction data. Chat messages can be long; the memo
/// that rides along with a swap cannot be.
pub const MEMO_BYTE_BUDGET: usize = 120;

const MEMO_ELLIPSIS: &str = "...";

/// Platform fee for a trade, floored to whole lamports. `native_leg` is the
/// trade's SOL side in lamports: input amount when buying, quoted output
/// when selling.
pub fn platform_fee_amount(native_leg: u64, fee_bps: u64) -> u64 {
    ((native_leg as u128 * fee_bps as u128) / 10_000) as u64
}

/// Native-SOL fee transfer. Returns `None` for a zero amount: a zero-value
/// instruction still costs packet bytes and must never be emitted.
pub fn fee_transfer(payer: &Pubkey, recipient: &Pubkey, lamports: u64) -> Option<Instruction> {
    if lamports == 0 {
        return None;
    }
    Some(system_instruction::transfer(payer, recipient, lamports))
}

/// SPL-token fee transfer between two token accounts of the fee mint.
/// Same zero-amount rule as `fee_transfer`.
pub fn spl_fee_transfer(
    source: &Pubkey,
    destination: &Pubkey,
    authority: &Pubkey,
    amount: u64,
) -> Result<Option<Instruction>> {
    if amount == 0 {
        return Ok(None);
    }
    // transfer_checked needs the mint account; the plain transfer is enough
    // for a fee leg whose mint both sides already agree on.
    #[allow(deprecated)]
    spl_token::instruction::transfer(
        &spl_token::id(),
        source,
        destination,
        authority,
        &[],
        amount,
    )
    .map(Some)
    .map_err(|e| EngineError::internal(format!("Failed to build SPL fee transfer: {}", e)))
}

/// Memo instruction carrying at most `MEMO_BYTE_BUDGET` bytes of UTF-8.
/// Oversized text is truncated on a character boundary with a trailing
/// ellipsis; a multi-byte code point is never split.
pub fn memo(text: &str, signer: &Pubkey) -> Instruction {
    let data = truncate_utf8(text, MEMO_BYTE_BUDGET);
    Instruction::new_with_bytes(
        MEMO_PROGRAM_ID,
        data.as_bytes(),
        vec![AccountMeta::new_readonly(*signer, true)],
    )
}

fn truncate_utf8(text: &str, budget: usize) -> String {
    if text.len() <= budget {
        return text.to_string();
    }

    let mut cut = budget.saturating_sub(MEMO_ELLIPSIS.len());
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &text[..cut], MEMO_ELLIPSIS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fee_amount_is_floored() {
        // 1 SOL at 0.69% -> exactly 6,900,000 lamports
        assert_eq!(platform_fee_amount(1_000_000_000, 69), 6_900_000);
        // 1,234,567 lamports at 69 bps = 8518.5123 -> floored, never rounded up
        assert_eq!(platform_fee_amount(1_234_567, 69), 8_518);
        assert_eq!(platform_fee_amount(0, 69), 0);
        assert_eq!(platform_fee_amount(1_000_000_000, 0), 0);
    }

    #[test]
    fn test_zero_fee_emits_no_instruction() {
        let payer = Pubkey::new_unique();
        let recipient = Pubkey::new_unique();
        assert!(fee_transfer(&payer, &recipient, 0).is_none());
        assert!(spl_fee_transfer(&payer, &recipient, &payer, 0)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_fee_transfer_targets_system_program() {
        let payer = Pubkey::new_unique();
        let recipient = Pubkey::new_unique();
        let ix = fee_transfer(&payer, &recipient, 6_900_000).unwrap();
        assert_eq!(ix.program_id, solana_sdk::system_program::id());
        assert_eq!(ix.accounts[0].pubkey, payer);
        assert_eq!(ix.accounts[1].pubkey, recipient);
    }

    #[test]
    fn test_short_memo_is_untouched() {
        let signer = Pubkey::new_unique();
        let ix = memo("bought the dip", &signer);
        assert_eq!(ix.program_id, MEMO_PROGRAM_ID);
        assert_eq!(ix.data, b"bought the dip");
        assert!(ix.accounts[0].is_signer);
    }

    #[test]
    fn test_long_memo_is_truncated_with_ellipsis() {
        let signer = Pubkey::new_unique();
        let text = "x".repeat(200);
        let ix = memo(&text, &signer);
        assert!(ix.data.len() <= MEMO_BYTE_BUDGET);
        assert!(std::str::from_utf8(&ix.data).unwrap().ends_with("..."));
    }

    #[test]
    fn test_truncation_never_splits_a_code_point() {
        // Each emoji is 4 bytes; no prefix of the truncation can land inside one
        let text = "\u{1F680}".repeat(60);
        let out = truncate_utf8(&text, MEMO_BYTE_BUDGET);
        assert!(out.len() <= MEMO_BYTE_BUDGET);
        assert!(out.ends_with("..."));
        // Would panic on invalid UTF-8 if a code point had been split
        assert!(std::str::from_utf8(out.as_bytes()).is_ok());
    }

    #[test]
    fn test_exact_budget_memo_keeps_everything() {
        let text = "y".repeat(MEMO_BYTE_BUDGET);
        assert_eq!(truncate_utf8(&text, MEMO_BYTE_BUDGET), text);
    }
}
