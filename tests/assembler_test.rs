// Transaction assembly tests: merge ordering and the auxiliary fallback

use pretty_assertions::assert_eq;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::message::VersionedMessage;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};

use traderoom::assembler::{assemble, wire_size, PACKET_SIZE_CEILING};
use traderoom::decoder::DecodedTransaction;
use traderoom::instructions::{self, MEMO_PROGRAM_ID};

fn fake_swap_instruction(payer: &Pubkey, data_len: usize) -> Instruction {
    Instruction {
        program_id: Pubkey::new_unique(),
        accounts: vec![AccountMeta::new(*payer, true)],
        data: vec![0xAB; data_len],
    }
}

fn program_ids(message: &VersionedMessage) -> Vec<Pubkey> {
    match message {
        VersionedMessage::Legacy(message) => message
            .instructions
            .iter()
            .map(|ix| message.account_keys[ix.program_id_index as usize])
            .collect(),
        VersionedMessage::V0(message) => message
            .instructions
            .iter()
            .map(|ix| message.account_keys[ix.program_id_index as usize])
            .collect(),
    }
}

#[test]
fn test_small_trade_merges_into_one_transaction() {
    let payer = Keypair::new().pubkey();
    let recipient = Pubkey::new_unique();
    let decoded = DecodedTransaction::Legacy {
        instructions: vec![fake_swap_instruction(&payer, 64)],
    };
    let fee = instructions::fee_transfer(&payer, &recipient, 6_900_000);
    let memo = instructions::memo("bought the dip", &payer);

    let assembled = assemble(&decoded, fee, Some(memo), &payer, Hash::new_unique()).unwrap();

    assert!(assembled.auxiliary.is_none());
    assert!(wire_size(&assembled.primary) <= PACKET_SIZE_CEILING);

    // Fee rides first, memo last, the swap in between.
    let programs = program_ids(&assembled.primary);
    assert_eq!(programs.len(), 3);
    assert_eq!(programs[0], solana_sdk::system_program::id());
    assert_eq!(programs[2], MEMO_PROGRAM_ID);
}

#[test]
fn test_oversized_merge_falls_back_to_auxiliary() {
    let payer = Keypair::new().pubkey();
    let recipient = Pubkey::new_unique();
    // Large enough that the swap alone fits the packet but the merged
    // candidate does not.
    let decoded = DecodedTransaction::Legacy {
        instructions: vec![fake_swap_instruction(&payer, 1_000)],
    };
    let fee = instructions::fee_transfer(&payer, &recipient, 6_900_000);
    let memo = instructions::memo("gm", &payer);
    let blockhash = Hash::new_unique();

    let assembled = assemble(&decoded, fee, Some(memo), &payer, blockhash).unwrap();

    // The swap ships unmodified; the fee and memo move to the auxiliary.
    let primary_programs = program_ids(&assembled.primary);
    assert_eq!(primary_programs.len(), 1);
    assert!(!primary_programs.contains(&MEMO_PROGRAM_ID));

    let auxiliary = assembled.auxiliary.expect("auxiliary transaction");
    let aux_programs = program_ids(&auxiliary);
    assert_eq!(
        aux_programs,
        vec![solana_sdk::system_program::id(), MEMO_PROGRAM_ID]
    );
    assert!(wire_size(&auxiliary) <= PACKET_SIZE_CEILING);

    // Both carry the same blockhash.
    assert_eq!(*assembled.primary.recent_blockhash(), blockhash);
    assert_eq!(*auxiliary.recent_blockhash(), blockhash);
}

#[test]
fn test_no_extras_leaves_swap_untouched() {
    let payer = Keypair::new().pubkey();
    let swap = fake_swap_instruction(&payer, 128);
    let decoded = DecodedTransaction::Legacy {
        instructions: vec![swap.clone()],
    };

    let assembled = assemble(&decoded, None, None, &payer, Hash::new_unique()).unwrap();

    assert!(assembled.auxiliary.is_none());
    assert_eq!(program_ids(&assembled.primary), vec![swap.program_id]);
}

#[test]
fn test_zero_fee_only_memo_still_merges() {
    let payer = Keypair::new().pubkey();
    let recipient = Pubkey::new_unique();
    let decoded = DecodedTransaction::Legacy {
        instructions: vec![fake_swap_instruction(&payer, 64)],
    };
    // Zero lamports yields no fee instruction at all.
    let fee = instructions::fee_transfer(&payer, &recipient, 0);
    assert!(fee.is_none());
    let memo = instructions::memo("sold half", &payer);

    let assembled = assemble(&decoded, fee, Some(memo), &payer, Hash::new_unique()).unwrap();

    assert!(assembled.auxiliary.is_none());
    let programs = program_ids(&assembled.primary);
    assert_eq!(programs.len(), 2);
    assert_eq!(programs[1], MEMO_PROGRAM_ID);
}

#[test]
fn test_refresh_blockhash_touches_every_leg() {
    let payer = Keypair::new().pubkey();
    let recipient = Pubkey::new_unique();
    let decoded = DecodedTransaction::Legacy {
        instructions: vec![fake_swap_instruction(&payer, 1_000)],
    };
    let fee = instructions::fee_transfer(&payer, &recipient, 1_000_000);
    let memo = instructions::memo("late", &payer);

    let mut assembled =
        assemble(&decoded, fee, Some(memo), &payer, Hash::new_unique()).unwrap();
    assert!(assembled.auxiliary.is_some());

    let fresh = Hash::new_unique();
    assembled.refresh_blockhash(fresh);
    assert_eq!(*assembled.primary.recent_blockhash(), fresh);
    assert_eq!(
        *assembled.auxiliary.as_ref().unwrap().recent_blockhash(),
        fresh
    );
}

#[test]
fn test_system_transfer_instruction_payer_is_signer() {
    let payer = Keypair::new().pubkey();
    let recipient = Pubkey::new_unique();
    let fee = instructions::fee_transfer(&payer, &recipient, 42).unwrap();
    assert_eq!(fee.program_id, solana_sdk::system_program::id());
    assert!(fee.accounts[0].is_signer);
    assert_eq!(fee.accounts[0].pubkey, payer);
    assert_eq!(fee.accounts[1].pubkey, recipient);
}
