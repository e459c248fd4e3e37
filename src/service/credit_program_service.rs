use crate::service::hash_service;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

pub const CREDIT_UNIT: u64 = 100_000;

const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
const ASSOCIATED_TOKEN_PROGRAM: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";
const MEMO_PROGRAM: &str = "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr";

const MEMO_INLINE_LIMIT: usize = 64;

// UserCredit layout: discriminator(8) | user pubkey(32) | credits u64 LE | bump.
const USER_CREDIT_OWNER_OFFSET: usize = 8;
const USER_CREDIT_BALANCE_OFFSET: usize = 40;

pub fn token_program_id() -> Pubkey {
    Pubkey::from_str(TOKEN_PROGRAM).expect("valid token program id")
}

pub fn associated_token_program_id() -> Pubkey {
    Pubkey::from_str(ASSOCIATED_TOKEN_PROGRAM).expect("valid associated token program id")
}

pub fn memo_program_id() -> Pubkey {
    Pubkey::from_str(MEMO_PROGRAM).expect("valid memo program id")
}

pub fn config_pda(program_id: &Pubkey, authority: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[b"config", authority.as_ref()], program_id).0
}

pub fn user_credit_pda(program_id: &Pubkey, user: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[b"credit", user.as_ref()], program_id).0
}

pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[
            owner.as_ref(),
            token_program_id().as_ref(),
            mint.as_ref(),
        ],
        &associated_token_program_id(),
    )
    .0
}

pub fn pay_usdc_instruction_data(amount_base_units: u64) -> Vec<u8> {
    instruction_data("pay_usdc", amount_base_units)
}

pub fn consume_credit_instruction_data(amount: u64) -> Vec<u8> {
    instruction_data("consume_credit", amount)
}

fn instruction_data(name: &str, amount: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(16);
    data.extend_from_slice(&hash_service::instruction_discriminator(name));
    data.extend_from_slice(&amount.to_le_bytes());
    data
}

pub fn consume_credit_instruction(
    program_id: &Pubkey,
    spender: &Pubkey,
    authority: &Pubkey,
    user: &Pubkey,
    amount: u64,
) -> Instruction {
    let config = config_pda(program_id, authority);
    let user_credit = user_credit_pda(program_id, user);
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*spender, true),
            AccountMeta::new_readonly(config, false),
            AccountMeta::new_readonly(*user, false),
            AccountMeta::new(user_credit, false),
        ],
        data: consume_credit_instruction_data(amount),
    }
}

/// Memos longer than the inline limit are replaced by their hex sha-256.
pub fn memo_instruction(memo: &str) -> Instruction {
    let data = if memo.len() <= MEMO_INLINE_LIMIT {
        memo.as_bytes().to_vec()
    } else {
        hash_service::sha256_hex(memo).into_bytes()
    };
    Instruction {
        program_id: memo_program_id(),
        accounts: Vec::new(),
        data,
    }
}

/// Decodes a raw `UserCredit` account. A stored owner other than the queried
/// wallet reports zero credits rather than erroring.
pub fn decode_user_credit(wallet: &Pubkey, data: &[u8]) -> Result<u64, String> {
    if data.len() < USER_CREDIT_BALANCE_OFFSET + 8 {
        return Err("user credit account too short".to_string());
    }
    if data[..8] != hash_service::account_discriminator("UserCredit") {
        return Err("user credit account discriminator mismatch".to_string());
    }
    let owner = &data[USER_CREDIT_OWNER_OFFSET..USER_CREDIT_OWNER_OFFSET + 32];
    if owner != wallet.as_ref() {
        return Ok(0);
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&data[USER_CREDIT_BALANCE_OFFSET..USER_CREDIT_BALANCE_OFFSET + 8]);
    Ok(u64::from_le_bytes(raw))
}
