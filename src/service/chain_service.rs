use crate::service::credit_program_service;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;
use solana_transaction_status_client_types::option_serializer::OptionSerializer;
use solana_transaction_status_client_types::{
    EncodedTransaction, UiInstruction, UiMessage, UiParsedInstruction, UiTransactionEncoding,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("rpc request failed: {0}")]
    Rpc(String),
    #[error("account decode failed: {0}")]
    Decode(String),
    #[error("transaction failed on chain: {0}")]
    TransactionFailed(String),
    #[error("confirmation deadline exceeded")]
    ConfirmTimeout,
}

/// Everything chain interaction needs, built once at startup.
#[derive(Clone)]
pub struct ChainContext {
    pub rpc: Arc<RpcClient>,
    pub program_id: Pubkey,
    pub authority: Pubkey,
    pub usdc_mint: Pubkey,
    pub spender: Arc<Keypair>,
    pub confirm_timeout: Duration,
}

impl ChainContext {
    pub fn spender_pubkey(&self) -> Pubkey {
        self.spender.pubkey()
    }
}

/// `SPENDER_KEYPAIR` is either an inline 64-byte JSON array or a path to a
/// file containing one.
pub fn load_spender_keypair(raw: &str) -> Result<Keypair, String> {
    let trimmed = raw.trim();
    let json = if trimmed.starts_with('[') {
        trimmed.to_string()
    } else {
        std::fs::read_to_string(trimmed)
            .map_err(|e| format!("cannot read spender keypair file {trimmed}: {e}"))?
    };
    let bytes: Vec<u8> =
        serde_json::from_str(&json).map_err(|e| format!("invalid spender keypair json: {e}"))?;
    if bytes.len() != 64 {
        return Err(format!(
            "spender keypair must be 64 bytes, got {}",
            bytes.len()
        ));
    }
    Keypair::from_bytes(&bytes).map_err(|e| format!("invalid spender keypair: {e}"))
}

/// Reads the wallet's `UserCredit` balance. A missing account is zero
/// credits, not an error.
pub async fn read_credit_balance(chain: &ChainContext, wallet: &Pubkey) -> Result<u64, ChainError> {
    let pda = credit_program_service::user_credit_pda(&chain.program_id, wallet);
    let response = chain
        .rpc
        .get_account_with_commitment(&pda, CommitmentConfig::confirmed())
        .await
        .map_err(|e| ChainError::Rpc(e.to_string()))?;
    let Some(account) = response.value else {
        return Ok(0);
    };
    credit_program_service::decode_user_credit(wallet, &account.data).map_err(ChainError::Decode)
}

/// Signs and submits a `consume_credit` for the wallet. Returns the
/// signature as soon as the cluster accepts the transaction; confirmation is
/// a separate step so callers can persist a recovery marker in between.
pub async fn send_consume_credit(
    chain: &ChainContext,
    wallet: &Pubkey,
    amount: u64,
    memo: &str,
) -> Result<Signature, ChainError> {
    let blockhash = chain
        .rpc
        .get_latest_blockhash()
        .await
        .map_err(|e| ChainError::Rpc(e.to_string()))?;
    let instructions = vec![
        credit_program_service::memo_instruction(memo),
        credit_program_service::consume_credit_instruction(
            &chain.program_id,
            &chain.spender_pubkey(),
            &chain.authority,
            wallet,
            amount,
        ),
    ];
    let tx = Transaction::new_signed_with_payer(
        &instructions,
        Some(&chain.spender_pubkey()),
        &[chain.spender.as_ref()],
        blockhash,
    );
    chain
        .rpc
        .send_transaction(&tx)
        .await
        .map_err(|e| ChainError::Rpc(e.to_string()))
}

/// Polls the signature status until `confirmed`, the transaction errors, or
/// the context deadline passes.
pub async fn await_confirmation(
    chain: &ChainContext,
    signature: &Signature,
) -> Result<(), ChainError> {
    let deadline = tokio::time::Instant::now() + chain.confirm_timeout;
    loop {
        let status = chain
            .rpc
            .get_signature_status_with_commitment(signature, CommitmentConfig::confirmed())
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        match status {
            Some(Ok(())) => return Ok(()),
            Some(Err(err)) => return Err(ChainError::TransactionFailed(err.to_string())),
            None => {}
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(ChainError::ConfirmTimeout);
        }
        sleep(Duration::from_millis(500)).await;
    }
}

/// Fetches the parsed transaction and verifies it executed without error and
/// invoked the credits program in an outer or inner instruction.
pub async fn transaction_invokes_program(
    chain: &ChainContext,
    signature: &str,
) -> Result<bool, ChainError> {
    let sig = Signature::from_str(signature.trim())
        .map_err(|_| ChainError::Decode("invalid transaction signature".to_string()))?;
    let config = RpcTransactionConfig {
        encoding: Some(UiTransactionEncoding::JsonParsed),
        commitment: Some(CommitmentConfig::confirmed()),
        max_supported_transaction_version: Some(0),
    };
    let tx = chain
        .rpc
        .get_transaction_with_config(&sig, config)
        .await
        .map_err(|e| ChainError::Rpc(e.to_string()))?;

    let program = chain.program_id.to_string();
    let Some(meta) = tx.transaction.meta else {
        return Err(ChainError::Decode("transaction meta missing".to_string()));
    };
    if let Some(err) = meta.err {
        return Err(ChainError::TransactionFailed(err.to_string()));
    }

    let mut invoked = false;
    if let EncodedTransaction::Json(ui_tx) = &tx.transaction.transaction {
        if let UiMessage::Parsed(message) = &ui_tx.message {
            invoked = message
                .instructions
                .iter()
                .any(|ix| instruction_matches_program(ix, &program));
        }
    }
    if !invoked {
        if let OptionSerializer::Some(inner_sets) = &meta.inner_instructions {
            invoked = inner_sets
                .iter()
                .flat_map(|set| set.instructions.iter())
                .any(|ix| instruction_matches_program(ix, &program));
        }
    }
    Ok(invoked)
}

fn instruction_matches_program(ix: &UiInstruction, program: &str) -> bool {
    match ix {
        UiInstruction::Parsed(UiParsedInstruction::Parsed(parsed)) => parsed.program_id == program,
        UiInstruction::Parsed(UiParsedInstruction::PartiallyDecoded(raw)) => {
            raw.program_id == program
        }
        UiInstruction::Compiled(_) => false,
    }
}
