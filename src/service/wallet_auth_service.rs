use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

const CHALLENGE_PREFIX: &str = "KANGKLIP_AUTH";

pub fn parse_wallet_address(address: &str) -> Result<Pubkey, String> {
    Pubkey::from_str(address.trim()).map_err(|_| "invalid wallet address".to_string())
}

pub fn build_auth_challenge(wallet: &str, nonce: &str, timestamp: &str) -> String {
    format!("{CHALLENGE_PREFIX}:{wallet}:{nonce}:{timestamp}")
}

/// Verifies a base58 detached Ed25519 signature over the UTF-8 challenge
/// bytes. The wallet address is the base58 verifying key.
pub fn verify_wallet_signature(
    challenge: &str,
    signature_b58: &str,
    wallet: &str,
) -> Result<(), String> {
    let wallet_key = parse_wallet_address(wallet)?;
    let sig_bytes = bs58::decode(signature_b58.trim())
        .into_vec()
        .map_err(|_| "invalid signature encoding".to_string())?;
    let sig_arr: [u8; 64] = sig_bytes
        .as_slice()
        .try_into()
        .map_err(|_| "signature must be 64 bytes".to_string())?;

    let verifying_key = VerifyingKey::from_bytes(&wallet_key.to_bytes())
        .map_err(|_| "wallet is not a valid ed25519 key".to_string())?;
    let signature = Signature::from_bytes(&sig_arr);
    verifying_key
        .verify(challenge.as_bytes(), &signature)
        .map_err(|_| "signature verification failed".to_string())
}
