use rand::rngs::OsRng;
use rand::RngCore;

/// 32 bytes of OS randomness, lowercase hex. Job tokens, auth tokens and
/// auth nonces all share this shape.
pub fn generate_secret_hex() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn is_valid_secret_hex(token: &str) -> bool {
    token.len() == 64
        && token
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}
