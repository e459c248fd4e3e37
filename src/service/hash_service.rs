use sha2::{Digest, Sha256};

pub fn sha256_hex(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

/// First 8 bytes of `sha256("account:<Name>")`, the Anchor account tag.
pub fn account_discriminator(name: &str) -> [u8; 8] {
    discriminator("account", name)
}

/// First 8 bytes of `sha256("global:<name>")`, the Anchor instruction tag.
pub fn instruction_discriminator(name: &str) -> [u8; 8] {
    discriminator("global", name)
}

fn discriminator(namespace: &str, name: &str) -> [u8; 8] {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b":");
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn discriminators_are_prefixes_of_the_full_digest() {
        let full = sha256_hex("global:consume_credit");
        assert_eq!(
            hex::encode(instruction_discriminator("consume_credit")),
            full[..16]
        );
        let full = sha256_hex("account:UserCredit");
        assert_eq!(hex::encode(account_discriminator("UserCredit")), full[..16]);
    }
}
