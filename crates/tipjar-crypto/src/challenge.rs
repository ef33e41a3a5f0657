use crate::WalletAddress;

/// Fresh 128-bit nonce, hex encoded.
pub fn generate_nonce() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

/// Canonical challenge text. Wallets sign exactly these bytes, and the server
/// rebuilds them from stored state, so the template must never change shape.
pub fn challenge_message(wallet: &WalletAddress, nonce: &str, timestamp_ms: i64) -> String {
    format!(
        "Sign this message to authenticate with Tipjar.\n\nWallet: {}\nNonce: {}\nTimestamp: {}",
        wallet, nonce, timestamp_ms
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonces_are_unique_hex() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn message_is_reproducible() {
        let wallet = WalletAddress::new([1u8; 32]);
        let first = challenge_message(&wallet, "abcd", 1_700_000_000_123);
        let second = challenge_message(&wallet, "abcd", 1_700_000_000_123);
        assert_eq!(first, second);
        assert!(first.ends_with("Nonce: abcd\nTimestamp: 1700000000123"));
    }
}
