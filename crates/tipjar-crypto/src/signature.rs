use ed25519_dalek::{Signature, VerifyingKey};

use crate::{CryptoError, WalletAddress};

/// Decode a detached ed25519 signature. Wallet adapters hand these out
/// either as hex or as base58, so both are accepted.
pub fn decode_signature(encoded: &str) -> Result<[u8; 64], CryptoError> {
    let encoded = encoded.trim();

    if let Ok(bytes) = hex::decode(encoded.strip_prefix("0x").unwrap_or(encoded)) {
        if let Ok(sig) = <[u8; 64]>::try_from(bytes) {
            return Ok(sig);
        }
    }

    bs58::decode(encoded)
        .into_vec()
        .ok()
        .and_then(|bytes| <[u8; 64]>::try_from(bytes).ok())
        .ok_or(CryptoError::UndecodableSignature)
}

/// Check that `signature` over `message` was produced by the key behind `wallet`.
pub fn verify_wallet_signature(
    wallet: &WalletAddress,
    message: &[u8],
    signature: &[u8; 64],
) -> Result<(), CryptoError> {
    let key = VerifyingKey::from_bytes(wallet.as_bytes()).map_err(|_| CryptoError::BadSignature)?;
    let signature = Signature::from_bytes(signature);
    key.verify_strict(message, &signature)
        .map_err(|_| CryptoError::BadSignature)
}
