/// Tipjar Crypto Library
///
/// Wallet identity primitives for the challenge-response login:
/// - base58 wallet addresses (ed25519 public keys)
/// - single-use nonces and the canonical challenge message
/// - signature decoding (hex or base58) and ed25519 verification
///
/// Private keys never reach this crate; wallets sign client-side.

pub mod challenge;
pub mod signature;
pub mod wallet;

use thiserror::Error;

pub use challenge::{challenge_message, generate_nonce};
pub use signature::{decode_signature, verify_wallet_signature};
pub use wallet::WalletAddress;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid wallet address: {0}")]
    InvalidWallet(String),

    #[error("signature is neither 64-byte hex nor base58")]
    UndecodableSignature,

    #[error("signature does not match wallet")]
    BadSignature,
}
