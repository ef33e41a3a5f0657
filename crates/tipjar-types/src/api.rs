use serde::{Deserialize, Serialize};

use crate::models::{Donation, DonationType, WalletAccount};

// -- JWT Claims --

/// Session credential claims. `sub` is the wallet address proven by the
/// challenge handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NonceRequest {
    pub wallet: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NonceResponse {
    pub nonce: String,
    pub timestamp: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyRequest {
    pub wallet: String,
    pub signature: String,
    pub nonce: String,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub token: String,
    pub user: WalletAccount,
}

// -- Donations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct DonateRequest {
    #[serde(rename = "type")]
    pub donation_type: DonationType,
    pub content: String,
    pub username: String,
    pub wallet: String,
    pub tx_hash: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DonateResponse {
    pub donation: Donation,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecentDonationsResponse {
    pub donations: Vec<Donation>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceEntry {
    #[serde(rename = "type")]
    pub donation_type: DonationType,
    pub lamports: u64,
    pub sol: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PricesResponse {
    pub prices: Vec<PriceEntry>,
}

// -- Transactions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildTransferRequest {
    #[serde(rename = "type")]
    pub donation_type: DonationType,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BuildTransferResponse {
    /// Base64 of the unsigned wire transaction.
    pub transaction: String,
    pub blockhash: String,
    pub amount: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayRequest {
    /// Base64 of the signed wire transaction.
    pub transaction: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RelayResponse {
    pub signature: String,
    pub confirmed: bool,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable reason, stable across releases.
    pub error: String,
    pub message: String,
}
