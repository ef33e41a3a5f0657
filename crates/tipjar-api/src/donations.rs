use axum::{Extension, Json, extract::State, extract::rejection::JsonRejection};
use tracing::{info, warn};

use tipjar_chain::{ChainError, Commitment, PaymentVerdict};
use tipjar_crypto::WalletAddress;
use tipjar_types::api::{Claims, DonateRequest, DonateResponse, PriceEntry, PricesResponse};
use tipjar_types::models::{Donation, DonationType, LAMPORTS_PER_SOL};

use crate::auth::parse_wallet;
use crate::error::ApiError;
use crate::ledger::DonationRecord;
use crate::state::AppState;

const MAX_USERNAME_CHARS: usize = 32;
const MAX_TEXT_CHARS: usize = 500;
const MAX_URL_LEN: usize = 2048;
const MAX_METADATA_BYTES: usize = 4096;

/// Claim a donation for a transaction the caller already broadcast.
///
/// The wallet in the body must be the one the session was issued to. The
/// amount recorded is whatever the verifier settles on; the body has no say.
pub async fn donate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<DonateRequest>, JsonRejection>,
) -> Result<Json<DonateResponse>, ApiError> {
    let Json(req) = payload?;

    if req.wallet != claims.sub {
        return Err(ApiError::Forbidden {
            reason: "wallet-mismatch",
            message: "wallet does not match the authenticated session".into(),
        });
    }
    let wallet = parse_wallet(&req.wallet)?;
    validate_donation(&req)?;

    if state.ledger.exists(&req.tx_hash).await? {
        return Err(ApiError::Duplicate(req.tx_hash));
    }

    // Settlement runs detached so a dropped request cannot leave a verified
    // payment half-recorded.
    let settle = tokio::spawn(settle_donation(state.clone(), wallet, req));
    let donation = settle
        .await
        .map_err(|e| ApiError::Internal(format!("settlement task failed: {}", e)))??;

    Ok(Json(DonateResponse { donation }))
}

async fn settle_donation(
    state: AppState,
    wallet: WalletAddress,
    req: DonateRequest,
) -> Result<Donation, ApiError> {
    // A failed or never-landed transaction is the verifier's call to make,
    // so those two outcomes fall through to it.
    match state
        .relay
        .await_commitment(&req.tx_hash, Commitment::Finalized)
        .await
    {
        Ok(()) => {}
        Err(e @ (ChainError::Rejected(_) | ChainError::ConfirmationTimeout { .. })) => {
            warn!("Transaction {} did not finalize: {}", req.tx_hash, e);
        }
        Err(e) => return Err(e.into()),
    }

    let amount = match state
        .verifier
        .verify(&req.tx_hash, req.donation_type, &wallet)
        .await?
    {
        PaymentVerdict::Verified { amount } => amount,
        PaymentVerdict::Rejected(reason) => return Err(ApiError::PaymentRejected(reason)),
    };

    let donation = state
        .ledger
        .submit(DonationRecord {
            tx_signature: req.tx_hash,
            wallet: req.wallet,
            username: req.username.trim().to_string(),
            donation_type: req.donation_type,
            verified_amount: amount,
            content: req.content,
            metadata: req.metadata,
        })
        .await?;

    info!("Donation {} settled for {}", donation.id, wallet);
    Ok(donation)
}

fn validate_donation(req: &DonateRequest) -> Result<(), ApiError> {
    let username = req.username.trim();
    if username.is_empty() || username.chars().count() > MAX_USERNAME_CHARS {
        return Err(ApiError::validation(
            "invalid-username",
            format!("username must be 1 to {} characters", MAX_USERNAME_CHARS),
        ));
    }

    if req.donation_type.is_media() {
        let is_http = req.content.starts_with("https://") || req.content.starts_with("http://");
        if !is_http || req.content.len() > MAX_URL_LEN {
            return Err(ApiError::validation(
                "invalid-content",
                format!("{} donations carry an http(s) URL to hosted media", req.donation_type),
            ));
        }
    } else if req.content.trim().is_empty() || req.content.chars().count() > MAX_TEXT_CHARS {
        return Err(ApiError::validation(
            "invalid-content",
            format!("text must be 1 to {} characters", MAX_TEXT_CHARS),
        ));
    }

    let signature_ok = bs58::decode(&req.tx_hash)
        .into_vec()
        .map(|raw| raw.len() == 64)
        .unwrap_or(false);
    if !signature_ok {
        return Err(ApiError::validation(
            "invalid-signature",
            "txHash must be a base58 transaction signature",
        ));
    }

    if let Some(metadata) = &req.metadata {
        if !metadata.is_object() {
            return Err(ApiError::validation("invalid-metadata", "metadata must be a JSON object"));
        }
        if metadata.to_string().len() > MAX_METADATA_BYTES {
            return Err(ApiError::validation(
                "invalid-metadata",
                format!("metadata exceeds {} bytes", MAX_METADATA_BYTES),
            ));
        }
    }

    Ok(())
}

pub async fn prices() -> Json<PricesResponse> {
    let prices = DonationType::ALL
        .into_iter()
        .map(|donation_type| {
            let lamports = donation_type.price_lamports();
            PriceEntry {
                donation_type,
                lamports,
                sol: lamports as f64 / LAMPORTS_PER_SOL as f64,
            }
        })
        .collect();

    Json(PricesResponse { prices })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(donation_type: DonationType, content: &str) -> DonateRequest {
        DonateRequest {
            donation_type,
            content: content.to_string(),
            username: "alice".into(),
            wallet: "w".into(),
            tx_hash: bs58::encode([7u8; 64]).into_string(),
            metadata: None,
        }
    }

    fn reason(req: &DonateRequest) -> Option<&'static str> {
        validate_donation(req).err().map(|e| e.reason())
    }

    #[test]
    fn text_and_media_content_rules() {
        assert_eq!(reason(&request(DonationType::Text, "gm")), None);
        assert_eq!(reason(&request(DonationType::Text, "   ")), Some("invalid-content"));
        assert_eq!(
            reason(&request(DonationType::Text, &"x".repeat(MAX_TEXT_CHARS + 1))),
            Some("invalid-content")
        );

        assert_eq!(reason(&request(DonationType::Gif, "https://cdn.example/a.gif")), None);
        assert_eq!(reason(&request(DonationType::Video, "not a url")), Some("invalid-content"));
    }

    #[test]
    fn username_signature_and_metadata_rules() {
        let mut req = request(DonationType::Text, "gm");
        req.username = " ".into();
        assert_eq!(reason(&req), Some("invalid-username"));

        let mut req = request(DonationType::Text, "gm");
        req.tx_hash = "sig1".into();
        assert_eq!(reason(&req), Some("invalid-signature"));

        let mut req = request(DonationType::Text, "gm");
        req.metadata = Some(serde_json::json!([1, 2]));
        assert_eq!(reason(&req), Some("invalid-metadata"));

        req.metadata = Some(serde_json::json!({ "color": "pink" }));
        assert_eq!(reason(&req), None);
    }

    #[tokio::test]
    async fn price_table_is_complete() {
        let Json(resp) = prices().await;
        assert_eq!(resp.prices.len(), 5);
        let video = resp
            .prices
            .iter()
            .find(|p| p.donation_type == DonationType::Video)
            .unwrap();
        assert_eq!(video.lamports, 100_000_000);
        assert_eq!(video.sol, 0.1);
    }
}
