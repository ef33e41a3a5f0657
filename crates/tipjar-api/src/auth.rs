use axum::{Json, extract::State, extract::rejection::JsonRejection};
use tracing::info;

use tipjar_crypto::WalletAddress;
use tipjar_types::api::{NonceRequest, NonceResponse, VerifyRequest, VerifyResponse};
use tipjar_types::models::WalletAccount;

use crate::error::ApiError;
use crate::middleware::create_token;
use crate::state::AppState;

pub(crate) fn parse_wallet(raw: &str) -> Result<WalletAddress, ApiError> {
    raw.parse()
        .map_err(|e: tipjar_crypto::CryptoError| ApiError::validation("invalid-wallet", e.to_string()))
}

pub async fn request_nonce(
    State(state): State<AppState>,
    payload: Result<Json<NonceRequest>, JsonRejection>,
) -> Result<Json<NonceResponse>, ApiError> {
    let Json(req) = payload?;
    let wallet = parse_wallet(&req.wallet)?;

    let issued = state.authenticator.issue_challenge(&wallet);

    Ok(Json(NonceResponse {
        nonce: issued.nonce,
        timestamp: issued.timestamp,
        message: issued.message,
    }))
}

pub async fn verify(
    State(state): State<AppState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let Json(req) = payload?;
    let wallet = parse_wallet(&req.wallet)?;
    if req.signature.is_empty() || req.nonce.is_empty() {
        return Err(ApiError::validation("invalid-body", "signature and nonce are required"));
    }

    if !state
        .authenticator
        .verify(&wallet, &req.signature, &req.nonce, req.timestamp)
    {
        return Err(ApiError::unauthorized(
            "invalid-challenge",
            "challenge is unknown, expired, or the signature does not match",
        ));
    }

    let db = state.db.clone();
    let address = wallet.to_string();
    let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    let row = tokio::task::spawn_blocking(move || db.upsert_wallet(&address, &now))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Storage(e.to_string()))?;
    let user = WalletAccount::try_from(row).map_err(|e| ApiError::Storage(e.to_string()))?;

    let token = create_token(&state.jwt_secret, &user.wallet, state.session_ttl)?;

    info!("Wallet {} logged in", user.wallet);
    Ok(Json(VerifyResponse { token, user }))
}
