use axum::{Extension, Json, extract::State, extract::rejection::JsonRejection};
use base64::{Engine, engine::general_purpose::STANDARD};

use tipjar_types::api::{
    BuildTransferRequest, BuildTransferResponse, Claims, RelayRequest, RelayResponse,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Unsigned transfer of the list price from the session wallet to the
/// treasury, for the wallet to sign client-side.
pub async fn build_transfer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<BuildTransferRequest>, JsonRejection>,
) -> Result<Json<BuildTransferResponse>, ApiError> {
    let Json(req) = payload?;
    let lamports = req.donation_type.price_lamports();

    let transfer = state
        .relay
        .build_unsigned_transfer(&claims.sub, lamports)
        .await?;

    Ok(Json(BuildTransferResponse {
        transaction: STANDARD.encode(&transfer.transaction),
        blockhash: transfer.blockhash,
        amount: transfer.lamports,
    }))
}

pub async fn relay_transaction(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    payload: Result<Json<RelayRequest>, JsonRejection>,
) -> Result<Json<RelayResponse>, ApiError> {
    let Json(req) = payload?;
    let signed = STANDARD
        .decode(req.transaction.trim())
        .map_err(|e| ApiError::validation("invalid-transaction", format!("transaction is not base64: {}", e)))?;

    // Detached like donation settlement: once broadcast, the retry budget
    // runs to completion.
    let relay_state = state.clone();
    let outcome = tokio::spawn(async move { relay_state.relay.relay(&signed).await })
        .await
        .map_err(|e| ApiError::Internal(format!("relay task failed: {}", e)))??;

    Ok(Json(RelayResponse {
        signature: outcome.signature,
        confirmed: outcome.confirmed,
    }))
}
