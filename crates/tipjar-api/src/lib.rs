//! HTTP surface of the donation pipeline: wallet login, donation claims,
//! transfer building and relaying, and the overlay endpoints.

pub mod auth;
pub mod authenticator;
pub mod donations;
pub mod error;
pub mod ledger;
pub mod middleware;
pub mod overlay;
pub mod state;
pub mod transactions;

use axum::{
    Json, Router,
    extract::State,
    middleware::from_fn_with_state,
    routing::{get, post},
};

pub use authenticator::NonceAuthenticator;
pub use error::ApiError;
pub use ledger::{DonationLedger, DonationRecord, LedgerError};
pub use state::{AppState, AppStateInner};

/// All routes with state applied. Transport layers (CORS, tracing) are left
/// to the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/nonce", post(auth::request_nonce))
        .route("/auth/verify", post(auth::verify))
        .route("/donations/prices", get(donations::prices))
        .route("/overlay/recent", get(overlay::recent))
        .route("/overlay/ws", get(overlay::ws_upgrade))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/donate", post(donations::donate))
        .route("/tx/build", post(transactions::build_transfer))
        .route("/tx/relay", post(transactions::relay_transaction))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let donations = state.ledger.count().await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "overlays": state.hub.connection_count().await,
        "donations": donations,
    })))
}
