use axum::{
    Json,
    extract::{Query, State, WebSocketUpgrade, rejection::QueryRejection},
    response::IntoResponse,
};
use serde::Deserialize;

use tipjar_gateway::handle_connection;
use tipjar_types::api::RecentDonationsResponse;

use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_RECENT: u32 = 20;

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<u32>,
}

/// Pull-based replay for overlays that were offline when a donation was
/// broadcast.
pub async fn recent(
    State(state): State<AppState>,
    query: Result<Query<RecentQuery>, QueryRejection>,
) -> Result<Json<RecentDonationsResponse>, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_RECENT);
    let donations = state.ledger.recent(limit).await?;
    Ok(Json(RecentDonationsResponse { donations }))
}

pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_connection(socket, hub))
}
