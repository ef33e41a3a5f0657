use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use tipjar_types::api::Claims;

use crate::error::ApiError;
use crate::state::AppState;

/// Extract and validate the session JWT from the Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("missing-credential", "bearer token required"))?;

    let claims = decode_token(&state.jwt_secret, token)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub fn create_token(secret: &str, wallet: &str, ttl: chrono::Duration) -> Result<String, ApiError> {
    let now = chrono::Utc::now();
    let claims = Claims {
        sub: wallet.to_string(),
        iat: now.timestamp() as usize,
        exp: (now + ttl).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("token encoding failed: {}", e)))
}

pub fn decode_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::unauthorized("invalid-credential", "session token is invalid or expired"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip_and_tamper() {
        let token = create_token("secret", "wallet", chrono::Duration::hours(1)).unwrap();
        assert_eq!(decode_token("secret", &token).unwrap().sub, "wallet");
        assert!(decode_token("other-secret", &token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        // Past the default 60s leeway
        let token = create_token("secret", "wallet", chrono::Duration::minutes(-5)).unwrap();
        let err = decode_token("secret", &token).unwrap_err();
        assert_eq!(err.reason(), "invalid-credential");
    }
}
