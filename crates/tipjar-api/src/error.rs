use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::IntoResponse,
    response::Response,
};
use thiserror::Error;
use tracing::{error, warn};

use tipjar_chain::{ChainError, RejectReason};
use tipjar_types::api::ErrorBody;

use crate::ledger::LedgerError;

/// Every error a handler can return. Each variant maps to one HTTP status
/// and carries a machine-readable reason next to the human message.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed input; the caller must fix the request.
    #[error("{message}")]
    Validation { reason: &'static str, message: String },

    /// Unknown, consumed or expired challenge, bad signature, or a missing
    /// or invalid session credential.
    #[error("{message}")]
    Unauthorized { reason: &'static str, message: String },

    /// Authenticated, but not allowed to act for this wallet.
    #[error("{message}")]
    Forbidden { reason: &'static str, message: String },

    /// The transaction signature is already recorded.
    #[error("donation for transaction {0} already recorded")]
    Duplicate(String),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("payment rejected: {0}")]
    PaymentRejected(RejectReason),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(reason: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            reason,
            message: message.into(),
        }
    }

    pub fn unauthorized(reason: &'static str, message: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason,
            message: message.into(),
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Validation { reason, .. }
            | Self::Unauthorized { reason, .. }
            | Self::Forbidden { reason, .. } => reason,
            Self::Duplicate(_) => "duplicate-transaction",
            Self::Chain(e) => e.reason(),
            Self::PaymentRejected(r) => r.code(),
            Self::Storage(_) => "storage-error",
            Self::Internal(_) => "internal-error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } | Self::PaymentRejected(_) => StatusCode::FORBIDDEN,
            Self::Duplicate(_) => StatusCode::CONFLICT,
            Self::Chain(ChainError::InvalidTransaction(_)) => StatusCode::BAD_REQUEST,
            Self::Chain(ChainError::NotConfigured(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Chain(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Duplicate(sig) => Self::Duplicate(sig),
            LedgerError::Storage(msg) => Self::Storage(msg),
        }
    }
}

/// Body shape problems are all plain 400s, whatever axum would pick.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation("invalid-body", rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation("invalid-query", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{} ({}): {}", status, self.reason(), self);
        } else {
            warn!("{} ({}): {}", status, self.reason(), self);
        }

        let body = ErrorBody {
            error: self.reason().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_errors_are_distinguishable() {
        let timeout = ApiError::from(ChainError::ConfirmationTimeout {
            signature: "s".into(),
            polls: 10,
        });
        assert_eq!(timeout.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(timeout.reason(), "confirmation-timeout");

        let rejected = ApiError::from(ChainError::Rejected("InstructionError".into()));
        assert_eq!(rejected.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(rejected.reason(), "chain-rejected");

        let config = ApiError::from(ChainError::NotConfigured("treasury".into()));
        assert_eq!(config.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn payment_rejection_is_forbidden_with_reason() {
        let err = ApiError::PaymentRejected(RejectReason::SenderMismatch);
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.reason(), "sender-mismatch");
    }

    #[test]
    fn duplicate_is_conflict() {
        let err = ApiError::from(LedgerError::Duplicate("sig".into()));
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.reason(), "duplicate-transaction");
    }
}
