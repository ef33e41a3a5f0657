//! Chain-specific types and error definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during chain operations.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The RPC endpoint could not be reached or answered garbage.
    #[error("RPC transport error: {0}")]
    Network(String),

    /// The RPC endpoint answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The transaction executed and failed on-chain.
    #[error("transaction rejected on-chain: {0}")]
    Rejected(String),

    /// The transaction was never seen confirmed within the poll budget.
    #[error("transaction {signature} not confirmed after {polls} polls")]
    ConfirmationTimeout { signature: String, polls: u32 },

    /// The transaction bytes or an address could not be used.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// A required setting (such as the treasury wallet) is missing.
    #[error("chain not configured: {0}")]
    NotConfigured(String),
}

impl ChainError {
    /// Machine-readable reason for API responses.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Network(_) => "chain-unreachable",
            Self::Rpc { .. } => "chain-rpc-error",
            Self::Rejected(_) => "chain-rejected",
            Self::ConfirmationTimeout { .. } => "confirmation-timeout",
            Self::InvalidTransaction(_) => "invalid-transaction",
            Self::NotConfigured(_) => "chain-not-configured",
        }
    }

    /// Whether a fresh broadcast could change the outcome. An on-chain
    /// failure ends one attempt only, since a rebroadcast may land in a
    /// different slot; bad bytes and missing settings never improve.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidTransaction(_) | Self::NotConfigured(_))
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// Commitment level, in increasing order of finality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }
}

/// Status of a broadcast signature as reported by the cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureStatus {
    /// Present when the transaction executed and failed.
    pub err: Option<serde_json::Value>,
    pub confirmation: Option<Commitment>,
}

impl SignatureStatus {
    pub fn reached(&self, target: Commitment) -> bool {
        self.confirmation.is_some_and(|c| c >= target)
    }
}

/// A settled transaction reduced to what payment verification needs.
/// `pre_balances[i]` and `post_balances[i]` belong to `account_keys[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SettledTransaction {
    pub account_keys: Vec<String>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub err: Option<serde_json::Value>,
}

impl SettledTransaction {
    /// Lamport delta (post - pre) for `account`, if it appears in the
    /// transaction.
    pub fn balance_delta(&self, account: &str) -> Option<i128> {
        let index = self.account_keys.iter().position(|k| k == account)?;
        let pre = *self.pre_balances.get(index)?;
        let post = *self.post_balances.get(index)?;
        Some(post as i128 - pre as i128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commitment_ordering() {
        let status = SignatureStatus {
            err: None,
            confirmation: Some(Commitment::Confirmed),
        };
        assert!(status.reached(Commitment::Processed));
        assert!(status.reached(Commitment::Confirmed));
        assert!(!status.reached(Commitment::Finalized));
    }

    #[test]
    fn delta_for_known_and_unknown_accounts() {
        let tx = SettledTransaction {
            account_keys: vec!["a".into(), "b".into()],
            pre_balances: vec![100, 5],
            post_balances: vec![40, 60],
            err: None,
        };
        assert_eq!(tx.balance_delta("a"), Some(-60));
        assert_eq!(tx.balance_delta("b"), Some(55));
        assert_eq!(tx.balance_delta("c"), None);
    }

    #[test]
    fn retryable_classification() {
        assert!(ChainError::Network("down".into()).is_retryable());
        assert!(ChainError::Rejected("InstructionError".into()).is_retryable());
        assert!(!ChainError::InvalidTransaction("truncated".into()).is_retryable());
        assert!(!ChainError::NotConfigured("treasury".into()).is_retryable());
        assert_eq!(
            ChainError::ConfirmationTimeout { signature: "s".into(), polls: 10 }.reason(),
            "confirmation-timeout"
        );
    }
}
