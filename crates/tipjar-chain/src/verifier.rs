//! Proof of payment from settled balance tables.

use std::fmt;
use std::sync::Arc;

use tipjar_crypto::WalletAddress;
use tipjar_types::models::DonationType;

use crate::client::ChainClient;
use crate::types::{ChainError, ChainResult, Commitment};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    TransactionNotFound,
    TransactionFailed(String),
    RecipientMismatch,
    InsufficientAmount { required: u64, received: i128 },
    SenderMismatch,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::TransactionNotFound => "transaction-not-found",
            Self::TransactionFailed(_) => "transaction-failed",
            Self::RecipientMismatch => "recipient-mismatch",
            Self::InsufficientAmount { .. } => "insufficient-amount",
            Self::SenderMismatch => "sender-mismatch",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransactionNotFound => f.write_str("transaction not found at finalized commitment"),
            Self::TransactionFailed(err) => write!(f, "transaction failed on-chain: {}", err),
            Self::RecipientMismatch => f.write_str("transaction does not touch the treasury"),
            Self::InsufficientAmount { required, received } => write!(
                f,
                "treasury received {} lamports, {} required",
                received, required
            ),
            Self::SenderMismatch => f.write_str("sender did not fund the payment"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentVerdict {
    /// `amount` is the list price of the donation type, not the raw delta.
    Verified { amount: u64 },
    Rejected(RejectReason),
}

/// Checks that a finalized transaction paid the treasury for a donation.
pub struct PaymentVerifier {
    client: Arc<dyn ChainClient>,
    treasury: Option<WalletAddress>,
}

impl PaymentVerifier {
    pub fn new(client: Arc<dyn ChainClient>, treasury: Option<WalletAddress>) -> Self {
        Self { client, treasury }
    }

    /// Rejections come back as `Ok(PaymentVerdict::Rejected(..))`; `Err` is
    /// reserved for failing to ask the chain at all.
    pub async fn verify(
        &self,
        signature: &str,
        donation_type: DonationType,
        sender: &WalletAddress,
    ) -> ChainResult<PaymentVerdict> {
        let treasury = self
            .treasury
            .ok_or_else(|| ChainError::NotConfigured("treasury wallet is not set".into()))?;
        let required = donation_type.price_lamports();

        let Some(tx) = self.client.get_transaction(signature, Commitment::Finalized).await? else {
            return Ok(reject(signature, RejectReason::TransactionNotFound));
        };
        if let Some(err) = &tx.err {
            return Ok(reject(signature, RejectReason::TransactionFailed(err.to_string())));
        }

        let Some(received) = tx.balance_delta(&treasury.to_string()) else {
            return Ok(reject(signature, RejectReason::RecipientMismatch));
        };
        if received < required as i128 {
            return Ok(reject(signature, RejectReason::InsufficientAmount { required, received }));
        }

        // The sender may be absent when a third party paid on their behalf;
        // when present it must have spent at least the price.
        if let Some(sender_delta) = tx.balance_delta(&sender.to_string()) {
            if -sender_delta < required as i128 {
                return Ok(reject(signature, RejectReason::SenderMismatch));
            }
        }

        tracing::info!(signature = %signature, donation_type = %donation_type, received = %received, "Payment verified");
        Ok(PaymentVerdict::Verified { amount: required })
    }
}

fn reject(signature: &str, reason: RejectReason) -> PaymentVerdict {
    tracing::warn!(signature = %signature, reason = %reason, "Payment rejected");
    PaymentVerdict::Rejected(reason)
}
