//! Transaction building, broadcasting, and confirmation monitoring.
//!
//! # Responsibilities
//! - Build unsigned transfers to the treasury against a fresh blockhash
//! - Broadcast signed transactions
//! - Poll for confirmation
//! - Retry broadcast with linear backoff inside a fixed budget

use std::sync::Arc;
use std::time::Duration;

use tipjar_crypto::WalletAddress;
use tokio::time::sleep;

use crate::client::ChainClient;
use crate::transaction::{encode_unsigned_transfer, first_signature};
use crate::types::{ChainError, ChainResult, Commitment};

/// Retry budget for `TransactionRelay::relay`.
#[derive(Debug, Clone)]
pub struct RelayPolicy {
    /// Broadcast attempts before giving up.
    pub max_attempts: u32,
    /// Delay before attempt `n + 1` is `n × backoff_step`.
    pub backoff_step: Duration,
    /// Status polls per attempt.
    pub confirm_polls: u32,
    pub confirm_interval: Duration,
    pub commitment: Commitment,
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_secs(1),
            confirm_polls: 10,
            confirm_interval: Duration::from_secs(2),
            commitment: Commitment::Confirmed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UnsignedTransfer {
    pub transaction: Vec<u8>,
    /// Base58 blockhash the transaction was built against.
    pub blockhash: String,
    pub lamports: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub signature: String,
    pub confirmed: bool,
}

/// Builds transfers to the treasury and pushes signed ones through to
/// confirmation.
pub struct TransactionRelay {
    client: Arc<dyn ChainClient>,
    treasury: Option<WalletAddress>,
    policy: RelayPolicy,
}

impl TransactionRelay {
    pub fn new(client: Arc<dyn ChainClient>, treasury: Option<WalletAddress>, policy: RelayPolicy) -> Self {
        Self {
            client,
            treasury,
            policy,
        }
    }

    /// Build an unsigned transfer of `lamports` from `sender` to the treasury.
    ///
    /// A new blockhash is fetched on every call.
    pub async fn build_unsigned_transfer(&self, sender: &str, lamports: u64) -> ChainResult<UnsignedTransfer> {
        let treasury = self
            .treasury
            .ok_or_else(|| ChainError::NotConfigured("treasury wallet is not set".into()))?;
        let sender: WalletAddress = sender
            .parse()
            .map_err(|e| ChainError::InvalidTransaction(format!("sender: {}", e)))?;
        if sender == treasury {
            return Err(ChainError::InvalidTransaction("sender is the treasury".into()));
        }
        if lamports == 0 {
            return Err(ChainError::InvalidTransaction("transfer amount is zero".into()));
        }

        let blockhash = self.client.latest_blockhash().await?;
        let transaction = encode_unsigned_transfer(&sender, &treasury, lamports, &blockhash);

        tracing::debug!(sender = %sender, lamports, "Built unsigned transfer");
        Ok(UnsignedTransfer {
            transaction,
            blockhash: bs58::encode(blockhash).into_string(),
            lamports,
        })
    }

    /// Broadcast `signed_tx` and wait for confirmation, retrying the whole
    /// cycle within the policy budget. The first confirmed attempt wins.
    /// A non-retryable error ends the loop at once; otherwise the last error
    /// is returned once the budget is spent.
    pub async fn relay(&self, signed_tx: &[u8]) -> ChainResult<RelayOutcome> {
        let expected = first_signature(signed_tx)?;
        let mut last_err = None;

        for attempt in 1..=self.policy.max_attempts {
            if attempt > 1 {
                sleep(self.policy.backoff_step * (attempt - 1)).await;
            }

            match self.broadcast_and_confirm(signed_tx, &expected).await {
                Ok(signature) => {
                    tracing::info!(signature = %signature, attempt, "Transaction confirmed");
                    return Ok(RelayOutcome {
                        signature,
                        confirmed: true,
                    });
                }
                Err(e) if !e.is_retryable() => {
                    tracing::warn!(signature = %expected, attempt, error = %e, "Relay aborted");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        signature = %expected,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        error = %e,
                        "Relay attempt failed"
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or(ChainError::ConfirmationTimeout {
            signature: expected,
            polls: 0,
        }))
    }

    /// Poll `signature` until it reaches the policy commitment, fails
    /// on-chain, or the poll budget runs out.
    pub async fn await_confirmation(&self, signature: &str) -> ChainResult<()> {
        self.await_commitment(signature, self.policy.commitment).await
    }

    /// Same as `await_confirmation` with an explicit target commitment.
    pub async fn await_commitment(&self, signature: &str, target: Commitment) -> ChainResult<()> {
        let polls = self.policy.confirm_polls;

        for poll in 1..=polls {
            match self.client.signature_status(signature).await {
                Ok(Some(status)) if status.err.is_some() => {
                    let err = status.err.map(|e| e.to_string()).unwrap_or_default();
                    return Err(ChainError::Rejected(err));
                }
                Ok(Some(status)) if status.reached(target) => return Ok(()),
                Ok(_) => {
                    tracing::debug!(signature = %signature, poll, "Transaction pending");
                }
                Err(e) => {
                    tracing::warn!(signature = %signature, poll, error = %e, "Status poll failed");
                }
            }

            if poll < polls {
                sleep(self.policy.confirm_interval).await;
            }
        }

        Err(ChainError::ConfirmationTimeout {
            signature: signature.to_string(),
            polls,
        })
    }

    async fn broadcast_and_confirm(&self, signed_tx: &[u8], expected: &str) -> ChainResult<String> {
        let signature = match self.client.send_transaction(signed_tx).await {
            Ok(signature) => signature,
            Err(send_err) => {
                // A previous attempt may have landed after its polls ran out,
                // in which case the cluster refuses the duplicate broadcast.
                return match self.client.signature_status(expected).await {
                    Ok(Some(status)) if status.err.is_none() && status.reached(self.policy.commitment) => {
                        Ok(expected.to_string())
                    }
                    _ => Err(send_err),
                };
            }
        };

        if signature != expected {
            tracing::warn!(expected = %expected, returned = %signature, "RPC returned a different signature");
        }

        self.await_confirmation(&signature).await?;
        Ok(signature)
    }
}
