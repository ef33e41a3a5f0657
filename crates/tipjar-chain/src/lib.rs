//! Solana integration.
//!
//! # Data Flow
//! ```text
//! client.rs       (JSON-RPC: blockhash, send, status, settled tx)
//!     → transaction.rs (unsigned transfer encoding, signature extraction)
//!     → relay.rs       (build, broadcast, confirm with bounded retry)
//!     → verifier.rs    (balance-delta proof of payment)
//! ```

pub mod client;
pub mod relay;
pub mod transaction;
pub mod types;
pub mod verifier;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{ChainClient, RpcChainClient};
pub use relay::{RelayOutcome, RelayPolicy, TransactionRelay, UnsignedTransfer};
pub use types::{ChainError, ChainResult, Commitment, SettledTransaction, SignatureStatus};
pub use verifier::{PaymentVerdict, PaymentVerifier, RejectReason};
