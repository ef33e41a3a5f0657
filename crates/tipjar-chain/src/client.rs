//! Chain RPC access.
//!
//! # Responsibilities
//! - Fetch a fresh blockhash for transaction building
//! - Broadcast signed transactions
//! - Poll signature status
//! - Fetch settled transactions with their balance tables

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::types::{ChainError, ChainResult, Commitment, SettledTransaction, SignatureStatus};

/// JSON-RPC code for a transaction that failed preflight simulation.
const PREFLIGHT_FAILURE: i64 = -32002;

/// Narrow view of the chain used by the relay and the verifier.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Most recent finalized blockhash. Blockhashes expire after roughly a
    /// minute, so callers must not cache this across transactions.
    async fn latest_blockhash(&self) -> ChainResult<[u8; 32]>;

    /// Broadcast a signed wire transaction, returning its signature.
    async fn send_transaction(&self, signed_tx: &[u8]) -> ChainResult<String>;

    /// `None` while the cluster has not seen the signature.
    async fn signature_status(&self, signature: &str) -> ChainResult<Option<SignatureStatus>>;

    /// `None` when no transaction with this signature is known at `commitment`.
    async fn get_transaction(
        &self,
        signature: &str,
        commitment: Commitment,
    ) -> ChainResult<Option<SettledTransaction>>;
}

/// ChainClient over Solana HTTP JSON-RPC.
pub struct RpcChainClient {
    http: reqwest::Client,
    rpc_url: String,
    next_id: AtomicU64,
}

impl RpcChainClient {
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> ChainResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let rpc_url = rpc_url.into();
        tracing::info!(rpc_url = %rpc_url, timeout_secs = timeout.as_secs(), "Chain RPC client initialized");
        Ok(Self {
            http,
            rpc_url,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> ChainResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self.http.post(&self.rpc_url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChainError::Network(format!("{} returned HTTP {}", method, status)));
        }

        let envelope: RpcEnvelope = response.json().await?;
        if let Some(err) = envelope.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        serde_json::from_value(envelope.result)
            .map_err(|e| ChainError::Network(format!("{}: unexpected result shape: {}", method, e)))
    }
}

impl std::fmt::Debug for RpcChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChainClient")
            .field("rpc_url", &self.rpc_url)
            .finish()
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn latest_blockhash(&self) -> ChainResult<[u8; 32]> {
        let result: WithContext<LatestBlockhash> = self
            .call("getLatestBlockhash", json!([{ "commitment": "finalized" }]))
            .await?;
        decode_blockhash(&result.value.blockhash)
    }

    async fn send_transaction(&self, signed_tx: &[u8]) -> ChainResult<String> {
        let params = json!([
            B64.encode(signed_tx),
            { "encoding": "base64", "preflightCommitment": "confirmed" }
        ]);
        match self.call::<String>("sendTransaction", params).await {
            Err(ChainError::Rpc { code, message }) if code == PREFLIGHT_FAILURE => {
                Err(ChainError::Rejected(message))
            }
            other => other,
        }
    }

    async fn signature_status(&self, signature: &str) -> ChainResult<Option<SignatureStatus>> {
        let result: WithContext<Vec<Option<RpcSignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": true }]),
            )
            .await?;

        Ok(result.value.into_iter().next().flatten().map(|s| SignatureStatus {
            err: s.err.filter(|e| !e.is_null()),
            confirmation: s.confirmation_status,
        }))
    }

    async fn get_transaction(
        &self,
        signature: &str,
        commitment: Commitment,
    ) -> ChainResult<Option<SettledTransaction>> {
        let result: Option<RpcTransaction> = self
            .call(
                "getTransaction",
                json!([
                    signature,
                    {
                        "commitment": commitment.as_str(),
                        "encoding": "json",
                        "maxSupportedTransactionVersion": 0
                    }
                ]),
            )
            .await?;

        let Some(tx) = result else {
            return Ok(None);
        };
        let meta = tx
            .meta
            .ok_or_else(|| ChainError::Network(format!("transaction {} has no meta", signature)))?;

        // v0 transactions append lookup-table accounts after the static keys
        let mut account_keys = tx.transaction.message.account_keys;
        if let Some(loaded) = meta.loaded_addresses {
            account_keys.extend(loaded.writable);
            account_keys.extend(loaded.readonly);
        }

        Ok(Some(SettledTransaction {
            account_keys,
            pre_balances: meta.pre_balances,
            post_balances: meta.post_balances,
            err: meta.err.filter(|e| !e.is_null()),
        }))
    }
}

pub(crate) fn decode_blockhash(encoded: &str) -> ChainResult<[u8; 32]> {
    bs58::decode(encoded)
        .into_vec()
        .ok()
        .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
        .ok_or_else(|| ChainError::Network(format!("malformed blockhash '{}'", encoded)))
}

// ── JSON-RPC wire shapes ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct LatestBlockhash {
    blockhash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcSignatureStatus {
    err: Option<Value>,
    confirmation_status: Option<Commitment>,
}

#[derive(Debug, Deserialize)]
struct RpcTransaction {
    meta: Option<RpcTransactionMeta>,
    transaction: RpcTransactionBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTransactionMeta {
    err: Option<Value>,
    pre_balances: Vec<u64>,
    post_balances: Vec<u64>,
    loaded_addresses: Option<RpcLoadedAddresses>,
}

#[derive(Debug, Deserialize)]
struct RpcLoadedAddresses {
    #[serde(default)]
    writable: Vec<String>,
    #[serde(default)]
    readonly: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RpcTransactionBody {
    message: RpcMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcMessage {
    account_keys: Vec<String>,
}
