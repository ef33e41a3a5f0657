//! In-memory `ChainClient` for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::client::ChainClient;
use crate::transaction::first_signature;
use crate::types::{ChainResult, Commitment, SettledTransaction, SignatureStatus};

/// Scriptable chain.
///
/// - `send_transaction` pops queued results, defaulting to the signature
///   embedded in the bytes.
/// - `signature_status` pops queued statuses; once the queue is empty it
///   reports inserted transactions as finalized and everything else as
///   unknown.
#[derive(Default)]
pub struct FakeChain {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    transactions: HashMap<String, SettledTransaction>,
    statuses: HashMap<String, VecDeque<Option<SignatureStatus>>>,
    send_results: VecDeque<ChainResult<String>>,
    blockhash_calls: u32,
    send_calls: u32,
    send_times: Vec<Instant>,
    status_calls: u32,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_transaction(&self, signature: &str, tx: SettledTransaction) {
        self.state().transactions.insert(signature.to_string(), tx);
    }

    pub fn push_statuses(&self, signature: &str, statuses: Vec<Option<SignatureStatus>>) {
        self.state()
            .statuses
            .entry(signature.to_string())
            .or_default()
            .extend(statuses);
    }

    pub fn push_send_result(&self, result: ChainResult<String>) {
        self.state().send_results.push_back(result);
    }

    pub fn blockhash_calls(&self) -> u32 {
        self.state().blockhash_calls
    }

    pub fn send_calls(&self) -> u32 {
        self.state().send_calls
    }

    /// When each broadcast arrived, by the tokio clock.
    pub fn send_times(&self) -> Vec<Instant> {
        self.state().send_times.clone()
    }

    pub fn status_calls(&self) -> u32 {
        self.state().status_calls
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn latest_blockhash(&self) -> ChainResult<[u8; 32]> {
        let mut state = self.state();
        state.blockhash_calls += 1;
        Ok([state.blockhash_calls as u8; 32])
    }

    async fn send_transaction(&self, signed_tx: &[u8]) -> ChainResult<String> {
        let mut state = self.state();
        state.send_calls += 1;
        state.send_times.push(Instant::now());
        match state.send_results.pop_front() {
            Some(result) => result,
            None => first_signature(signed_tx),
        }
    }

    async fn signature_status(&self, signature: &str) -> ChainResult<Option<SignatureStatus>> {
        let mut state = self.state();
        state.status_calls += 1;

        if let Some(next) = state.statuses.get_mut(signature).and_then(VecDeque::pop_front) {
            return Ok(next);
        }
        Ok(state.transactions.get(signature).map(|tx| SignatureStatus {
            err: tx.err.clone(),
            confirmation: Some(Commitment::Finalized),
        }))
    }

    async fn get_transaction(
        &self,
        signature: &str,
        _commitment: Commitment,
    ) -> ChainResult<Option<SettledTransaction>> {
        Ok(self.state().transactions.get(signature).cloned())
    }
}
