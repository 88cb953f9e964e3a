use crate::domain::address::Address;
use crate::domain::ledger::{Commitment, Signature, SignatureInfo, TransactionDetail};
use crate::domain::ports::LedgerClient;
use crate::error::LedgerError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct LedgerState {
    /// Newest first, per address.
    history: HashMap<Address, Vec<SignatureInfo>>,
    transactions: HashMap<Signature, TransactionDetail>,
    pending_failures: usize,
}

/// A scriptable in-process ledger.
///
/// `Clone` shares the underlying state, so a test can keep a handle and mutate the ledger
/// while a poller reads from it. Every call through `LedgerClient` is counted.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
    calls: Arc<AtomicUsize>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a signature to `address`'s history as its newest entry.
    pub async fn record_signature(&self, address: &Address, info: SignatureInfo) {
        let mut state = self.state.write().await;
        state.history.entry(address.clone()).or_default().insert(0, info);
    }

    /// Makes `signature` resolvable through `transaction`.
    pub async fn record_transaction(&self, signature: Signature, detail: TransactionDetail) {
        let mut state = self.state.write().await;
        state.transactions.insert(signature, detail);
    }

    /// The next `count` ledger calls fail with a transport error.
    pub async fn fail_next(&self, count: usize) {
        let mut state = self.state.write().await;
        state.pending_failures = count;
    }

    /// Number of `LedgerClient` calls served so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn begin_call(&self) -> Result<(), LedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.write().await;
        if state.pending_failures > 0 {
            state.pending_failures -= 1;
            return Err(LedgerError::Transport("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn signatures_for_address(
        &self,
        address: &Address,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, LedgerError> {
        self.begin_call().await?;
        let state = self.state.read().await;
        Ok(state
            .history
            .get(address)
            .map(|history| history.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn transaction(
        &self,
        signature: &Signature,
        _commitment: Commitment,
    ) -> Result<Option<TransactionDetail>, LedgerError> {
        self.begin_call().await?;
        let state = self.state.read().await;
        Ok(state.transactions.get(signature).cloned())
    }
}
