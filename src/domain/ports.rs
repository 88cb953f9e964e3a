use super::address::Address;
use super::ledger::{Commitment, Signature, SignatureInfo, TransactionDetail};
use crate::error::LedgerError;
use async_trait::async_trait;
use std::sync::Arc;

/// Read-only access to ledger history.
///
/// Both calls are eventually consistent: a signature returned by `signatures_for_address`
/// may not resolve through `transaction` yet, in which case `Ok(None)` is returned.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Signatures touching `address`, newest first.
    async fn signatures_for_address(
        &self,
        address: &Address,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, LedgerError>;

    async fn transaction(
        &self,
        signature: &Signature,
        commitment: Commitment,
    ) -> Result<Option<TransactionDetail>, LedgerError>;
}

pub type LedgerClientRef = Arc<dyn LedgerClient>;
