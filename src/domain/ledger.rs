use serde::{Deserialize, Serialize};
use std::fmt;

/// A transaction signature as reported by the ledger (base58 text).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(pub String);

impl Signature {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Consistency level requested when reading ledger state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

/// One entry of an address's transaction history.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: Signature,
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
}

impl SignatureInfo {
    pub fn new(signature: impl Into<String>, slot: u64) -> Self {
        Self {
            signature: Signature::new(signature),
            slot,
            block_time: None,
        }
    }
}

/// A resolved transaction.
///
/// `succeeded` is false when the transaction landed but failed during execution, or when
/// the ledger returned no execution metadata for it.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionDetail {
    pub slot: u64,
    pub succeeded: bool,
    pub raw: serde_json::Value,
}

impl TransactionDetail {
    pub fn succeeded(slot: u64) -> Self {
        Self {
            slot,
            succeeded: true,
            raw: serde_json::Value::Null,
        }
    }

    pub fn failed(slot: u64) -> Self {
        Self {
            slot,
            succeeded: false,
            raw: serde_json::Value::Null,
        }
    }
}
