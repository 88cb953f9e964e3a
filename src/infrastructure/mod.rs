//! Ledger adapters implementing `domain::ports::LedgerClient`.

pub mod in_memory;
pub mod rpc;
