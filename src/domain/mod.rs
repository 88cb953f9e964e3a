//! Domain layer: payment request value objects and the ledger port.

pub mod address;
pub mod amount;
pub mod ledger;
pub mod ports;
pub mod request;
