//! Solana Pay payment requests with on-chain confirmation polling.
//!
//! Build a [`domain::request::PaymentRequest`], hand its descriptor to a wallet, and let an
//! [`application::session::PaymentSession`] poll the ledger until a successful transaction
//! referencing the request's correlation token shows up.

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
