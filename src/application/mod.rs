//! Application layer: request/verification reconciliation.
//!
//! A `PaymentSession` owns one payment request and the `VerificationPoller` watching the
//! ledger for it. The poller runs as a single tokio task per session and reports progress
//! through a `tokio::sync::mpsc` channel of `PaymentEvent`s, while its lifecycle state is
//! published through a `tokio::sync::watch` channel.

pub mod poller;
pub mod session;
