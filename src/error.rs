use thiserror::Error;

/// Rejections raised while building or parsing a payment request.
///
/// These are raised synchronously and always before any ledger interaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid recipient address: {0:?}")]
    InvalidAddress(String),
    #[error("invalid amount: {0:?}")]
    InvalidAmount(String),
    #[error("invalid reference: {0:?}")]
    InvalidReference(String),
    #[error("malformed payment descriptor: {0}")]
    MalformedDescriptor(String),
}

/// Failures of the ledger read path.
///
/// The poller treats every variant as transient and retries on the next tick.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("ledger request timed out")]
    Timeout,
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("unexpected ledger response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LedgerError::Timeout
        } else if err.is_decode() {
            LedgerError::Decode(err.to_string())
        } else {
            LedgerError::Transport(err.to_string())
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("a payment request was already submitted on this session")]
    AlreadySubmitted,
    #[error("the payment session is already closed")]
    Closed,
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
