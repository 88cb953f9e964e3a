use super::address::{Address, Reference};
use super::amount::Amount;
use crate::error::ValidationError;
use std::fmt;
use std::str::FromStr;
use url::form_urlencoded;

pub const SCHEME: &str = "solana";

/// An immutable request for a transfer to `recipient`, correlated by `reference`.
///
/// `Display` renders the payment descriptor:
/// `solana:<recipient>?amount=..&memo=..&label=..&message=..&reference=..`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub recipient: Address,
    pub amount: Amount,
    pub memo: Option<String>,
    pub label: Option<String>,
    pub message: Option<String>,
    pub reference: Reference,
}

impl PaymentRequest {
    pub fn descriptor(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PaymentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("amount", &self.amount.to_string());
        if let Some(memo) = &self.memo {
            query.append_pair("memo", memo);
        }
        if let Some(label) = &self.label {
            query.append_pair("label", label);
        }
        if let Some(message) = &self.message {
            query.append_pair("message", message);
        }
        query.append_pair("reference", &self.reference.to_string());
        write!(f, "{SCHEME}:{}?{}", self.recipient, query.finish())
    }
}

impl FromStr for PaymentRequest {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| ValidationError::MalformedDescriptor(reason.to_string());

        let rest = s
            .strip_prefix(SCHEME)
            .and_then(|r| r.strip_prefix(':'))
            .ok_or_else(|| malformed("missing `solana:` scheme"))?;
        let (recipient, query) = rest.split_once('?').unwrap_or((rest, ""));
        let recipient: Address = recipient.parse()?;

        let mut amount = None;
        let mut memo = None;
        let mut label = None;
        let mut message = None;
        let mut reference = None;
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "amount" => amount = Some(value.parse::<Amount>()?),
                "memo" => memo = Some(value.into_owned()),
                "label" => label = Some(value.into_owned()),
                "message" => message = Some(value.into_owned()),
                "reference" => reference = Some(value.parse::<Reference>()?),
                _ => {}
            }
        }

        Ok(Self {
            recipient,
            amount: amount.ok_or_else(|| malformed("missing amount"))?,
            memo,
            label,
            message,
            reference: reference.ok_or_else(|| malformed("missing reference"))?,
        })
    }
}

/// Builds payment requests, each bound to a freshly generated [`Reference`].
///
/// With `describe_amount` enabled, a request built without a message falls back to the memo,
/// or to `Payment of <amount> SOL` when there is no memo either.
#[derive(Debug, Clone, Default)]
pub struct RequestBuilder {
    default_label: Option<String>,
    describe_amount: bool,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_label(mut self, label: impl Into<String>) -> Self {
        self.default_label = Some(label.into());
        self
    }

    pub fn describe_amount(mut self, enabled: bool) -> Self {
        self.describe_amount = enabled;
        self
    }

    pub fn build(
        &self,
        recipient: &str,
        amount: &str,
        memo: Option<&str>,
        label: Option<&str>,
        message: Option<&str>,
    ) -> Result<PaymentRequest, ValidationError> {
        let recipient: Address = recipient.parse()?;
        let amount: Amount = amount.parse()?;

        let memo = memo
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        let label = label.map(str::to_string).or_else(|| self.default_label.clone());
        let message = match message {
            Some(m) => Some(m.to_string()),
            None if self.describe_amount => Some(
                memo.clone()
                    .unwrap_or_else(|| format!("Payment of {amount} SOL")),
            ),
            None => None,
        };

        Ok(PaymentRequest {
            recipient,
            amount,
            memo,
            label,
            message,
            reference: Reference::generate(),
        })
    }
}
