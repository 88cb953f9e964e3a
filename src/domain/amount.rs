use crate::error::ValidationError;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// Largest scale `Decimal` can carry.
const MAX_SCALE: u32 = 28;
/// `Decimal::MAX` is below 10^29, so larger exponents always overflow a non-zero mantissa.
const MAX_EXPONENT: i32 = 56;

/// A strictly positive payment amount, in whole SOL.
///
/// Wraps `rust_decimal::Decimal` so the amount is carried at arbitrary precision and is never
/// rendered in exponent notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, ValidationError> {
        if value > Decimal::ZERO {
            Ok(Self(value.normalize()))
        } else {
            Err(ValidationError::InvalidAmount(value.to_string()))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl FromStr for Amount {
    type Err = ValidationError;

    /// Accepts plain decimals (`"0.5"`) and scientific notation (`"5e-1"`).
    ///
    /// `NaN`, infinities, digit separators and anything that cannot be represented without
    /// rounding are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidAmount(s.to_string());
        let trimmed = s.trim();
        if trimmed.contains('_') {
            return Err(invalid());
        }

        let (base, exponent) = match trimmed.split_once(['e', 'E']) {
            Some((base, exponent)) => (base, Some(exponent)),
            None => (trimmed, None),
        };
        let mantissa = parse_exact(base).ok_or_else(invalid)?;
        let value = match exponent {
            None => mantissa,
            Some(exponent) => {
                let exponent: i32 = exponent.parse().map_err(|_| invalid())?;
                scale_exact(mantissa, exponent).ok_or_else(invalid)?
            }
        };
        Self::new(value).map_err(|_| invalid())
    }
}

/// `mantissa * 10^exponent`, or `None` if the result would overflow or need rounding.
fn scale_exact(mantissa: Decimal, exponent: i32) -> Option<Decimal> {
    if exponent < 0 {
        let scale = mantissa.scale().checked_add(exponent.unsigned_abs())?;
        if scale > MAX_SCALE {
            return None;
        }
        let mut value = mantissa;
        value.set_scale(scale).ok()?;
        Some(value)
    } else if exponent > MAX_EXPONENT {
        None
    } else {
        (0..exponent).try_fold(mantissa, |value, _| value.checked_mul(Decimal::TEN))
    }
}

/// Parses a plain decimal, refusing inputs `Decimal` would round.
fn parse_exact(s: &str) -> Option<Decimal> {
    let value = Decimal::from_str(s).ok()?;
    let fraction_digits = s.split_once('.').map_or(0, |(_, fraction)| fraction.len());
    (value.scale() as usize == fraction_digits).then_some(value)
}

impl TryFrom<Decimal> for Amount {
    type Error = ValidationError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
