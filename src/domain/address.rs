use crate::error::ValidationError;
use rand::RngCore;
use rand::rngs::OsRng;
use std::fmt;
use std::str::FromStr;

/// Bitcoin base58 alphabet: no `0`, `O`, `I` or `l`.
const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

const MIN_ADDRESS_LEN: usize = 32;
const MAX_ADDRESS_LEN: usize = 44;

fn is_base58_account(s: &str) -> bool {
    (MIN_ADDRESS_LEN..=MAX_ADDRESS_LEN).contains(&s.len())
        && s.chars().all(|c| BASE58_ALPHABET.contains(c))
}

/// An opaque ledger account identifier, syntactically checked only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if is_base58_account(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(ValidationError::InvalidAddress(s.to_string()))
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single-use correlation token embedded in a payment descriptor.
///
/// Shaped like a public key (32 random bytes, base58 encoded) so wallets attach it to the
/// transfer as a read-only account, which makes the payment discoverable through
/// `getSignaturesForAddress`. No private key exists for it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reference([u8; 32]);

impl Reference {
    /// Draws a fresh token from the operating system's CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The reference as a ledger address, for history lookups.
    pub fn to_address(&self) -> Address {
        Address(self.to_string())
    }
}

impl FromStr for Reference {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        match bs58::decode(s).onto(&mut bytes) {
            Ok(32) => Ok(Self(bytes)),
            _ => Err(ValidationError::InvalidReference(s.to_string())),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reference({self})")
    }
}
