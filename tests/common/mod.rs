use solpay::domain::address::Reference;
use solpay::domain::ledger::{Signature, SignatureInfo, TransactionDetail};
use solpay::infrastructure::in_memory::InMemoryLedger;

/// A 44-character base58 account.
pub const RECIPIENT: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

pub const PAYMENT_SIGNATURE: &str =
    "5h6xBEauJ3PK6SWCZ1PGjBvj8vDdWG3KpwATGy1ARAXFSDwt8GFXM7W5Ncn16wmqokgpiKRLuS83KUxyZyv2sUYv";

/// Lands a transaction referencing `reference` on the ledger.
pub async fn land_payment(ledger: &InMemoryLedger, reference: &Reference, succeeded: bool) {
    let detail = if succeeded {
        TransactionDetail::succeeded(100)
    } else {
        TransactionDetail::failed(100)
    };
    ledger
        .record_transaction(Signature::new(PAYMENT_SIGNATURE), detail)
        .await;
    ledger
        .record_signature(
            &reference.to_address(),
            SignatureInfo::new(PAYMENT_SIGNATURE, 100),
        )
        .await;
}
