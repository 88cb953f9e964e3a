use crate::domain::address::Address;
use crate::domain::ledger::{Commitment, Signature, SignatureInfo, TransactionDetail};
use crate::domain::ports::LedgerClient;
use crate::error::LedgerError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Public RPC endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Cluster {
    #[default]
    Devnet,
    Testnet,
    MainnetBeta,
}

impl Cluster {
    pub fn url(&self) -> &'static str {
        match self {
            Cluster::Devnet => "https://api.devnet.solana.com",
            Cluster::Testnet => "https://api.testnet.solana.com",
            Cluster::MainnetBeta => "https://api.mainnet-beta.solana.com",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub url: String,
    /// Upper bound on a single JSON-RPC round trip.
    pub request_timeout: Duration,
    /// Commitment used for history lookups.
    pub commitment: Commitment,
}

impl RpcConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            commitment: Commitment::Confirmed,
        }
    }
}

impl From<Cluster> for RpcConfig {
    fn from(cluster: Cluster) -> Self {
        Self::new(cluster.url())
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// `LedgerClient` over Solana's HTTP JSON-RPC API.
pub struct RpcLedgerClient {
    http: reqwest::Client,
    config: RpcConfig,
    next_id: AtomicU64,
}

impl RpcLedgerClient {
    pub fn new(config: RpcConfig) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            config,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Performs one JSON-RPC call. A `null` or absent result comes back as `None`.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, LedgerError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        tracing::debug!(method, id = request.id, url = %self.config.url, "rpc call");

        let response = self
            .http
            .post(&self.config.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let body: RpcResponse<T> = response.json().await?;

        if let Some(error) = body.error {
            return Err(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(body.result)
    }
}

/// A landed transaction succeeded when it carries execution metadata without an error.
fn transaction_detail(raw: Value) -> Result<TransactionDetail, LedgerError> {
    let slot = raw
        .get("slot")
        .and_then(Value::as_u64)
        .ok_or_else(|| LedgerError::Decode("transaction without slot".to_string()))?;
    let succeeded = match raw.get("meta") {
        Some(meta) if !meta.is_null() => meta.get("err").is_none_or(Value::is_null),
        _ => false,
    };
    Ok(TransactionDetail {
        slot,
        succeeded,
        raw,
    })
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn signatures_for_address(
        &self,
        address: &Address,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, LedgerError> {
        let params = json!([
            address.as_str(),
            { "limit": limit, "commitment": self.config.commitment },
        ]);
        self.call::<Vec<SignatureInfo>>("getSignaturesForAddress", params)
            .await?
            .ok_or_else(|| LedgerError::Decode("missing result".to_string()))
    }

    async fn transaction(
        &self,
        signature: &Signature,
        commitment: Commitment,
    ) -> Result<Option<TransactionDetail>, LedgerError> {
        let params = json!([
            signature.as_str(),
            {
                "commitment": commitment,
                "encoding": "json",
                "maxSupportedTransactionVersion": 0,
            },
        ]);
        self.call::<Value>("getTransaction", params)
            .await?
            .filter(|raw| !raw.is_null())
            .map(transaction_detail)
            .transpose()
    }
}
