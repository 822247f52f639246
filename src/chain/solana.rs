use crate::chain::ChainClient;
use crate::error::{Error, Result};
use crate::model::{SignatureInfo, Transaction};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{instrument, trace};
use url::Url;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Minimal Solana JSON-RPC client over HTTP.
pub struct SolanaRpcClient {
    client: Client,
    rpc_url: Url,
    next_id: AtomicU64,
}

impl SolanaRpcClient {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self> {
        let rpc_url = Url::parse(rpc_url)
            .map_err(|e| Error::Parse(format!("invalid rpc url '{}': {}", rpc_url, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            rpc_url,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest { jsonrpc: "2.0", id, method, params };

        trace!(id, method, "Sending rpc request");

        let response = self.client
            .post(self.rpc_url.clone())
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: RpcResponse<T> = response.json().await?;

        if let Some(err) = body.error {
            return Err(Error::ChainRpc(format!("{} failed ({}): {}", method, err.code, err.message)));
        }

        Ok(body.result)
    }
}

impl ChainClient for SolanaRpcClient {
    #[instrument(level = "debug", skip(self))]
    async fn get_signatures_for_address(&self, address: &str, limit: usize) -> Result<Vec<SignatureInfo>> {
        let signatures: Option<Vec<SignatureInfo>> = self.call(
            "getSignaturesForAddress",
            json!([address, { "limit": limit, "commitment": "confirmed" }]),
        ).await?;

        Ok(signatures.unwrap_or_default())
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_transaction(&self, signature: &str) -> Result<Option<Transaction>> {
        self.call(
            "getTransaction",
            json!([signature, {
                "encoding": "jsonParsed",
                "commitment": "confirmed",
                "maxSupportedTransactionVersion": 0
            }]),
        ).await
    }
}
