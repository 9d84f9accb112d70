//! Chain log source: current head height and decoded DAO logs for a block range.
//!
//! [JsonRpcLogSource] talks plain JSON-RPC over HTTP (eth_blockNumber, eth_getLogs, and
//! eth_call for the contract's read views). Timeouts are the source's concern and come from
//! the HTTP client configuration.

use crate::abi::{
    decode_get_proposal_return, decode_log, decode_proposal_count_return, get_proposal_calldata,
    parse_hex_u64, proposal_count_calldata, DecodedLog, EventKind, OnchainProposal,
};
use crate::config::IndexerConfig;
use alloy::primitives::Address;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

/// Any failure talking to the chain. Always transient from the indexer's point of view.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Supplies the chain head and decoded logs of one event kind over an inclusive block range.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn current_height(&self) -> Result<u64, SourceError>;

    /// Logs of `kind` in `[from_block, to_block]`, ordered by (block_number, log_index).
    async fn query_logs(
        &self,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<DecodedLog>, SourceError>;
}

#[async_trait]
impl<T: LogSource + ?Sized> LogSource for Arc<T> {
    async fn current_height(&self) -> Result<u64, SourceError> {
        (**self).current_height().await
    }

    async fn query_logs(
        &self,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<DecodedLog>, SourceError> {
        (**self).query_logs(kind, from_block, to_block).await
    }
}

fn build_logs_filter(address: &Address, kind: EventKind, from_block: u64, to_block: u64) -> Value {
    json!({
        "address": format!("{:#x}", address),
        "topics": [format!("{:#x}", kind.topic0())],
        "fromBlock": format!("0x{:x}", from_block),
        "toBlock": format!("0x{:x}", to_block),
    })
}

async fn http_json_rpc(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Value,
    id: u64,
) -> Result<Value, SourceError> {
    let body = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params
    });
    let resp = client.post(url).json(&body).send().await?;
    let resp = resp.error_for_status()?;
    let json: Value = resp.json().await?;
    if let Some(err) = json.get("error") {
        return Err(SourceError::Rpc(err.to_string()));
    }
    json.get("result")
        .cloned()
        .ok_or_else(|| SourceError::Decode("Missing result".into()))
}

/// JSON-RPC log source for a single DAO contract.
pub struct JsonRpcLogSource {
    client: reqwest::Client,
    http_url: String,
    contract_address: Address,
    getlogs_max_range: u64,
}

impl JsonRpcLogSource {
    pub fn new(config: &IndexerConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            http_url: config.http_url.clone(),
            contract_address: config.contract_address,
            getlogs_max_range: config.getlogs_max_range.max(1),
        })
    }

    async fn eth_get_logs(&self, filter: Value) -> Result<Vec<Value>, SourceError> {
        let result = http_json_rpc(&self.client, &self.http_url, "eth_getLogs", json!([filter]), 2).await?;
        match result {
            Value::Array(arr) => Ok(arr),
            _ => Err(SourceError::Decode("getLogs not array".into())),
        }
    }

    async fn eth_call(&self, calldata: &[u8]) -> Result<Vec<u8>, SourceError> {
        let params = json!([{
            "to": format!("{:#x}", self.contract_address),
            "data": format!("0x{}", hex::encode(calldata)),
        }, "latest"]);
        let result = http_json_rpc(&self.client, &self.http_url, "eth_call", params, 3).await?;
        let s = result
            .as_str()
            .ok_or_else(|| SourceError::Decode("eth_call result not string".into()))?;
        hex::decode(s.strip_prefix("0x").unwrap_or(s)).map_err(|e| SourceError::Decode(e.to_string()))
    }

    /// Number of proposals the contract reports at the latest block.
    pub async fn proposal_count(&self) -> Result<u64, SourceError> {
        let data = self.eth_call(&proposal_count_calldata()).await?;
        decode_proposal_count_return(&data).map_err(|e| SourceError::Decode(format!("{:#}", e)))
    }

    /// Proposal `id` as stored by the contract at the latest block.
    pub async fn onchain_proposal(&self, id: u64) -> Result<OnchainProposal, SourceError> {
        let data = self.eth_call(&get_proposal_calldata(id)).await?;
        decode_get_proposal_return(&data).map_err(|e| SourceError::Decode(format!("{:#}", e)))
    }
}

#[async_trait]
impl LogSource for JsonRpcLogSource {
    async fn current_height(&self) -> Result<u64, SourceError> {
        let result = http_json_rpc(&self.client, &self.http_url, "eth_blockNumber", json!([]), 1).await?;
        let s = result
            .as_str()
            .ok_or_else(|| SourceError::Decode("blockNumber not string".into()))?;
        parse_hex_u64(s).map_err(|e| SourceError::Decode(e.to_string()))
    }

    async fn query_logs(
        &self,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<DecodedLog>, SourceError> {
        let mut out = Vec::new();
        for (from, to) in chunk_range(from_block, to_block, self.getlogs_max_range) {
            let filter = build_logs_filter(&self.contract_address, kind, from, to);
            let logs = self.eth_get_logs(filter).await?;
            let raw_count = logs.len();
            let before = out.len();
            out.extend(logs.iter().filter_map(|log| {
                decode_log(kind, log)
                    .map_err(|e| tracing::warn!(%kind, reason = %e, "undecodable log skipped"))
                    .ok()
            }));
            if raw_count > 0 {
                tracing::debug!(%kind, from, to, raw_count, decoded = out.len() - before, "eth_getLogs");
            }
        }
        out.sort_by_key(|l| (l.block_number, l.log_index));
        Ok(out)
    }
}

/// Split `[from, to]` into consecutive inclusive chunks of at most `max_range` blocks.
fn chunk_range(from: u64, to: u64, max_range: u64) -> Vec<(u64, u64)> {
    let mut chunks = Vec::new();
    let mut start = from;
    while start <= to {
        let end = start.saturating_add(max_range - 1).min(to);
        chunks.push((start, end));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    chunks
}
