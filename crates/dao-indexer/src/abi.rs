//! ABI types and decoding for the DAO contract.
//!
//! ProposalCreated, Voted and ProposalExecuted events. Decode from the JSON-RPC log shape
//! (eth_getLogs result) into the closed [DaoEvent] set before the rest of the crate sees it.
//! The proposalCount() and getProposal(id) views are encoded and decoded here for eth_call.

use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::{SolCall, SolEvent};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

/// Solidity declarations of the indexed events and read views. Event arguments are all
/// non-indexed (ABI data).
pub mod contract {
    alloy::sol! {
        event ProposalCreated(uint256 id, address creator, string description);
        event Voted(uint256 id, address voter, bool support);
        event ProposalExecuted(uint256 id, address executor);

        struct ProposalView {
            uint256 id;
            string description;
            bool executed;
        }

        function proposalCount() external view returns (uint256);
        function getProposal(uint256 id) external view returns (ProposalView memory);
    }
}

/// Event kinds queried from the contract. Declaration order is the apply order within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    Voted,
    Executed,
}

impl EventKind {
    /// All kinds in apply order: creation, then vote, then execution.
    pub const ALL: [EventKind; 3] = [EventKind::Created, EventKind::Voted, EventKind::Executed];

    /// keccak256 of the event signature (topic0 of every log of this kind).
    pub fn topic0(self) -> B256 {
        match self {
            EventKind::Created => contract::ProposalCreated::SIGNATURE_HASH,
            EventKind::Voted => contract::Voted::SIGNATURE_HASH,
            EventKind::Executed => contract::ProposalExecuted::SIGNATURE_HASH,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EventKind::Created => "ProposalCreated",
            EventKind::Voted => "Voted",
            EventKind::Executed => "ProposalExecuted",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalCreatedEvent {
    pub id: u64,
    pub creator: Address,
    pub description: String,
    pub block_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VotedEvent {
    pub id: u64,
    pub voter: Address,
    pub support: bool,
    pub block_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalExecutedEvent {
    pub id: u64,
    pub executor: Address,
    pub block_number: u64,
}

/// A decoded contract event. The indexer is polymorphic only over this set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaoEvent {
    Created(ProposalCreatedEvent),
    Voted(VotedEvent),
    Executed(ProposalExecutedEvent),
}

impl DaoEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DaoEvent::Created(_) => EventKind::Created,
            DaoEvent::Voted(_) => EventKind::Voted,
            DaoEvent::Executed(_) => EventKind::Executed,
        }
    }

    /// Proposal the event belongs to.
    pub fn proposal_id(&self) -> u64 {
        match self {
            DaoEvent::Created(e) => e.id,
            DaoEvent::Voted(e) => e.id,
            DaoEvent::Executed(e) => e.id,
        }
    }
}

/// Identity of a log on chain: `(tx_hash, log_index)`. Stable across retries of a range.
pub type LogKey = (B256, u64);

/// Decoded event with chain metadata (observed-only; no reorg safety).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLog {
    pub event: DaoEvent,
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
}

impl DecodedLog {
    pub fn key(&self) -> LogKey {
        (self.tx_hash, self.log_index)
    }
}

/// Decode a JSON-RPC log (eth_getLogs result) of the given kind into a [DecodedLog].
pub fn decode_log(kind: EventKind, log_value: &Value) -> Result<DecodedLog> {
    let block_number = parse_hex_u64(field_str(log_value, "blockNumber")?)?;
    let log_index = parse_hex_u64(field_str(log_value, "logIndex")?)?;
    let tx_hash = parse_hex_b256(field_str(log_value, "transactionHash")?)?;
    let data = parse_hex_bytes(field_str(log_value, "data")?)?;
    let topics = log_value
        .get("topics")
        .and_then(|t| t.as_array())
        .ok_or_else(|| anyhow::anyhow!("Missing topics"))?
        .iter()
        .map(|t| {
            t.as_str()
                .ok_or_else(|| anyhow::anyhow!("topic not str"))
                .and_then(parse_hex_b256)
        })
        .collect::<Result<Vec<B256>>>()?;
    match topics.first() {
        Some(t0) if *t0 == kind.topic0() => {}
        Some(t0) => anyhow::bail!("topic0 {} does not match {}", t0, kind),
        None => anyhow::bail!("log has no topics"),
    }

    let event = match kind {
        EventKind::Created => {
            let ev = contract::ProposalCreated::decode_raw_log(topics, &data, true)
                .context("decode ProposalCreated")?;
            DaoEvent::Created(ProposalCreatedEvent {
                id: proposal_id(ev.id)?,
                creator: ev.creator,
                description: ev.description,
                block_number,
            })
        }
        EventKind::Voted => {
            let ev = contract::Voted::decode_raw_log(topics, &data, true)
                .context("decode Voted")?;
            DaoEvent::Voted(VotedEvent {
                id: proposal_id(ev.id)?,
                voter: ev.voter,
                support: ev.support,
                block_number,
            })
        }
        EventKind::Executed => {
            let ev = contract::ProposalExecuted::decode_raw_log(topics, &data, true)
                .context("decode ProposalExecuted")?;
            DaoEvent::Executed(ProposalExecutedEvent {
                id: proposal_id(ev.id)?,
                executor: ev.executor,
                block_number,
            })
        }
    };

    Ok(DecodedLog {
        event,
        block_number,
        tx_hash,
        log_index,
    })
}

/// Proposal as the contract itself reports it through getProposal(id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnchainProposal {
    pub id: u64,
    pub description: String,
    pub executed: bool,
}

pub fn proposal_count_calldata() -> Vec<u8> {
    contract::proposalCountCall {}.abi_encode()
}

pub fn get_proposal_calldata(id: u64) -> Vec<u8> {
    contract::getProposalCall { id: U256::from(id) }.abi_encode()
}

/// Decode proposalCount() return data (eth_call result).
pub fn decode_proposal_count_return(data: &[u8]) -> Result<u64> {
    let ret = contract::proposalCountCall::abi_decode_returns(data, true)
        .context("decode proposalCount() return")?;
    u64::try_from(ret._0).map_err(|_| anyhow::anyhow!("proposal count {} exceeds u64", ret._0))
}

/// Decode getProposal(id) return data (eth_call result).
pub fn decode_get_proposal_return(data: &[u8]) -> Result<OnchainProposal> {
    let view = contract::getProposalCall::abi_decode_returns(data, true)
        .context("decode getProposal() return")?
        ._0;
    Ok(OnchainProposal {
        id: proposal_id(view.id)?,
        description: view.description,
        executed: view.executed,
    })
}

fn proposal_id(id: U256) -> Result<u64> {
    u64::try_from(id).map_err(|_| anyhow::anyhow!("proposal id {} exceeds u64", id))
}

fn field_str<'a>(log_value: &'a Value, name: &str) -> Result<&'a str> {
    log_value
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("Missing {}", name))
}

pub(crate) fn parse_hex_u64(s: &str) -> Result<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).context("parse hex u64")
}

fn parse_hex_bytes(s: &str) -> Result<Vec<u8>> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(s).context("parse hex bytes")
}

fn parse_hex_b256(s: &str) -> Result<B256> {
    let bytes = parse_hex_bytes(s)?;
    if bytes.len() != 32 {
        anyhow::bail!("Expected 32 bytes, got {}", bytes.len());
    }
    Ok(B256::from_slice(&bytes))
}
