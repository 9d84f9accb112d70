//! Off-chain DAO runtime: event indexing and read queries for the DAO contract.
//!
//! - **ProposalIndexer**: backfills ProposalCreated, Voted and ProposalExecuted logs from a
//!   start block, then folds each new range into per-proposal aggregates and flat event logs
//!   (in-memory only; no reorg safety or confirmations).
//! - **PollScheduler**: runs the backfill, then a fixed-period, non-overlapping poll until
//!   stopped.
//! - Read side: [ProposalIndexer::all_proposals], [ProposalIndexer::proposal_by_id],
//!   [ProposalIndexer::votes_for_proposal] and [ProposalIndexer::voting_results].
//! - [JsonRpcLogSource] also reads the contract's own proposalCount() and getProposal(id)
//!   views over eth_call, for cross-checking the index against chain state.

pub mod abi;
pub mod config;
pub mod indexer;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod watermark;

pub use abi::{
    DaoEvent, DecodedLog, EventKind, LogKey, OnchainProposal, ProposalCreatedEvent,
    ProposalExecutedEvent, VotedEvent,
};
pub use config::{ConfigError, IndexerConfig};
pub use indexer::{CycleOutcome, IndexerError, ProposalIndexer};
pub use scheduler::PollScheduler;
pub use source::{JsonRpcLogSource, LogSource, SourceError};
pub use store::{AggregateStore, ApplyStats, Proposal, VotingResults};
pub use watermark::{BlockRange, Watermark};
