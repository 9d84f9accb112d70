//! Aggregate store: per-proposal aggregates folded from decoded events, plus the flat
//! per-kind event logs in arrival order.
//!
//! Application is keyed by `(tx_hash, log_index)`, so re-applying a range after a failed
//! cycle does not double-count. Votes are passed through in raw event order: repeat votes
//! from one address all count, exactly as the contract emitted them.

use crate::abi::{DaoEvent, DecodedLog, LogKey, ProposalCreatedEvent, ProposalExecutedEvent, VotedEvent};
use alloy::primitives::Address;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Aggregate view of one proposal. Exists iff its creation event has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: u64,
    pub description: String,
    pub creator: Address,
    pub created: ProposalCreatedEvent,
    pub votes: Vec<VotedEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed: Option<ProposalExecutedEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingResults {
    pub proposal_id: u64,
    pub for_votes: u64,
    pub against_votes: u64,
    pub total_votes: u64,
}

/// Counters for one call to [AggregateStore::apply].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub created: usize,
    pub voted: usize,
    pub executed: usize,
    /// Entries already recorded by an earlier application.
    pub duplicates: usize,
    /// Votes or executions whose proposal has no aggregate.
    pub orphaned: usize,
}

impl ApplyStats {
    pub fn applied(&self) -> usize {
        self.created + self.voted + self.executed
    }

    fn merge(&mut self, other: ApplyStats) {
        self.created += other.created;
        self.voted += other.voted;
        self.executed += other.executed;
        self.duplicates += other.duplicates;
        self.orphaned += other.orphaned;
    }
}

#[derive(Debug, Default)]
pub struct AggregateStore {
    proposals: Vec<Proposal>,
    index: HashMap<u64, usize>,
    created_events: Vec<ProposalCreatedEvent>,
    voted_events: Vec<VotedEvent>,
    executed_events: Vec<ProposalExecutedEvent>,
    seen: HashSet<LogKey>,
}

impl AggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `entries` into the store in the order given.
    pub fn apply<'a, I>(&mut self, entries: I) -> ApplyStats
    where
        I: IntoIterator<Item = &'a DecodedLog>,
    {
        let mut stats = ApplyStats::default();
        for entry in entries {
            stats.merge(self.apply_one(entry));
        }
        stats
    }

    fn apply_one(&mut self, entry: &DecodedLog) -> ApplyStats {
        let mut stats = ApplyStats::default();
        if !self.seen.insert(entry.key()) {
            tracing::debug!(
                kind = %entry.event.kind(),
                id = entry.event.proposal_id(),
                block = entry.block_number,
                log_index = entry.log_index,
                "already applied"
            );
            stats.duplicates = 1;
            return stats;
        }

        match &entry.event {
            DaoEvent::Created(ev) => {
                self.created_events.push(ev.clone());
                self.upsert_proposal(ev);
                tracing::debug!(id = ev.id, creator = %ev.creator, description = %ev.description, "ProposalCreated");
                stats.created = 1;
            }
            DaoEvent::Voted(ev) => {
                self.voted_events.push(ev.clone());
                match self.proposal_mut(ev.id) {
                    Some(p) => p.votes.push(ev.clone()),
                    None => {
                        tracing::debug!(id = ev.id, "vote for unknown proposal kept in flat log only");
                        stats.orphaned = 1;
                    }
                }
                tracing::debug!(id = ev.id, support = ev.support, voter = %ev.voter, "Voted");
                stats.voted = 1;
            }
            DaoEvent::Executed(ev) => {
                self.executed_events.push(ev.clone());
                match self.proposal_mut(ev.id) {
                    Some(p) => {
                        if p.executed.is_some() {
                            tracing::warn!(id = ev.id, "proposal executed twice, keeping latest");
                        }
                        p.executed = Some(ev.clone());
                    }
                    None => {
                        tracing::debug!(id = ev.id, "execution of unknown proposal kept in flat log only");
                        stats.orphaned = 1;
                    }
                }
                tracing::debug!(id = ev.id, executor = %ev.executor, "ProposalExecuted");
                stats.executed = 1;
            }
        }
        stats
    }

    /// Insert, or overwrite description/creator/created of an existing aggregate in place.
    fn upsert_proposal(&mut self, ev: &ProposalCreatedEvent) {
        if let Some(p) = self.proposal_mut(ev.id) {
            tracing::warn!(id = ev.id, "duplicate ProposalCreated, last write wins");
            p.description = ev.description.clone();
            p.creator = ev.creator;
            p.created = ev.clone();
            return;
        }
        self.index.insert(ev.id, self.proposals.len());
        self.proposals.push(Proposal {
            id: ev.id,
            description: ev.description.clone(),
            creator: ev.creator,
            created: ev.clone(),
            votes: Vec::new(),
            executed: None,
        });
    }

    fn proposal_mut(&mut self, id: u64) -> Option<&mut Proposal> {
        let i = *self.index.get(&id)?;
        self.proposals.get_mut(i)
    }

    /// All proposals in insertion order.
    pub fn all_proposals(&self) -> &[Proposal] {
        &self.proposals
    }

    pub fn proposal_by_id(&self, id: u64) -> Option<&Proposal> {
        self.index.get(&id).and_then(|&i| self.proposals.get(i))
    }

    /// Votes of a proposal in block-then-log order. None if the proposal is unknown.
    pub fn votes_for_proposal(&self, id: u64) -> Option<&[VotedEvent]> {
        self.proposal_by_id(id).map(|p| p.votes.as_slice())
    }

    /// Simple for/against counts over the proposal's votes; no weighting or voter dedup.
    pub fn voting_results(&self, id: u64) -> Option<VotingResults> {
        let p = self.proposal_by_id(id)?;
        let for_votes = p.votes.iter().filter(|v| v.support).count() as u64;
        let total_votes = p.votes.len() as u64;
        Some(VotingResults {
            proposal_id: id,
            for_votes,
            against_votes: total_votes - for_votes,
            total_votes,
        })
    }

    pub fn proposal_count(&self) -> usize {
        self.proposals.len()
    }

    pub fn created_events(&self) -> &[ProposalCreatedEvent] {
        &self.created_events
    }

    pub fn voted_events(&self) -> &[VotedEvent] {
        &self.voted_events
    }

    pub fn executed_events(&self) -> &[ProposalExecutedEvent] {
        &self.executed_events
    }
}
