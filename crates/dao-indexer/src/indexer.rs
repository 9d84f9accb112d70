//! ProposalIndexer: folds DAO contract logs into in-memory proposal aggregates.
//!
//! One cycle fetches the three event kinds for the watermark's range concurrently, applies
//! them in creation, vote, execution order, then advances the watermark. Cycles are
//! single-flight: the watermark lives behind a lock that the recurring poll only try-acquires.
//! No reorg safety; a failed cycle leaves store and watermark untouched and is retried.

use crate::abi::{EventKind, ProposalCreatedEvent, ProposalExecutedEvent, VotedEvent};
use crate::config::IndexerConfig;
use crate::source::{LogSource, SourceError};
use crate::store::{AggregateStore, ApplyStats, Proposal, VotingResults};
use crate::watermark::{BlockRange, Watermark};
use futures_util::future::try_join_all;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("chain source unavailable: {0}")]
    Source(#[from] SourceError),
}

/// Result of one guarded poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle holds the slot; nothing was done.
    Busy,
    /// Watermark is already past the chain head.
    UpToDate,
    /// Range ingested and watermark advanced.
    Applied { range: BlockRange, stats: ApplyStats },
    /// Source failed; store and watermark unchanged.
    Failed,
}

/// Explicitly owned indexer state: source, aggregate store and watermark.
pub struct ProposalIndexer<S> {
    source: S,
    config: IndexerConfig,
    store: RwLock<AggregateStore>,
    watermark: Mutex<Watermark>,
}

impl<S: LogSource> ProposalIndexer<S> {
    pub fn new(config: IndexerConfig, source: S) -> Self {
        let watermark = Watermark::new(config.start_block);
        Self {
            source,
            config,
            store: RwLock::new(AggregateStore::new()),
            watermark: Mutex::new(watermark),
        }
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Underlying chain source, e.g. for contract view reads alongside the index.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Historical catch-up from the configured start block to the current head.
    /// Waits for the cycle slot instead of skipping; errors are returned to the caller.
    pub async fn backfill(&self) -> Result<Option<ApplyStats>, IndexerError> {
        let mut watermark = self.watermark.lock().await;
        tracing::info!(from = watermark.last_processed_block(), "indexing historic events");
        let applied = self.run_cycle(&mut watermark).await?;
        let proposals = self.store.read().await.proposal_count();
        tracing::info!(
            proposals,
            next_block = watermark.last_processed_block(),
            "historic events indexed"
        );
        Ok(applied.map(|(_, stats)| stats))
    }

    /// One recurring cycle. A no-op when a cycle is already running; never returns an error.
    pub async fn poll_once(&self) -> CycleOutcome {
        let Ok(mut watermark) = self.watermark.try_lock() else {
            tracing::debug!("previous cycle still running, tick skipped");
            return CycleOutcome::Busy;
        };
        match self.run_cycle(&mut watermark).await {
            Ok(Some((range, stats))) => CycleOutcome::Applied { range, stats },
            Ok(None) => CycleOutcome::UpToDate,
            Err(e) => {
                tracing::error!(
                    reason = %e,
                    retry_from = watermark.last_processed_block(),
                    "error polling events"
                );
                CycleOutcome::Failed
            }
        }
    }

    async fn run_cycle(
        &self,
        watermark: &mut Watermark,
    ) -> Result<Option<(BlockRange, ApplyStats)>, IndexerError> {
        let height = self.source.current_height().await?;
        let Some(range) = watermark.next_range(height) else {
            return Ok(None);
        };

        // Batches come back in EventKind::ALL order, which is the apply order.
        let batches = try_join_all(
            EventKind::ALL.map(|kind| self.source.query_logs(kind, range.from, range.to)),
        )
        .await?;

        let stats = {
            let mut store = self.store.write().await;
            store.apply(batches.iter().flatten())
        };
        watermark.advance(range);

        if stats.applied() > 0 || stats.duplicates > 0 {
            tracing::info!(
                from = range.from,
                to = range.to,
                created = stats.created,
                voted = stats.voted,
                executed = stats.executed,
                duplicates = stats.duplicates,
                orphaned = stats.orphaned,
                "applied events"
            );
        } else {
            tracing::debug!(from = range.from, to = range.to, "no new events");
        }
        Ok(Some((range, stats)))
    }

    /// Next block the indexer will fetch from.
    pub async fn last_processed_block(&self) -> u64 {
        self.watermark.lock().await.last_processed_block()
    }

    /// True while a cycle holds the slot.
    pub fn is_busy(&self) -> bool {
        self.watermark.try_lock().is_err()
    }

    pub async fn all_proposals(&self) -> Vec<Proposal> {
        self.store.read().await.all_proposals().to_vec()
    }

    pub async fn proposal_by_id(&self, id: u64) -> Option<Proposal> {
        self.store.read().await.proposal_by_id(id).cloned()
    }

    pub async fn votes_for_proposal(&self, id: u64) -> Option<Vec<VotedEvent>> {
        self.store.read().await.votes_for_proposal(id).map(|v| v.to_vec())
    }

    pub async fn voting_results(&self, id: u64) -> Option<VotingResults> {
        self.store.read().await.voting_results(id)
    }

    pub async fn created_events(&self) -> Vec<ProposalCreatedEvent> {
        self.store.read().await.created_events().to_vec()
    }

    pub async fn voted_events(&self) -> Vec<VotedEvent> {
        self.store.read().await.voted_events().to_vec()
    }

    pub async fn executed_events(&self) -> Vec<ProposalExecutedEvent> {
        self.store.read().await.executed_events().to_vec()
    }
}
