//! Poll scheduler: synchronous backfill on start, then a fixed-period poll until stopped.
//!
//! Each tick spawns its cycle as a separate task, so a cycle that outlives the period does
//! not hold up the ticker; the indexer's single-flight guard turns the overlapping tick into
//! a no-op. Stopping cancels the ticker, and a spawned cycle that has not started yet is
//! dropped; a cycle already in flight runs to completion.

use crate::indexer::{IndexerError, ProposalIndexer};
use crate::source::LogSource;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Handle to a running poll loop.
pub struct PollScheduler {
    cancel: CancellationToken,
    ticker: Option<JoinHandle<()>>,
}

impl PollScheduler {
    /// Backfill, then begin polling every `poll_interval`. A backfill failure aborts startup.
    pub async fn start<S>(indexer: Arc<ProposalIndexer<S>>) -> Result<Self, IndexerError>
    where
        S: LogSource + 'static,
    {
        indexer.backfill().await?;

        let period = indexer.config().poll_interval;
        tracing::info!(interval_ms = period.as_millis() as u64, "starting event polling");

        let cancel = CancellationToken::new();
        let ticker = tokio::spawn(run_ticker(indexer, cancel.clone()));
        Ok(Self {
            cancel,
            ticker: Some(ticker),
        })
    }

    /// Cancel the recurring trigger and wait for the ticker task to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(ticker) = self.ticker.take() {
            if let Err(e) = ticker.await {
                tracing::warn!(reason = %e, "poll ticker ended abnormally");
            }
        }
        tracing::info!("event polling stopped");
    }

    pub fn is_running(&self) -> bool {
        self.ticker.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_ticker<S>(indexer: Arc<ProposalIndexer<S>>, cancel: CancellationToken)
where
    S: LogSource + 'static,
{
    let mut interval = time::interval(indexer.config().poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let indexer = Arc::clone(&indexer);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if cancel.is_cancelled() {
                        return;
                    }
                    indexer.poll_once().await;
                });
            }
        }
    }
}
