//! Example: backfill and poll a DAO contract, logging a proposal summary until Ctrl-C.
//!
//! Configuration comes from the environment:
//!
//!   RPC_URL=http://127.0.0.1:8545 CONTRACT_ADDRESS=0x... [START_BLOCK=0] [POLL_INTERVAL_MS=10000] \
//!     cargo run -p dao-indexer --example dao_indexer
//!
//! Pass `--json` to print every proposal as JSON on each summary instead of counts only.
//! The summary also reports the contract's own proposalCount() for comparison.

use anyhow::Context;
use dao_indexer::{IndexerConfig, JsonRpcLogSource, PollScheduler, ProposalIndexer};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let json = std::env::args().any(|a| a == "--json");

    let config = IndexerConfig::from_env().context("load configuration")?;
    tracing::info!(
        rpc = %config.http_url,
        contract = %config.contract_address,
        start_block = config.start_block,
        "starting DAO indexer"
    );
    let source = JsonRpcLogSource::new(&config).context("build RPC client")?;
    let indexer = Arc::new(ProposalIndexer::new(config, source));
    let scheduler = PollScheduler::start(Arc::clone(&indexer))
        .await
        .context("historic backfill")?;

    let mut summary = tokio::time::interval(Duration::from_secs(60));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = summary.tick() => {
                let proposals = indexer.all_proposals().await;
                let executed = proposals.iter().filter(|p| p.executed.is_some()).count();
                let onchain = match indexer.source().proposal_count().await {
                    Ok(n) => Some(n),
                    Err(e) => {
                        tracing::warn!(reason = %e, "eth_call proposalCount() failed");
                        None
                    }
                };
                tracing::info!(
                    proposals = proposals.len(),
                    onchain_proposals = ?onchain,
                    executed,
                    votes = indexer.voted_events().await.len(),
                    next_block = indexer.last_processed_block().await,
                    "index summary"
                );
                if json {
                    println!("{}", serde_json::to_string_pretty(&proposals)?);
                }
            }
        }
    }

    scheduler.stop().await;
    Ok(())
}
