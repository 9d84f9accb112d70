//! In-memory watermark for the indexer (no disk persistence).
//!
//! Process restarts start from start_block again. Held behind a single-slot lock by the
//! indexer; holding that lock is what "busy" means.

/// Inclusive block range of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

/// Next block to ingest. Never decreases once a range has been ingested.
#[derive(Debug, Clone, Copy, Default)]
pub struct Watermark {
    last_processed_block: u64,
    advanced: bool,
}

impl Watermark {
    pub fn new(start_block: u64) -> Self {
        Self {
            last_processed_block: start_block,
            advanced: false,
        }
    }

    pub fn last_processed_block(&self) -> u64 {
        self.last_processed_block
    }

    /// Range to fetch given the chain head `height`, or None when there is nothing new.
    ///
    /// A configured start block ahead of the chain is reset to the head, but only before the
    /// first [Watermark::advance]. A lagging head afterwards leaves the watermark alone.
    pub fn next_range(&mut self, height: u64) -> Option<BlockRange> {
        let from = self.last_processed_block;
        if from > height {
            if !self.advanced {
                tracing::info!(
                    start = from,
                    height,
                    "start block is ahead of the chain head, adjusted to head"
                );
                self.last_processed_block = height;
            }
            return None;
        }
        Some(BlockRange { from, to: height })
    }

    /// Mark `range` fully ingested.
    pub fn advance(&mut self, range: BlockRange) {
        self.last_processed_block = self.last_processed_block.max(range.to.saturating_add(1));
        self.advanced = true;
    }
}
