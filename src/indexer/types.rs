use std::time::Duration;

use crate::config::IngestionConfig;

/// Outcome of one worker tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Cursor already at the chain head; nothing to scan.
    Idle,
    /// A window was committed; `inserted` counts newly stored events.
    Processed { inserted: usize, to_block: u64 },
}

/// Scan-loop constants shared by every worker.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Parallel block-timestamp lookups per batch.
    pub timestamp_batch_size: usize,
    /// Pause between timestamp batches.
    pub timestamp_batch_delay: Duration,
}

impl ScanSettings {
    pub fn from_config(cfg: &IngestionConfig) -> Self {
        Self {
            timestamp_batch_size: cfg.timestamp_batch_size,
            timestamp_batch_delay: cfg.timestamp_batch_delay(),
        }
    }
}
