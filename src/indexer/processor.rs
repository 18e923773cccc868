//! Window processing: load logs, decode, enrich, dedup, insert, commit.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::address::{format_address, format_hash};
use crate::client::decoder::decode_fee_log;
use crate::client::ChainClient;
use crate::db::models::FeeEvent;
use crate::db::{registry, repository};
use crate::error::{IndexerError, Result};
use crate::indexer::planner::Window;
use crate::indexer::types::{ScanSettings, TickOutcome};

/// A window whose logs mostly fail to decode points at a broken filter or
/// ABI drift; failing the tick beats silently dropping data. Windows with
/// fewer logs than this tolerate isolated strays.
const DECODE_GATE_MIN_LOGS: usize = 4;

/// A decoded log awaiting its block timestamp.
#[derive(Debug, Clone)]
struct Candidate {
    block_number: u64,
    block_hash: String,
    transaction_hash: String,
    log_index: i64,
    token: String,
    integrator: String,
    integrator_fee: String,
    lifi_fee: String,
}

/// Process one planned window for a chain.
///
/// The cursor advances to `window.to` only if every step succeeds; any
/// unrecovered error leaves it untouched so the next tick replays the same
/// window. Replays are harmless: the natural-key dedup filters them out.
pub async fn process_window(
    pool: &PgPool,
    client: &ChainClient,
    chain_id: u64,
    window: Window,
    settings: &ScanSettings,
    cancel: &CancellationToken,
) -> Result<TickOutcome> {
    let logs = client.query_logs(window.from, window.to).await?;

    if logs.is_empty() {
        registry::commit_window(pool, chain_id as i64, window.to as i64).await?;
        tracing::debug!(chain_id, from = window.from, to = window.to, "Empty window committed");
        return Ok(TickOutcome::Processed {
            inserted: 0,
            to_block: window.to,
        });
    }

    // Decode, keeping RPC order (block, then log index). Isolated strays
    // are skipped with a warning; a majority of failures aborts the tick.
    let mut candidates = Vec::with_capacity(logs.len());
    let mut decode_failures = 0usize;
    for log in &logs {
        match decode_candidate(log) {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => {
                decode_failures += 1;
                tracing::warn!(
                    chain_id,
                    block = log.block_number,
                    error = %e,
                    "Skipping undecodable log"
                );
            }
        }
    }
    if decode_gate_exceeded(decode_failures, logs.len()) {
        return Err(IndexerError::Decode(format!(
            "{decode_failures} of {} logs in blocks {}-{} failed to decode",
            logs.len(),
            window.from,
            window.to
        )));
    }

    // Enrich with block timestamps, a bounded number of lookups at a time.
    let blocks = unique_blocks(&candidates);
    let timestamps = fetch_block_timestamps(client, chain_id, &blocks, settings, cancel).await?;

    let events: Vec<FeeEvent> = candidates
        .into_iter()
        .map(|c| {
            let block_timestamp = timestamps
                .get(&c.block_number)
                .copied()
                .unwrap_or_else(Utc::now);
            FeeEvent {
                chain_id: chain_id as i64,
                block_number: c.block_number as i64,
                block_hash: c.block_hash,
                transaction_hash: c.transaction_hash,
                log_index: c.log_index,
                token: c.token,
                integrator: c.integrator,
                integrator_fee: c.integrator_fee,
                lifi_fee: c.lifi_fee,
                block_timestamp,
            }
        })
        .collect();

    // One bulk existence check, then insert only the unseen events. The
    // ON CONFLICT guard on the insert absorbs any race that slips past.
    let keys: Vec<(String, i64)> = events
        .iter()
        .map(|e| (e.transaction_hash.clone(), e.log_index))
        .collect();
    let existing = repository::find_existing_keys(pool, chain_id as i64, &keys).await?;
    let fresh = filter_new(events, &existing);

    repository::insert_events_batch(pool, &fresh).await?;

    registry::commit_window(pool, chain_id as i64, window.to as i64).await?;

    tracing::info!(
        chain_id,
        from = window.from,
        to = window.to,
        logs = logs.len(),
        inserted = fresh.len(),
        duplicates = keys.len() - fresh.len(),
        "Window committed"
    );

    Ok(TickOutcome::Processed {
        inserted: fresh.len(),
        to_block: window.to,
    })
}

/// Decode one raw log into a candidate carrying its natural-key parts.
fn decode_candidate(log: &alloy::rpc::types::Log) -> Result<Candidate> {
    let decoded = decode_fee_log(log)?;

    let block_number = log
        .block_number
        .ok_or_else(|| IndexerError::Decode("log missing block number".to_string()))?;
    let transaction_hash = log
        .transaction_hash
        .ok_or_else(|| IndexerError::Decode("log missing transaction hash".to_string()))?;
    let log_index = log
        .log_index
        .ok_or_else(|| IndexerError::Decode("log missing log index".to_string()))?;
    let block_hash = log.block_hash.unwrap_or_default();

    Ok(Candidate {
        block_number,
        block_hash: format_hash(&block_hash),
        transaction_hash: format_hash(&transaction_hash),
        log_index: log_index as i64,
        token: format_address(&decoded.token),
        integrator: format_address(&decoded.integrator),
        integrator_fee: decoded.integrator_fee.to_string(),
        lifi_fee: decoded.lifi_fee.to_string(),
    })
}

/// True when decode failures dominate a non-trivial window.
fn decode_gate_exceeded(failed: usize, total: usize) -> bool {
    total >= DECODE_GATE_MIN_LOGS && failed * 2 > total
}

/// Sorted, deduplicated block numbers of a candidate set.
fn unique_blocks(candidates: &[Candidate]) -> Vec<u64> {
    let mut blocks: Vec<u64> = candidates
        .iter()
        .map(|c| c.block_number)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    blocks.sort_unstable();
    blocks
}

/// Fetch timestamps for the given blocks in ordered parallel batches,
/// pausing between batches to respect RPC rate limits. A failed lookup
/// falls back to the current time rather than stalling the window.
async fn fetch_block_timestamps(
    client: &ChainClient,
    chain_id: u64,
    blocks: &[u64],
    settings: &ScanSettings,
    cancel: &CancellationToken,
) -> Result<HashMap<u64, DateTime<Utc>>> {
    let mut timestamps = HashMap::with_capacity(blocks.len());

    for (i, batch) in blocks.chunks(settings.timestamp_batch_size).enumerate() {
        if cancel.is_cancelled() {
            return Err(IndexerError::Internal(
                "tick cancelled during timestamp enrichment".to_string(),
            ));
        }
        if i > 0 {
            tokio::time::sleep(settings.timestamp_batch_delay).await;
        }

        let fetches = batch.iter().map(|&block_number| async move {
            (block_number, client.block_timestamp(block_number).await)
        });

        for (block_number, result) in futures::future::join_all(fetches).await {
            let timestamp = match result {
                Ok(ts) => ts,
                Err(e) => {
                    tracing::warn!(
                        chain_id,
                        block = block_number,
                        error = %e,
                        "Block timestamp lookup failed, falling back to now"
                    );
                    Utc::now()
                }
            };
            timestamps.insert(block_number, timestamp);
        }
    }

    Ok(timestamps)
}

/// Keep only candidates whose natural key is not yet stored.
fn filter_new(events: Vec<FeeEvent>, existing: &HashSet<(String, i64)>) -> Vec<FeeEvent> {
    events
        .into_iter()
        .filter(|e| !existing.contains(&(e.transaction_hash.clone(), e.log_index)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(block_number: u64, tx: &str, log_index: i64) -> Candidate {
        Candidate {
            block_number,
            block_hash: "0xbb".to_string(),
            transaction_hash: tx.to_string(),
            log_index,
            token: "0x1111111111111111111111111111111111111111".to_string(),
            integrator: "0x2222222222222222222222222222222222222222".to_string(),
            integrator_fee: "1000000000000000000".to_string(),
            lifi_fee: "500000000000000000".to_string(),
        }
    }

    fn event(tx: &str, log_index: i64) -> FeeEvent {
        FeeEvent {
            chain_id: 137,
            block_number: 70_000_250,
            block_hash: "0xbb".to_string(),
            transaction_hash: tx.to_string(),
            log_index,
            token: "0x1111111111111111111111111111111111111111".to_string(),
            integrator: "0x2222222222222222222222222222222222222222".to_string(),
            integrator_fee: "1".to_string(),
            lifi_fee: "2".to_string(),
            block_timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_unique_blocks_sorted_and_deduplicated() {
        // Logs at B, B+2, B+7, B+12 with duplicates collapse to four
        // lookups, i.e. a single batch of <= 5.
        let base = 70_000_000u64;
        let candidates = vec![
            candidate(base + 12, "0xa", 0),
            candidate(base, "0xb", 0),
            candidate(base + 2, "0xc", 0),
            candidate(base, "0xb", 1),
            candidate(base + 7, "0xd", 0),
        ];

        let blocks = unique_blocks(&candidates);
        assert_eq!(blocks, vec![base, base + 2, base + 7, base + 12]);
        assert_eq!(blocks.chunks(5).count(), 1);
    }

    #[test]
    fn test_timestamp_batches_split_at_batch_size() {
        let blocks: Vec<u64> = (0..12).collect();
        let batches: Vec<&[u64]> = blocks.chunks(5).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 5);
        assert_eq!(batches[2].len(), 2);
    }

    #[test]
    fn test_filter_new_drops_already_stored_keys() {
        let events = vec![event("0xaa", 0), event("0xaa", 1), event("0xbb", 0)];
        let existing: HashSet<(String, i64)> =
            [("0xaa".to_string(), 0i64)].into_iter().collect();

        let fresh = filter_new(events, &existing);
        assert_eq!(fresh.len(), 2);
        assert!(fresh
            .iter()
            .all(|e| !(e.transaction_hash == "0xaa" && e.log_index == 0)));
    }

    #[test]
    fn test_filter_new_is_idempotent() {
        // Re-filtering with all keys present yields nothing: replaying a
        // window cannot double-insert.
        let events = vec![event("0xaa", 0), event("0xbb", 0)];
        let existing: HashSet<(String, i64)> = events
            .iter()
            .map(|e| (e.transaction_hash.clone(), e.log_index))
            .collect();

        assert!(filter_new(events, &existing).is_empty());
    }

    #[test]
    fn test_decode_gate() {
        // Small windows tolerate strays.
        assert!(!decode_gate_exceeded(1, 1));
        assert!(!decode_gate_exceeded(2, 3));
        // Majority failures in a non-trivial window abort the tick.
        assert!(decode_gate_exceeded(3, 4));
        assert!(decode_gate_exceeded(5, 8));
        assert!(!decode_gate_exceeded(4, 8));
        assert!(!decode_gate_exceeded(0, 100));
    }
}
