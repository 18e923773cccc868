//! Per-chain RPC client pool.
//!
//! One reusable handle per chain, built lazily by the supervisor and the
//! control plane. A handle wraps an HTTP provider plus the fee collector
//! contract address; `latest_block` and `query_logs` retry transient
//! failures with a fixed pause before giving up with `RpcUnavailable`.

pub mod decoder;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{BlockNumberOrTag, Filter, Log};
use alloy::sol_types::SolEvent;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use url::Url;

use crate::error::{IndexerError, Result};
use decoder::FeesCollected;

/// Retry an RPC call up to `attempts` times with a fixed pause between
/// attempts. Exhaustion maps to `RpcUnavailable`.
pub async fn retry_rpc<F, Fut, T, E>(
    attempts: u32,
    delay: Duration,
    what: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match f().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                last_error = e.to_string();
                tracing::warn!(
                    attempt,
                    attempts,
                    error = %e,
                    "RPC call '{}' failed",
                    what
                );
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(IndexerError::RpcUnavailable(format!(
        "{what} failed after {attempts} attempts: {last_error}"
    )))
}

/// A reusable handle over one chain's RPC endpoint and contract.
pub struct ChainClient {
    chain_id: u64,
    rpc_url: Url,
    contract: Address,
    retry_attempts: u32,
    retry_delay: Duration,
    provider: DynProvider,
}

impl ChainClient {
    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Current chain head.
    pub async fn latest_block(&self) -> Result<u64> {
        retry_rpc(
            self.retry_attempts,
            self.retry_delay,
            "eth_blockNumber",
            || self.provider.get_block_number(),
        )
        .await
    }

    /// FeesCollected logs emitted by the contract in `[from_block, to_block]`
    /// (inclusive on both ends), in the order the RPC returns them.
    pub async fn query_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<Log>> {
        let filter = Filter::new()
            .address(self.contract)
            .event(FeesCollected::SIGNATURE)
            .from_block(from_block)
            .to_block(to_block);

        let logs = retry_rpc(
            self.retry_attempts,
            self.retry_delay,
            "eth_getLogs",
            || self.provider.get_logs(&filter),
        )
        .await?;

        tracing::debug!(
            chain_id = self.chain_id,
            from_block,
            to_block,
            count = logs.len(),
            "Fetched logs"
        );
        Ok(logs)
    }

    /// Timestamp of a single block. No retry: the caller falls back to
    /// "now" on failure rather than stalling the window.
    pub async fn block_timestamp(&self, block_number: u64) -> Result<DateTime<Utc>> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(block_number))
            .await
            .map_err(|e| IndexerError::RpcUnavailable(e.to_string()))?
            .ok_or_else(|| {
                IndexerError::RpcUnavailable(format!("block {block_number} not found"))
            })?;

        DateTime::from_timestamp(block.header.timestamp as i64, 0).ok_or_else(|| {
            IndexerError::Internal(format!(
                "block {} carries invalid timestamp {}",
                block_number, block.header.timestamp
            ))
        })
    }
}

/// Shared map from chain id to its active client handle.
pub struct ClientPool {
    clients: RwLock<HashMap<u64, Arc<ChainClient>>>,
    retry_delay: Duration,
}

impl ClientPool {
    pub fn new(retry_delay: Duration) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            retry_delay,
        }
    }

    /// Idempotently install a handle for a chain, replacing an existing one
    /// whose endpoint, contract or retry budget differs. Succeeds only
    /// after a probe against the endpoint passes.
    pub async fn ensure(
        &self,
        chain_id: u64,
        rpc_url: &str,
        contract: Address,
        retry_attempts: u32,
    ) -> Result<()> {
        let url: Url = rpc_url
            .parse()
            .map_err(|e| IndexerError::Validation(format!("invalid RPC URL '{rpc_url}': {e}")))?;

        {
            let clients = self.clients.read().await;
            if let Some(existing) = clients.get(&chain_id) {
                if existing.rpc_url == url
                    && existing.contract == contract
                    && existing.retry_attempts == retry_attempts
                {
                    return Ok(());
                }
            }
        }

        let provider = ProviderBuilder::new().connect_http(url.clone()).erased();
        provider
            .get_block_number()
            .await
            .map_err(|e| IndexerError::RpcUnavailable(format!("probe of '{rpc_url}': {e}")))?;

        let client = Arc::new(ChainClient {
            chain_id,
            rpc_url: url,
            contract,
            retry_attempts,
            retry_delay: self.retry_delay,
            provider,
        });

        let mut clients = self.clients.write().await;
        clients.insert(chain_id, client);
        tracing::info!(chain_id, "Chain client installed");
        Ok(())
    }

    /// Release a chain's handle. Missing handle is a no-op.
    pub async fn drop_client(&self, chain_id: u64) {
        let mut clients = self.clients.write().await;
        if clients.remove(&chain_id).is_some() {
            tracing::debug!(chain_id, "Chain client dropped");
        }
    }

    pub async fn get(&self, chain_id: u64) -> Result<Arc<ChainClient>> {
        let clients = self.clients.read().await;
        clients
            .get(&chain_id)
            .cloned()
            .ok_or_else(|| IndexerError::Internal(format!("no client for chain {chain_id}")))
    }

    /// Validate a candidate endpoint with a throwaway handle: succeeds iff
    /// the endpoint answers eth_blockNumber. Used by the control plane
    /// before committing config changes.
    pub async fn probe(rpc_url: &str) -> Result<u64> {
        let url: Url = rpc_url
            .parse()
            .map_err(|e| IndexerError::Validation(format!("invalid RPC URL '{rpc_url}': {e}")))?;

        let provider = ProviderBuilder::new().connect_http(url);
        provider
            .get_block_number()
            .await
            .map_err(|e| IndexerError::RpcUnavailable(format!("probe of '{rpc_url}': {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_rpc(3, Duration::from_secs(1), "latest_block", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("connection reset")
                } else {
                    Ok(42u64)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_maps_to_rpc_unavailable() {
        let calls = AtomicU32::new(0);
        let result: Result<u64> = retry_rpc(3, Duration::from_secs(1), "latest_block", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("rate limited") }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(IndexerError::RpcUnavailable(msg)) => {
                assert!(msg.contains("rate limited"));
                assert!(msg.contains("3 attempts"));
            }
            other => panic!("expected RpcUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retry_single_attempt_does_not_sleep() {
        let result = retry_rpc(1, Duration::from_secs(3600), "probe", || async {
            Ok::<_, &str>(7u64)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
    }
}
