//! Worker supervisor: owns one long-lived scan task per enabled chain.
//!
//! Each worker runs an initial tick, then ticks at the chain's configured
//! interval. Ticks for one chain are strictly serialized by the worker
//! loop; a tick that outlasts its interval simply causes the missed ticks
//! to be skipped. Interval changes arrive over a watch channel so an
//! in-flight tick is never interrupted.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use sqlx::PgPool;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::ClientPool;
use crate::db::models::WorkerStatus;
use crate::db::registry;
use crate::error::{IndexerError, Result};
use crate::indexer::planner;
use crate::indexer::processor;
use crate::indexer::types::{ScanSettings, TickOutcome};

/// In-memory handle for one running chain worker. Never persisted.
struct WorkerHandle {
    cancel: CancellationToken,
    interval_tx: watch::Sender<u64>,
    handle: JoinHandle<()>,
}

pub struct Supervisor {
    pool: PgPool,
    clients: Arc<ClientPool>,
    settings: ScanSettings,
    shutdown_budget: Duration,
    shutdown: CancellationToken,
    workers: Mutex<HashMap<u64, WorkerHandle>>,
}

impl Supervisor {
    pub fn new(
        pool: PgPool,
        clients: Arc<ClientPool>,
        settings: ScanSettings,
        shutdown_budget: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            pool,
            clients,
            settings,
            shutdown_budget,
            shutdown,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Start every enabled chain. Boot helper: individual failures are
    /// recorded against the chain and do not stop the others.
    pub async fn start_enabled(&self) -> Result<()> {
        let configs = registry::list_enabled_chain_configs(&self.pool).await?;
        for cfg in configs {
            if let Err(e) = self.start(cfg.chain_id as u64).await {
                tracing::error!(
                    chain_id = cfg.chain_id,
                    error = %e,
                    "Failed to start chain worker at boot"
                );
            }
        }
        Ok(())
    }

    /// Spin up the worker for a chain. A second start for a chain that is
    /// already running warns and is a no-op.
    pub async fn start(&self, chain_id: u64) -> Result<()> {
        let mut workers = self.workers.lock().await;
        if workers.contains_key(&chain_id) {
            tracing::warn!(chain_id, "Worker already running, ignoring start");
            return Ok(());
        }

        let cfg = registry::get_chain_config(&self.pool, chain_id as i64)
            .await?
            .ok_or(IndexerError::NotFound(chain_id))?;

        registry::mark_worker_starting(&self.pool, chain_id as i64).await?;

        // Stored addresses are normalized on write; a parse failure here
        // means the registry was corrupted outside the control plane.
        let contract = Address::from_str(&cfg.contract_address).map_err(|e| {
            IndexerError::Internal(format!(
                "registry holds invalid contract address '{}': {e}",
                cfg.contract_address
            ))
        })?;

        if let Err(e) = self
            .clients
            .ensure(chain_id, &cfg.rpc_url, contract, cfg.retry_attempts as u32)
            .await
        {
            let msg = e.to_string();
            registry::set_worker_status(
                &self.pool,
                chain_id as i64,
                WorkerStatus::Error,
                Some(&msg),
            )
            .await?;
            return Err(e);
        }

        let cancel = self.shutdown.child_token();
        let (interval_tx, interval_rx) = watch::channel(cfg.scan_interval_ms as u64);

        let pool = self.pool.clone();
        let clients = self.clients.clone();
        let settings = self.settings.clone();
        let worker_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            run_worker(pool, clients, chain_id, settings, interval_rx, worker_cancel).await;
        });

        workers.insert(
            chain_id,
            WorkerHandle {
                cancel,
                interval_tx,
                handle,
            },
        );
        tracing::info!(chain_id, "Worker started");
        Ok(())
    }

    /// Stop a chain's worker: cancel its ticker, wait for any in-flight
    /// tick to observe the signal, release its client and persist the
    /// stopped status.
    pub async fn stop(&self, chain_id: u64) -> Result<()> {
        let worker = { self.workers.lock().await.remove(&chain_id) };

        let Some(worker) = worker else {
            tracing::warn!(chain_id, "No running worker to stop");
            registry::set_worker_status(&self.pool, chain_id as i64, WorkerStatus::Stopped, None)
                .await?;
            return Ok(());
        };

        worker.cancel.cancel();
        if let Err(e) = worker.handle.await {
            tracing::error!(chain_id, error = %e, "Worker task panicked during stop");
        }

        self.clients.drop_client(chain_id).await;
        registry::set_worker_status(&self.pool, chain_id as i64, WorkerStatus::Stopped, None)
            .await?;
        tracing::info!(chain_id, "Worker stopped");
        Ok(())
    }

    /// Whether a worker handle currently exists for the chain.
    pub async fn is_running(&self, chain_id: u64) -> bool {
        self.workers.lock().await.contains_key(&chain_id)
    }

    /// Re-arm a running worker's ticker at a new interval. The change
    /// applies from the next tick; an in-flight tick finishes untouched.
    pub async fn update_interval(&self, chain_id: u64, interval_ms: u64) -> Result<()> {
        let workers = self.workers.lock().await;
        match workers.get(&chain_id) {
            Some(worker) => worker.interval_tx.send(interval_ms).map_err(|_| {
                IndexerError::Internal(format!("worker loop for chain {chain_id} is gone"))
            }),
            None => {
                tracing::debug!(chain_id, "Interval update with no running worker");
                Ok(())
            }
        }
    }

    /// Stop every worker within the shutdown budget; abort stragglers.
    pub async fn graceful_shutdown(&self) {
        self.shutdown.cancel();

        let workers: Vec<(u64, WorkerHandle)> =
            { self.workers.lock().await.drain().collect() };
        if workers.is_empty() {
            return;
        }
        tracing::info!(count = workers.len(), "Stopping all chain workers");

        let mut handles = Vec::with_capacity(workers.len());
        for (chain_id, worker) in workers {
            worker.cancel.cancel();
            handles.push((chain_id, worker.handle));
        }

        let all_done = futures::future::join_all(handles.iter_mut().map(|(_, h)| h));
        if tokio::time::timeout(self.shutdown_budget, all_done).await.is_err() {
            for (chain_id, handle) in &handles {
                if !handle.is_finished() {
                    tracing::warn!(chain_id = *chain_id, "Shutdown budget exhausted, aborting worker");
                    handle.abort();
                }
            }
        }

        for (chain_id, _) in &handles {
            self.clients.drop_client(*chain_id).await;
            if let Err(e) = registry::set_worker_status(
                &self.pool,
                *chain_id as i64,
                WorkerStatus::Stopped,
                None,
            )
            .await
            {
                tracing::error!(chain_id = *chain_id, error = %e, "Failed to persist stopped status");
            }
        }

        tracing::info!("All chain workers stopped");
    }
}

/// The long-lived loop of one chain worker.
async fn run_worker(
    pool: PgPool,
    clients: Arc<ClientPool>,
    chain_id: u64,
    settings: ScanSettings,
    mut interval_rx: watch::Receiver<u64>,
    cancel: CancellationToken,
) {
    // One tick up front, then the periodic ticker. The first successful
    // tick is what moves the chain from `starting` to `running`.
    run_and_record_tick(&pool, &clients, chain_id, &settings, &cancel).await;

    let mut period = Duration::from_millis(*interval_rx.borrow());
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(chain_id, "Worker loop cancelled");
                break;
            }
            changed = interval_rx.changed() => {
                if changed.is_err() {
                    // Supervisor dropped the handle without cancelling.
                    break;
                }
                period = Duration::from_millis(*interval_rx.borrow());
                ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                tracing::info!(chain_id, interval_ms = period.as_millis() as u64, "Scan interval updated");
            }
            _ = ticker.tick() => {
                run_and_record_tick(&pool, &clients, chain_id, &settings, &cancel).await;
            }
        }
    }
}

/// Run one tick and persist its outcome against the registry.
async fn run_and_record_tick(
    pool: &PgPool,
    clients: &Arc<ClientPool>,
    chain_id: u64,
    settings: &ScanSettings,
    cancel: &CancellationToken,
) {
    match run_tick(pool, clients, chain_id, settings, cancel).await {
        Ok(outcome) => {
            if let TickOutcome::Processed { inserted, to_block } = outcome {
                tracing::debug!(chain_id, inserted, to_block, "Tick complete");
            }
            if let Err(e) = registry::record_tick_success(pool, chain_id as i64).await {
                tracing::error!(chain_id, error = %e, "Failed to record tick success");
            }
        }
        Err(e) => {
            if cancel.is_cancelled() {
                // Shutdown raced the tick; not a chain error.
                return;
            }
            tracing::error!(chain_id, error = %e, "Tick failed");
            if let Err(persist_err) =
                registry::record_tick_error(pool, chain_id as i64, &e.to_string()).await
            {
                tracing::error!(chain_id, error = %persist_err, "Failed to record tick error");
            }
        }
    }
}

/// One scan cycle for a chain: plan the next window from the persisted
/// cursor and the chain head, then process it. Config is reloaded every
/// tick so registry updates take effect without a restart.
pub async fn run_tick(
    pool: &PgPool,
    clients: &Arc<ClientPool>,
    chain_id: u64,
    settings: &ScanSettings,
    cancel: &CancellationToken,
) -> Result<TickOutcome> {
    let cfg = registry::get_chain_config(pool, chain_id as i64)
        .await?
        .ok_or(IndexerError::NotFound(chain_id))?;
    let cursor = registry::get_scan_cursor(pool, chain_id as i64)
        .await?
        .ok_or_else(|| IndexerError::Internal(format!("chain {chain_id} has no scan cursor")))?;

    let client = clients.get(chain_id).await?;
    let latest = client.latest_block().await?;

    match planner::plan_window(
        cursor.last_processed_block as u64,
        latest,
        cfg.max_block_range as u64,
    ) {
        None => Ok(TickOutcome::Idle),
        Some(window) => {
            processor::process_window(pool, &client, chain_id, window, settings, cancel).await
        }
    }
}
