//! Control plane: the boundary the API layer calls to manage chains.
//!
//! Every mutation validates its input, gates endpoint changes behind an
//! RPC probe, persists through the chain registry and instructs the
//! supervisor. Outcomes are reported through the [`IndexerError`]
//! taxonomy; the HTTP layer maps variants onto status codes.

pub mod validate;

use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::Address;
use sqlx::PgPool;

use crate::client::ClientPool;
use crate::config::IngestionConfig;
use crate::db::models::ChainStatusRow;
use crate::db::registry;
use crate::error::{IndexerError, Result};
use crate::supervisor::Supervisor;
use validate::{AddChainRequest, UpdateChainRequest};

/// Fired after every successful mutation so external response caches can
/// drop stale entries.
pub trait MutationHook: Send + Sync {
    fn on_mutate(&self);
}

pub struct ControlPlane {
    pool: PgPool,
    clients: Arc<ClientPool>,
    supervisor: Arc<Supervisor>,
    defaults: IngestionConfig,
    mutation_hooks: Vec<Arc<dyn MutationHook>>,
}

impl ControlPlane {
    pub fn new(
        pool: PgPool,
        clients: Arc<ClientPool>,
        supervisor: Arc<Supervisor>,
        defaults: IngestionConfig,
    ) -> Self {
        Self {
            pool,
            clients,
            supervisor,
            defaults,
            mutation_hooks: Vec::new(),
        }
    }

    pub fn with_mutation_hook(mut self, hook: Arc<dyn MutationHook>) -> Self {
        self.mutation_hooks.push(hook);
        self
    }

    fn notify_mutation(&self) {
        for hook in &self.mutation_hooks {
            hook.on_mutate();
        }
    }

    /// Register a new chain and start scanning it.
    ///
    /// The endpoint must answer a probe before anything is persisted. If
    /// the worker fails to start afterwards, the config is kept and the
    /// chain surfaces in `error` status instead of rolling back.
    pub async fn add(&self, req: AddChainRequest) -> Result<ChainStatusRow> {
        let cfg = validate::validate_add(&req, &self.defaults)?;

        if registry::get_chain_config(&self.pool, cfg.chain_id)
            .await?
            .is_some()
        {
            return Err(IndexerError::Conflict(req.chain_id));
        }

        ClientPool::probe(&cfg.rpc_url).await?;

        registry::insert_chain_config(&self.pool, &cfg).await?;
        registry::upsert_scan_cursor(&self.pool, cfg.chain_id, cfg.starting_block).await?;

        if let Err(e) = self.supervisor.start(cfg.chain_id as u64).await {
            tracing::error!(
                chain_id = cfg.chain_id,
                error = %e,
                "Worker failed to start after add"
            );
        }

        self.notify_mutation();
        self.status_one(cfg.chain_id as u64).await
    }

    /// Enable a chain and start its worker.
    pub async fn start(&self, chain_id: u64) -> Result<ChainStatusRow> {
        registry::get_chain_config(&self.pool, chain_id as i64)
            .await?
            .ok_or(IndexerError::NotFound(chain_id))?;

        registry::set_enabled(&self.pool, chain_id as i64, true).await?;
        registry::set_cursor_active(&self.pool, chain_id as i64, true).await?;
        let started = self.supervisor.start(chain_id).await;

        self.notify_mutation();
        started?;
        self.status_one(chain_id).await
    }

    /// Stop a chain's worker and disable it.
    pub async fn stop(&self, chain_id: u64) -> Result<ChainStatusRow> {
        registry::get_chain_config(&self.pool, chain_id as i64)
            .await?
            .ok_or(IndexerError::NotFound(chain_id))?;

        self.supervisor.stop(chain_id).await?;
        registry::set_enabled(&self.pool, chain_id as i64, false).await?;
        registry::set_cursor_active(&self.pool, chain_id as i64, false).await?;

        self.notify_mutation();
        self.status_one(chain_id).await
    }

    /// Merge a config patch. An rpc_url change is probe-gated; endpoint or
    /// contract changes swap the pooled client; an interval change re-arms
    /// a running worker's ticker without interrupting an in-flight tick.
    pub async fn update(&self, chain_id: u64, patch: UpdateChainRequest) -> Result<ChainStatusRow> {
        let current = registry::get_chain_config(&self.pool, chain_id as i64)
            .await?
            .ok_or(IndexerError::NotFound(chain_id))?;

        let merged = validate::apply_update(&current, &patch)?;
        let rpc_changed = merged.rpc_url != current.rpc_url;
        let contract_changed = merged.contract_address != current.contract_address;
        let interval_changed = merged.scan_interval_ms != current.scan_interval_ms;

        if rpc_changed {
            ClientPool::probe(&merged.rpc_url).await?;
        }

        registry::update_chain_config(&self.pool, &merged).await?;

        if rpc_changed || contract_changed {
            let contract = Address::from_str(&merged.contract_address).map_err(|e| {
                IndexerError::Internal(format!(
                    "validated contract address failed to parse: {e}"
                ))
            })?;
            self.clients
                .ensure(
                    chain_id,
                    &merged.rpc_url,
                    contract,
                    merged.retry_attempts as u32,
                )
                .await?;
        }

        if interval_changed && self.supervisor.is_running(chain_id).await {
            self.supervisor
                .update_interval(chain_id, merged.scan_interval_ms as u64)
                .await?;
        }

        self.notify_mutation();
        self.status_one(chain_id).await
    }

    /// Remove a chain's config and cursor, stopping its worker first.
    /// Previously ingested fee events are retained for historical queries.
    pub async fn delete(&self, chain_id: u64) -> Result<()> {
        registry::get_chain_config(&self.pool, chain_id as i64)
            .await?
            .ok_or(IndexerError::NotFound(chain_id))?;

        if self.supervisor.is_running(chain_id).await {
            self.supervisor.stop(chain_id).await?;
        } else {
            self.clients.drop_client(chain_id).await;
        }

        registry::delete_scan_cursor(&self.pool, chain_id as i64).await?;
        registry::delete_chain_config(&self.pool, chain_id as i64).await?;

        self.notify_mutation();
        tracing::info!(chain_id, "Chain removed");
        Ok(())
    }

    /// Config joined with cursor for one chain.
    pub async fn status_one(&self, chain_id: u64) -> Result<ChainStatusRow> {
        registry::get_chain_status(&self.pool, chain_id as i64)
            .await?
            .ok_or(IndexerError::NotFound(chain_id))
    }

    /// Config joined with cursor for every chain.
    pub async fn status_all(&self) -> Result<Vec<ChainStatusRow>> {
        registry::list_chain_statuses(&self.pool).await
    }
}
