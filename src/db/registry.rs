//! Chain registry persistence: chain configs and their scan cursors.

use sqlx::PgPool;

use crate::db::models::{ChainConfigRow, ChainStatusRow, ScanCursorRow, WorkerStatus};
use crate::error::Result;

/// Fully-validated chain parameters, as written by the control plane.
#[derive(Debug, Clone)]
pub struct NewChainConfig {
    pub chain_id: i64,
    pub name: String,
    pub rpc_url: String,
    pub contract_address: String,
    pub starting_block: i64,
    pub scan_interval_ms: i64,
    pub max_block_range: i64,
    pub retry_attempts: i32,
}

/// Insert a freshly-added chain config. Fails on duplicate chain_id; the
/// control plane turns that into a Conflict before calling here.
pub async fn insert_chain_config(pool: &PgPool, cfg: &NewChainConfig) -> Result<()> {
    sqlx::query(
        "INSERT INTO chain_configs (chain_id, name, rpc_url, contract_address, starting_block, \
         scan_interval_ms, max_block_range, retry_attempts, is_enabled, worker_status)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE, 'starting')",
    )
    .bind(cfg.chain_id)
    .bind(&cfg.name)
    .bind(&cfg.rpc_url)
    .bind(&cfg.contract_address)
    .bind(cfg.starting_block)
    .bind(cfg.scan_interval_ms)
    .bind(cfg.max_block_range)
    .bind(cfg.retry_attempts)
    .execute(pool)
    .await?;

    Ok(())
}

/// Persist a merged config after a control-plane update.
pub async fn update_chain_config(pool: &PgPool, cfg: &NewChainConfig) -> Result<()> {
    sqlx::query(
        "UPDATE chain_configs
         SET name = $2, rpc_url = $3, contract_address = $4, starting_block = $5,
             scan_interval_ms = $6, max_block_range = $7, retry_attempts = $8,
             updated_at = NOW()
         WHERE chain_id = $1",
    )
    .bind(cfg.chain_id)
    .bind(&cfg.name)
    .bind(&cfg.rpc_url)
    .bind(&cfg.contract_address)
    .bind(cfg.starting_block)
    .bind(cfg.scan_interval_ms)
    .bind(cfg.max_block_range)
    .bind(cfg.retry_attempts)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_chain_config(pool: &PgPool, chain_id: i64) -> Result<Option<ChainConfigRow>> {
    let row = sqlx::query_as::<_, ChainConfigRow>(
        "SELECT * FROM chain_configs WHERE chain_id = $1",
    )
    .bind(chain_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn list_chain_configs(pool: &PgPool) -> Result<Vec<ChainConfigRow>> {
    let rows = sqlx::query_as::<_, ChainConfigRow>(
        "SELECT * FROM chain_configs ORDER BY chain_id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn list_enabled_chain_configs(pool: &PgPool) -> Result<Vec<ChainConfigRow>> {
    let rows = sqlx::query_as::<_, ChainConfigRow>(
        "SELECT * FROM chain_configs WHERE is_enabled = TRUE ORDER BY chain_id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn delete_chain_config(pool: &PgPool, chain_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM chain_configs WHERE chain_id = $1")
        .bind(chain_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn set_enabled(pool: &PgPool, chain_id: i64, enabled: bool) -> Result<()> {
    sqlx::query(
        "UPDATE chain_configs SET is_enabled = $2, updated_at = NOW() WHERE chain_id = $1",
    )
    .bind(chain_id)
    .bind(enabled)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record that a worker is spinning up: status `starting` plus the start
/// instant operators see in status().
pub async fn mark_worker_starting(pool: &PgPool, chain_id: i64) -> Result<()> {
    sqlx::query(
        "UPDATE chain_configs
         SET worker_status = 'starting', last_worker_start = NOW(), updated_at = NOW()
         WHERE chain_id = $1",
    )
    .bind(chain_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn set_worker_status(
    pool: &PgPool,
    chain_id: i64,
    status: WorkerStatus,
    last_error: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE chain_configs
         SET worker_status = $2, last_worker_error = $3, updated_at = NOW()
         WHERE chain_id = $1",
    )
    .bind(chain_id)
    .bind(status.as_str())
    .bind(last_error)
    .execute(pool)
    .await?;

    Ok(())
}

/// Create or reset a chain's cursor so the next window starts at
/// `starting_block` (the cursor itself sits one block before it).
pub async fn upsert_scan_cursor(pool: &PgPool, chain_id: i64, starting_block: i64) -> Result<()> {
    sqlx::query(
        "INSERT INTO scan_cursors (chain_id, last_processed_block, is_active)
         VALUES ($1, $2, TRUE)
         ON CONFLICT (chain_id) DO UPDATE
         SET last_processed_block = $2, is_active = TRUE, updated_at = NOW()",
    )
    .bind(chain_id)
    .bind(starting_block - 1)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_scan_cursor(pool: &PgPool, chain_id: i64) -> Result<Option<ScanCursorRow>> {
    let row = sqlx::query_as::<_, ScanCursorRow>(
        "SELECT * FROM scan_cursors WHERE chain_id = $1",
    )
    .bind(chain_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn list_scan_cursors(pool: &PgPool) -> Result<Vec<ScanCursorRow>> {
    let rows = sqlx::query_as::<_, ScanCursorRow>(
        "SELECT * FROM scan_cursors ORDER BY chain_id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn delete_scan_cursor(pool: &PgPool, chain_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM scan_cursors WHERE chain_id = $1")
        .bind(chain_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn set_cursor_active(pool: &PgPool, chain_id: i64, active: bool) -> Result<()> {
    sqlx::query(
        "UPDATE scan_cursors SET is_active = $2, updated_at = NOW() WHERE chain_id = $1",
    )
    .bind(chain_id)
    .bind(active)
    .execute(pool)
    .await?;

    Ok(())
}

/// Commit a successfully processed window: advance the cursor and clear
/// any error bookkeeping from previous ticks. The guard keeps the cursor
/// monotone even if a stale commit ever raced a newer one.
pub async fn commit_window(pool: &PgPool, chain_id: i64, to_block: i64) -> Result<()> {
    sqlx::query(
        "UPDATE scan_cursors
         SET last_processed_block = $2, last_run_at = NOW(), error_count = 0,
             last_error = NULL, updated_at = NOW()
         WHERE chain_id = $1 AND last_processed_block <= $2",
    )
    .bind(chain_id)
    .bind(to_block)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a failed tick against both the cursor and the config row.
/// The cursor is left where it was; the next tick replans the same window.
pub async fn record_tick_error(pool: &PgPool, chain_id: i64, error: &str) -> Result<()> {
    sqlx::query(
        "UPDATE scan_cursors
         SET error_count = error_count + 1, last_error = $2, last_run_at = NOW(),
             updated_at = NOW()
         WHERE chain_id = $1",
    )
    .bind(chain_id)
    .bind(error)
    .execute(pool)
    .await?;

    set_worker_status(pool, chain_id, WorkerStatus::Error, Some(error)).await
}

/// A successful tick clears the error state and confirms the worker is
/// running.
pub async fn record_tick_success(pool: &PgPool, chain_id: i64) -> Result<()> {
    set_worker_status(pool, chain_id, WorkerStatus::Running, None).await
}

const STATUS_SELECT: &str = "SELECT c.chain_id, c.name, c.rpc_url, c.contract_address, \
     c.starting_block, c.scan_interval_ms, c.max_block_range, c.retry_attempts, \
     c.is_enabled, c.worker_status, c.last_worker_start, c.last_worker_error, \
     s.last_processed_block, s.is_active, s.last_run_at, s.error_count, s.last_error
     FROM chain_configs c
     LEFT JOIN scan_cursors s ON s.chain_id = c.chain_id";

/// Snapshot of one chain's config joined with its cursor.
pub async fn get_chain_status(pool: &PgPool, chain_id: i64) -> Result<Option<ChainStatusRow>> {
    let row = sqlx::query_as::<_, ChainStatusRow>(&format!(
        "{STATUS_SELECT} WHERE c.chain_id = $1"
    ))
    .bind(chain_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Snapshot of every configured chain.
pub async fn list_chain_statuses(pool: &PgPool) -> Result<Vec<ChainStatusRow>> {
    let rows = sqlx::query_as::<_, ChainStatusRow>(&format!(
        "{STATUS_SELECT} ORDER BY c.chain_id"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
