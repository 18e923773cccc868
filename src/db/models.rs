use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a chain's worker, persisted on the chain config row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Starting,
    Running,
    Stopped,
    Error,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Starting => "starting",
            WorkerStatus::Running => "running",
            WorkerStatus::Stopped => "stopped",
            WorkerStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "starting" => Some(WorkerStatus::Starting),
            "running" => Some(WorkerStatus::Running),
            "stopped" => Some(WorkerStatus::Stopped),
            "error" => Some(WorkerStatus::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured chain, as stored in the registry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChainConfigRow {
    pub chain_id: i64,
    pub name: String,
    pub rpc_url: String,
    pub contract_address: String,
    pub starting_block: i64,
    pub scan_interval_ms: i64,
    pub max_block_range: i64,
    pub retry_attempts: i32,
    pub is_enabled: bool,
    pub worker_status: String,
    pub last_worker_start: Option<DateTime<Utc>>,
    pub last_worker_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-chain scan progress marker. `last_processed_block` only moves
/// forward; the first planned window starts at `last_processed_block + 1`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScanCursorRow {
    pub chain_id: i64,
    pub last_processed_block: i64,
    pub is_active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub error_count: i32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A decoded FeesCollected event, ready for insertion.
#[derive(Debug, Clone)]
pub struct FeeEvent {
    pub chain_id: i64,
    pub block_number: i64,
    pub block_hash: String,
    pub transaction_hash: String,
    pub log_index: i64,
    pub token: String,
    pub integrator: String,
    pub integrator_fee: String,
    pub lifi_fee: String,
    pub block_timestamp: DateTime<Utc>,
}

/// A stored fee event, as returned by the read path.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct FeeEventRow {
    pub chain_id: i64,
    pub block_number: i64,
    pub block_hash: String,
    pub transaction_hash: String,
    pub log_index: i64,
    pub token: String,
    pub integrator: String,
    pub integrator_fee: String,
    pub lifi_fee: String,
    pub block_timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Chain config joined with its cursor, for operator-facing status.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ChainStatusRow {
    pub chain_id: i64,
    pub name: String,
    pub rpc_url: String,
    pub contract_address: String,
    pub starting_block: i64,
    pub scan_interval_ms: i64,
    pub max_block_range: i64,
    pub retry_attempts: i32,
    pub is_enabled: bool,
    pub worker_status: String,
    pub last_worker_start: Option<DateTime<Utc>>,
    pub last_worker_error: Option<String>,
    pub last_processed_block: Option<i64>,
    pub is_active: Option<bool>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub error_count: Option<i32>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_status_round_trip() {
        for status in [
            WorkerStatus::Starting,
            WorkerStatus::Running,
            WorkerStatus::Stopped,
            WorkerStatus::Error,
        ] {
            assert_eq!(WorkerStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(WorkerStatus::parse("paused"), None);
    }
}
