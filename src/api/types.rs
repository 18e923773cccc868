use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::FeeEventRow;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Query parameters of the event list endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct EventParams {
    pub integrator: Option<String>,
    pub chain_id: Option<i64>,
    pub token: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub total: i64,
    pub events: Vec<FeeEventRow>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub total_events: i64,
    pub chains: Vec<ChainHealth>,
}

#[derive(Debug, Serialize)]
pub struct ChainHealth {
    pub chain_id: i64,
    pub name: String,
    pub worker_status: String,
    pub is_enabled: bool,
    pub last_processed_block: Option<i64>,
    pub error_count: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub chain_id: u64,
    pub deleted: bool,
}
