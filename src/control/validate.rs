//! Input validation for control-plane mutations.

use serde::Deserialize;
use url::Url;

use crate::address::normalize_address;
use crate::config::IngestionConfig;
use crate::db::models::ChainConfigRow;
use crate::db::registry::NewChainConfig;
use crate::error::{IndexerError, Result};

/// Payload for adding a chain. Omitted knobs fall back to the process
/// defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct AddChainRequest {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,
    pub contract_address: String,
    pub starting_block: Option<u64>,
    pub scan_interval_ms: Option<u64>,
    pub max_block_range: Option<u64>,
    pub retry_attempts: Option<u32>,
}

/// Partial update; `chain_id` is immutable after add.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateChainRequest {
    pub name: Option<String>,
    pub rpc_url: Option<String>,
    pub contract_address: Option<String>,
    pub starting_block: Option<u64>,
    pub scan_interval_ms: Option<u64>,
    pub max_block_range: Option<u64>,
    pub retry_attempts: Option<u32>,
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.chars().count() > 50 {
        return Err(IndexerError::Validation(
            "name must be 1..=50 characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_rpc_url(rpc_url: &str) -> Result<()> {
    let url = Url::parse(rpc_url)
        .map_err(|e| IndexerError::Validation(format!("rpc_url '{rpc_url}' is not a valid URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(IndexerError::Validation(format!(
            "rpc_url '{rpc_url}' must use http or https"
        )));
    }
    Ok(())
}

fn validate_starting_block(block: u64) -> Result<()> {
    if block == 0 {
        return Err(IndexerError::Validation(
            "starting_block must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_scan_interval(interval_ms: u64) -> Result<()> {
    if !(5_000..=300_000).contains(&interval_ms) {
        return Err(IndexerError::Validation(
            "scan_interval_ms must be within 5000..=300000".to_string(),
        ));
    }
    Ok(())
}

fn validate_max_block_range(range: u64) -> Result<()> {
    if !(100..=10_000).contains(&range) {
        return Err(IndexerError::Validation(
            "max_block_range must be within 100..=10000".to_string(),
        ));
    }
    Ok(())
}

fn validate_retry_attempts(attempts: u32) -> Result<()> {
    if !(1..=10).contains(&attempts) {
        return Err(IndexerError::Validation(
            "retry_attempts must be within 1..=10".to_string(),
        ));
    }
    Ok(())
}

/// Validate an add request and resolve it against the process defaults.
pub fn validate_add(req: &AddChainRequest, defaults: &IngestionConfig) -> Result<NewChainConfig> {
    if req.chain_id == 0 {
        return Err(IndexerError::Validation(
            "chain_id must be a positive integer".to_string(),
        ));
    }
    validate_name(&req.name)?;
    validate_rpc_url(&req.rpc_url)?;
    let contract_address = normalize_address(&req.contract_address)?;

    let starting_block = req.starting_block.unwrap_or(defaults.default_starting_block);
    let scan_interval_ms = req
        .scan_interval_ms
        .unwrap_or(defaults.default_scan_interval_ms);
    let max_block_range = req.max_block_range.unwrap_or(defaults.default_max_block_range);
    let retry_attempts = req.retry_attempts.unwrap_or(defaults.default_retry_attempts);

    validate_starting_block(starting_block)?;
    validate_scan_interval(scan_interval_ms)?;
    validate_max_block_range(max_block_range)?;
    validate_retry_attempts(retry_attempts)?;

    Ok(NewChainConfig {
        chain_id: req.chain_id as i64,
        name: req.name.clone(),
        rpc_url: req.rpc_url.clone(),
        contract_address,
        starting_block: starting_block as i64,
        scan_interval_ms: scan_interval_ms as i64,
        max_block_range: max_block_range as i64,
        retry_attempts: retry_attempts as i32,
    })
}

/// Merge a patch over the stored config, validating every changed field.
pub fn apply_update(current: &ChainConfigRow, patch: &UpdateChainRequest) -> Result<NewChainConfig> {
    let name = patch.name.clone().unwrap_or_else(|| current.name.clone());
    let rpc_url = patch
        .rpc_url
        .clone()
        .unwrap_or_else(|| current.rpc_url.clone());
    let contract_address = match &patch.contract_address {
        Some(address) => normalize_address(address)?,
        None => current.contract_address.clone(),
    };
    let starting_block = patch
        .starting_block
        .unwrap_or(current.starting_block as u64);
    let scan_interval_ms = patch
        .scan_interval_ms
        .unwrap_or(current.scan_interval_ms as u64);
    let max_block_range = patch
        .max_block_range
        .unwrap_or(current.max_block_range as u64);
    let retry_attempts = patch
        .retry_attempts
        .unwrap_or(current.retry_attempts as u32);

    validate_name(&name)?;
    validate_rpc_url(&rpc_url)?;
    validate_starting_block(starting_block)?;
    validate_scan_interval(scan_interval_ms)?;
    validate_max_block_range(max_block_range)?;
    validate_retry_attempts(retry_attempts)?;

    Ok(NewChainConfig {
        chain_id: current.chain_id,
        name,
        rpc_url,
        contract_address,
        starting_block: starting_block as i64,
        scan_interval_ms: scan_interval_ms as i64,
        max_block_range: max_block_range as i64,
        retry_attempts: retry_attempts as i32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn add_request() -> AddChainRequest {
        AddChainRequest {
            chain_id: 137,
            name: "polygon".to_string(),
            rpc_url: "https://polygon-rpc.com".to_string(),
            contract_address: "0xBD6C7B0d2f68c2b7805d88388319cfB6EcB50eA9".to_string(),
            starting_block: None,
            scan_interval_ms: None,
            max_block_range: None,
            retry_attempts: None,
        }
    }

    fn config_row() -> ChainConfigRow {
        ChainConfigRow {
            chain_id: 137,
            name: "polygon".to_string(),
            rpc_url: "https://polygon-rpc.com".to_string(),
            contract_address: "0xbd6c7b0d2f68c2b7805d88388319cfb6ecb50ea9".to_string(),
            starting_block: 70_000_000,
            scan_interval_ms: 30_000,
            max_block_range: 1_000,
            retry_attempts: 3,
            is_enabled: true,
            worker_status: "running".to_string(),
            last_worker_start: None,
            last_worker_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_add_applies_defaults_and_normalizes_address() {
        let cfg = validate_add(&add_request(), &IngestionConfig::default()).unwrap();
        assert_eq!(cfg.chain_id, 137);
        assert_eq!(cfg.starting_block, 70_000_000);
        assert_eq!(cfg.scan_interval_ms, 30_000);
        assert_eq!(cfg.max_block_range, 1_000);
        assert_eq!(cfg.retry_attempts, 3);
        assert_eq!(
            cfg.contract_address,
            "0xbd6c7b0d2f68c2b7805d88388319cfb6ecb50ea9"
        );
    }

    #[test]
    fn test_add_rejects_zero_chain_id() {
        let mut req = add_request();
        req.chain_id = 0;
        assert!(matches!(
            validate_add(&req, &IngestionConfig::default()),
            Err(IndexerError::Validation(_))
        ));
    }

    #[test]
    fn test_add_rejects_bad_name() {
        let mut req = add_request();
        req.name = String::new();
        assert!(validate_add(&req, &IngestionConfig::default()).is_err());

        req.name = "x".repeat(51);
        assert!(validate_add(&req, &IngestionConfig::default()).is_err());
    }

    #[test]
    fn test_add_rejects_bad_rpc_url() {
        let mut req = add_request();
        req.rpc_url = "not a url".to_string();
        assert!(validate_add(&req, &IngestionConfig::default()).is_err());

        req.rpc_url = "ftp://example.com".to_string();
        assert!(validate_add(&req, &IngestionConfig::default()).is_err());

        req.rpc_url = "/relative/path".to_string();
        assert!(validate_add(&req, &IngestionConfig::default()).is_err());
    }

    #[test]
    fn test_add_rejects_out_of_range_knobs() {
        let mut req = add_request();
        req.scan_interval_ms = Some(1_000);
        assert!(validate_add(&req, &IngestionConfig::default()).is_err());

        let mut req = add_request();
        req.max_block_range = Some(50);
        assert!(validate_add(&req, &IngestionConfig::default()).is_err());

        let mut req = add_request();
        req.retry_attempts = Some(0);
        assert!(validate_add(&req, &IngestionConfig::default()).is_err());

        let mut req = add_request();
        req.starting_block = Some(0);
        assert!(validate_add(&req, &IngestionConfig::default()).is_err());
    }

    #[test]
    fn test_update_merges_over_current_values() {
        let patch = UpdateChainRequest {
            scan_interval_ms: Some(10_000),
            ..Default::default()
        };

        let merged = apply_update(&config_row(), &patch).unwrap();
        assert_eq!(merged.scan_interval_ms, 10_000);
        assert_eq!(merged.name, "polygon");
        assert_eq!(merged.rpc_url, "https://polygon-rpc.com");
        assert_eq!(merged.max_block_range, 1_000);
    }

    #[test]
    fn test_update_validates_changed_fields() {
        let patch = UpdateChainRequest {
            contract_address: Some("0x1234".to_string()),
            ..Default::default()
        };
        assert!(apply_update(&config_row(), &patch).is_err());

        let patch = UpdateChainRequest {
            scan_interval_ms: Some(999_999),
            ..Default::default()
        };
        assert!(apply_update(&config_row(), &patch).is_err());
    }

    #[test]
    fn test_update_normalizes_new_contract_address() {
        let patch = UpdateChainRequest {
            contract_address: Some("0xA0B86991C6218B36C1D19D4A2E9EB0CE3606EB48".to_string()),
            ..Default::default()
        };

        let merged = apply_update(&config_row(), &patch).unwrap();
        assert_eq!(
            merged.contract_address,
            "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"
        );
    }
}
