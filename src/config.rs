use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// TTL of the read-side response cache; mutations invalidate it early.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cache_ttl_ms: default_cache_ttl_ms(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_cache_ttl_ms() -> u64 {
    5_000
}

/// Process-wide ingestion knobs. Per-chain values live in the chain
/// registry; these are the fallbacks applied when a chain omits them,
/// plus the constants of the scan loop itself.
#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    #[serde(default = "default_scan_interval_ms")]
    pub default_scan_interval_ms: u64,
    #[serde(default = "default_starting_block")]
    pub default_starting_block: u64,
    #[serde(default = "default_max_block_range")]
    pub default_max_block_range: u64,
    #[serde(default = "default_retry_attempts")]
    pub default_retry_attempts: u32,
    /// Fixed pause between RPC retry attempts.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Block-timestamp lookups are issued in parallel batches of this size.
    #[serde(default = "default_timestamp_batch_size")]
    pub timestamp_batch_size: usize,
    /// Pause between timestamp batches, to stay under RPC rate limits.
    #[serde(default = "default_timestamp_batch_delay_ms")]
    pub timestamp_batch_delay_ms: u64,
    /// How long graceful shutdown may take before workers are aborted.
    #[serde(default = "default_shutdown_budget_ms")]
    pub shutdown_budget_ms: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            default_scan_interval_ms: default_scan_interval_ms(),
            default_starting_block: default_starting_block(),
            default_max_block_range: default_max_block_range(),
            default_retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            timestamp_batch_size: default_timestamp_batch_size(),
            timestamp_batch_delay_ms: default_timestamp_batch_delay_ms(),
            shutdown_budget_ms: default_shutdown_budget_ms(),
        }
    }
}

fn default_scan_interval_ms() -> u64 {
    30_000
}

fn default_starting_block() -> u64 {
    70_000_000
}

fn default_max_block_range() -> u64 {
    1_000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1_000
}

fn default_timestamp_batch_size() -> usize {
    5
}

fn default_timestamp_batch_delay_ms() -> u64 {
    200
}

fn default_shutdown_budget_ms() -> u64 {
    30_000
}

impl IngestionConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn timestamp_batch_delay(&self) -> Duration {
        Duration::from_millis(self.timestamp_batch_delay_ms)
    }

    pub fn shutdown_budget(&self) -> Duration {
        Duration::from_millis(self.shutdown_budget_ms)
    }
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("Failed to parse config file '{}': {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> eyre::Result<()> {
        if self.database.url.is_empty() {
            return Err(eyre::eyre!("database.url must not be empty"));
        }
        let ing = &self.ingestion;
        if !(5_000..=300_000).contains(&ing.default_scan_interval_ms) {
            return Err(eyre::eyre!(
                "ingestion.default_scan_interval_ms must be within 5000..=300000"
            ));
        }
        if !(100..=10_000).contains(&ing.default_max_block_range) {
            return Err(eyre::eyre!(
                "ingestion.default_max_block_range must be within 100..=10000"
            ));
        }
        if !(1..=10).contains(&ing.default_retry_attempts) {
            return Err(eyre::eyre!(
                "ingestion.default_retry_attempts must be within 1..=10"
            ));
        }
        if ing.default_starting_block == 0 {
            return Err(eyre::eyre!("ingestion.default_starting_block must be >= 1"));
        }
        if ing.timestamp_batch_size == 0 {
            return Err(eyre::eyre!("ingestion.timestamp_batch_size must be >= 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[database]
url = "postgres://localhost/feescan"
max_connections = 5

[api]
port = 8080

[ingestion]
default_scan_interval_ms = 15000
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.database.url, "postgres://localhost/feescan");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.api.host, "0.0.0.0"); // default
        assert_eq!(config.ingestion.default_scan_interval_ms, 15_000);
        assert_eq!(config.ingestion.default_starting_block, 70_000_000); // default
        assert_eq!(config.ingestion.timestamp_batch_size, 5); // default
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_when_sections_omitted() {
        let toml_str = r#"
[database]
url = "postgres://localhost/feescan"
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.ingestion.default_max_block_range, 1_000);
        assert_eq!(config.ingestion.retry_base_delay_ms, 1_000);
        assert_eq!(config.ingestion.shutdown_budget_ms, 30_000);
    }

    #[test]
    fn test_validate_rejects_out_of_range_interval() {
        let toml_str = r#"
[database]
url = "postgres://localhost/feescan"

[ingestion]
default_scan_interval_ms = 1000
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());
    }
}
