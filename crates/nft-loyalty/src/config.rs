// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! TOML configuration for a leaf computation run.

use std::path::Path;

use alloy::primitives::Address;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use url::Url;

use crate::chain::DEFAULT_LOG_CHUNK_SIZE;

/// Configuration defaults
pub mod defaults {
    pub const fn retries() -> u32 {
        3
    }

    pub const fn backoff_ms() -> u64 {
        1000
    }

    pub const fn compute_units_per_second() -> u64 {
        200
    }

    pub const fn concurrency() -> usize {
        16
    }

    pub const fn log_chunk_size() -> u64 {
        super::DEFAULT_LOG_CHUNK_SIZE
    }
}

/// Reward period section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PeriodConfig {
    /// Snapshot block
    pub block_start: u64,
    /// Last block of the period (inclusive)
    pub block_end: u64,
    /// Number of tokens. Read from `totalSupply()` at `block_end` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_supply: Option<u64>,
}

/// Collection section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CollectionConfig {
    /// NFT contract address
    pub address: Address,
}

/// RPC connection section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcConfig {
    /// JSON-RPC endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
    /// Max rate-limit retries per request
    #[serde(default = "defaults::retries")]
    pub retries: u32,
    /// Initial retry backoff in milliseconds
    #[serde(default = "defaults::backoff_ms")]
    pub backoff_ms: u64,
    /// Compute units per second budget of the endpoint
    #[serde(default = "defaults::compute_units_per_second")]
    pub compute_units_per_second: u64,
    /// Max `ownerOf` calls in flight
    #[serde(default = "defaults::concurrency")]
    pub concurrency: usize,
    /// Blocks per `eth_getLogs` request
    #[serde(default = "defaults::log_chunk_size")]
    pub log_chunk_size: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: None,
            retries: defaults::retries(),
            backoff_ms: defaults::backoff_ms(),
            compute_units_per_second: defaults::compute_units_per_second(),
            concurrency: defaults::concurrency(),
            log_chunk_size: defaults::log_chunk_size(),
        }
    }
}

/// Top level config file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoyaltyConfig {
    pub period: PeriodConfig,
    pub collection: CollectionConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
}

impl LoyaltyConfig {
    /// Load the config from a TOML file.
    pub async fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .await
            .context(format!("Failed to read config file from {path:?}"))?;
        toml::from_str(&data).context(format!("Failed to parse toml file from {path:?}"))
    }

    /// Check the values that can be checked without a chain connection.
    ///
    /// The reward period itself is validated again when the run starts.
    pub fn validate(&self) -> Result<()> {
        if self.collection.address == Address::ZERO {
            bail!("collection.address must be set");
        }
        if self.period.block_end < self.period.block_start {
            bail!(
                "period.block_end ({}) is before period.block_start ({})",
                self.period.block_end,
                self.period.block_start
            );
        }
        if self.period.total_supply == Some(0) {
            bail!("period.total_supply must be positive");
        }
        if self.rpc.concurrency == 0 {
            bail!("rpc.concurrency must be positive");
        }
        if self.rpc.log_chunk_size == 0 {
            bail!("rpc.log_chunk_size must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CONFIG_TEMPLATE: &str = r#"
[period]
block_start = 100
block_end = 200
total_supply = 2

[collection]
address = "0x00000000000000000000000000000000000000c0"

[rpc]
url = "http://localhost:8545"
concurrency = 4
"#;

    const MINIMAL_CONFIG: &str = r#"
[period]
block_start = 5
block_end = 10

[collection]
address = "0x00000000000000000000000000000000000000c0"
"#;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn load_full_config() {
        let file = write_config(CONFIG_TEMPLATE);
        let config = LoyaltyConfig::load(file.path()).await.unwrap();

        assert_eq!(config.period.block_start, 100);
        assert_eq!(config.period.block_end, 200);
        assert_eq!(config.period.total_supply, Some(2));
        assert_eq!(
            config.collection.address,
            address!("0x00000000000000000000000000000000000000c0")
        );
        assert_eq!(config.rpc.url.as_ref().unwrap().as_str(), "http://localhost:8545/");
        assert_eq!(config.rpc.concurrency, 4);
        assert_eq!(config.rpc.retries, defaults::retries());
        config.validate().unwrap();
    }

    #[tokio::test]
    async fn missing_rpc_section_uses_defaults() {
        let file = write_config(MINIMAL_CONFIG);
        let config = LoyaltyConfig::load(file.path()).await.unwrap();

        assert_eq!(config.period.total_supply, None);
        assert!(config.rpc.url.is_none());
        assert_eq!(config.rpc.concurrency, defaults::concurrency());
        assert_eq!(config.rpc.log_chunk_size, DEFAULT_LOG_CHUNK_SIZE);
        config.validate().unwrap();
    }

    #[tokio::test]
    async fn load_reports_path_on_parse_error() {
        let file = write_config("[period]\nblock_start = \"soon\"\n");
        let err = LoyaltyConfig::load(file.path()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse toml file"));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config: LoyaltyConfig = toml::from_str(CONFIG_TEMPLATE).unwrap();
        config.period.block_end = 50;
        assert!(config.validate().is_err());

        let mut config: LoyaltyConfig = toml::from_str(CONFIG_TEMPLATE).unwrap();
        config.collection.address = Address::ZERO;
        assert!(config.validate().is_err());

        let mut config: LoyaltyConfig = toml::from_str(CONFIG_TEMPLATE).unwrap();
        config.period.total_supply = Some(0);
        assert!(config.validate().is_err());
    }
}
