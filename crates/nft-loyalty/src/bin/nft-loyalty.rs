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

use std::path::PathBuf;

use alloy::primitives::Address;
use anyhow::{bail, Context, Result};
use clap::Parser;
use nft_loyalty::{
    compute_leaves, AggregateResult, CodedError, LoyaltyConfig, RewardPeriod, RpcChainState,
    RunOptions,
};
use url::Url;

/// Compute per-token loyalty leaves for an NFT collection over a reward period.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file.
    #[clap(short, long, env = "LOYALTY_CONFIG")]
    config: Option<PathBuf>,

    /// URL of the Ethereum RPC endpoint.
    #[clap(short, long, env)]
    rpc_url: Option<Url>,

    /// Address of the NFT collection.
    #[clap(long, env)]
    collection: Option<Address>,

    /// Snapshot block of the reward period.
    #[clap(long)]
    block_start: Option<u64>,

    /// Last block of the reward period (inclusive).
    #[clap(long)]
    block_end: Option<u64>,

    /// Number of tokens. Read from the collection's totalSupply() when not set.
    #[clap(long)]
    total_supply: Option<u64>,

    /// Max ownerOf lookups in flight.
    #[clap(long)]
    concurrency: Option<usize>,

    /// Write the leaves JSON here instead of stdout.
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Whether to log in JSON format.
    #[clap(long, env, default_value_t = false)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        .from_env_lossy();

    // Logs go to stderr so the leaves can be piped from stdout.
    if args.log_json {
        tracing_subscriber::fmt()
            .with_ansi(false)
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    }

    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!("Loaded environment variables from {:?}", path),
        Err(e) if e.not_found() => tracing::debug!("No .env file found"),
        Err(e) => bail!("failed to load .env file: {}", e),
    }

    let config = load_config(&args).await?;
    run(&config, args.output.as_deref()).await
}

/// Merge the config file (if any) with command line overrides.
async fn load_config(args: &Args) -> Result<LoyaltyConfig> {
    let mut config = match &args.config {
        Some(path) => LoyaltyConfig::load(path).await?,
        None => LoyaltyConfig::default(),
    };

    if let Some(rpc_url) = &args.rpc_url {
        config.rpc.url = Some(rpc_url.clone());
    }
    if let Some(collection) = args.collection {
        config.collection.address = collection;
    }
    if let Some(block_start) = args.block_start {
        config.period.block_start = block_start;
    }
    if let Some(block_end) = args.block_end {
        config.period.block_end = block_end;
    }
    if args.total_supply.is_some() {
        config.period.total_supply = args.total_supply;
    }
    if let Some(concurrency) = args.concurrency {
        config.rpc.concurrency = concurrency;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn run(config: &LoyaltyConfig, output: Option<&std::path::Path>) -> Result<()> {
    let rpc_url = config.rpc.url.clone().context("RPC URL not provided. Set --rpc-url or rpc.url")?;
    let chain = RpcChainState::connect(rpc_url, &config.rpc);
    let collection = config.collection.address;

    let total_supply = match config.period.total_supply {
        Some(total_supply) => total_supply,
        None => {
            let total_supply = chain
                .total_supply(collection, config.period.block_end)
                .await
                .context("Failed to read totalSupply() from the collection")?;
            tracing::info!("Collection reports total supply {}", total_supply);
            total_supply
        }
    };

    let options = RunOptions { concurrency: config.rpc.concurrency };
    let run_result =
        match RewardPeriod::new(config.period.block_start, config.period.block_end, total_supply)
        {
            Ok(period) => compute_leaves(&chain, collection, period, &options).await,
            Err(err) => Err(err),
        };

    let run_output = match run_result {
        Ok(run_output) => run_output,
        Err(err) => {
            tracing::error!("{} run failed at stage {}: {}", err.code(), err.stage(), err);
            bail!("Leaf computation failed: {err}");
        }
    };

    if run_output.summary.tokens_reassigned > 0 {
        tracing::warn!(
            "{} tokens changed hands during the period; leaves keep the snapshot holder",
            run_output.summary.tokens_reassigned
        );
    }

    write_result(&run_output.result, output).await?;
    tracing::info!(
        "Wrote {} leaves, total held {} blocks",
        run_output.result.leaves.len(),
        run_output.result.total_held
    );
    Ok(())
}

async fn write_result(result: &AggregateResult, output: Option<&std::path::Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(result).context("Failed to serialize leaves")?;
    match output {
        Some(path) => tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write leaves to {}", path.display())),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["nft-loyalty"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[tokio::test]
    async fn flags_alone_form_a_config() {
        let config = load_config(&args(&[
            "--rpc-url",
            "http://localhost:8545",
            "--collection",
            "0x00000000000000000000000000000000000000c0",
            "--block-start",
            "100",
            "--block-end",
            "200",
            "--total-supply",
            "2",
        ]))
        .await
        .unwrap();

        assert_eq!(config.collection.address, address!("0x00000000000000000000000000000000000000c0"));
        assert_eq!(config.period.block_start, 100);
        assert_eq!(config.period.block_end, 200);
        assert_eq!(config.period.total_supply, Some(2));
    }

    #[tokio::test]
    async fn missing_collection_is_rejected() {
        let result = load_config(&args(&["--block-start", "1", "--block-end", "2"])).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn result_is_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaves.json");
        let result = AggregateResult::from_leaves(
            vec![nft_loyalty::Leaf::new(Address::repeat_byte(1), Address::repeat_byte(2), 0, 150)],
            100,
        );

        write_result(&result, Some(&path)).await.unwrap();

        let written: AggregateResult =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, result);
    }
}
