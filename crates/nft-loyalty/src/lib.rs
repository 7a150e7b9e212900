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

//! Loyalty reward leaves for NFT collections.
//!
//! For a reward period `[block_start, block_end]`, a run snapshots the owner of every
//! token at `block_start`, then folds the period's `Transfer` events into a per-token
//! `held_until` block. The resulting leaves, one per token id, feed a downstream
//! Merkle distribution.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

pub mod chain;
pub mod config;
pub mod contracts;
pub mod errors;
pub mod leaf;
pub mod reconciler;
pub mod resolver;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use chain::{query_logs_chunked, ChainStateProvider, RpcChainState, RpcProvider};
pub use config::LoyaltyConfig;
pub use errors::{CodedError, LoyaltyError};
pub use leaf::{total_held, AggregateResult, Leaf, RewardPeriod, TransferEvent};
pub use reconciler::{reconcile_transfers, ReconcileSummary};
pub use resolver::resolve_initial_leaves;

/// Tunables for a single run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Max `ownerOf` lookups in flight
    pub concurrency: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { concurrency: config::defaults::concurrency() }
    }
}

/// Output of [compute_leaves]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutput {
    pub result: AggregateResult,
    pub summary: ReconcileSummary,
}

/// Compute the leaves and total held blocks of `collection` for `period`.
///
/// Resolves the snapshot owners, fetches the period's transfers and reconciles them.
/// Any failure aborts the run; no partial result is ever returned. Rerunning against the
/// same chain state yields the same output.
pub async fn compute_leaves<C>(
    chain: &C,
    collection: Address,
    period: RewardPeriod,
    options: &RunOptions,
) -> Result<RunOutput, LoyaltyError>
where
    C: ChainStateProvider + ?Sized,
{
    // Re-check in case the period was built without `RewardPeriod::new`.
    let period = RewardPeriod::new(period.block_start, period.block_end, period.total_supply)?;
    let start = std::time::Instant::now();
    tracing::info!(
        "Computing leaves for {} over blocks {}..={} ({} tokens)",
        collection,
        period.block_start,
        period.block_end,
        period.total_supply
    );

    let leaves = resolve_initial_leaves(chain, collection, &period, options.concurrency).await?;

    let fetch_start = std::time::Instant::now();
    let events = chain
        .transfer_events(collection, period.block_start, period.block_end)
        .await
        .map_err(|source| LoyaltyError::EventQueryFailed {
            from_block: period.block_start,
            to_block: period.block_end,
            source,
        })?;
    tracing::info!(
        "Fetched {} transfer events in {:.2}s",
        events.len(),
        fetch_start.elapsed().as_secs_f64()
    );

    let (result, summary) = reconcile_transfers(leaves, events, &period)?;

    tracing::info!("Run completed in {:.2}s", start.elapsed().as_secs_f64());
    Ok(RunOutput { result, summary })
}

/// Convenience wrapper taking the raw period bounds.
pub async fn compute_leaves_for_range<C>(
    chain: &C,
    collection: Address,
    block_start: u64,
    block_end: u64,
    total_supply: u64,
    options: &RunOptions,
) -> Result<RunOutput, LoyaltyError>
where
    C: ChainStateProvider + ?Sized,
{
    let period = RewardPeriod::new(block_start, block_end, total_supply)?;
    compute_leaves(chain, collection, period, options).await
}
