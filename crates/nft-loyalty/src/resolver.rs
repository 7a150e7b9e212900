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

//! Ownership snapshot at the start of a reward period.

use alloy::primitives::Address;
use futures_util::{stream, StreamExt, TryStreamExt};

use crate::{
    chain::ChainStateProvider,
    errors::LoyaltyError,
    leaf::{Leaf, RewardPeriod},
};

/// Resolve the owner of every token at `period.block_start` and build the initial
/// leaves, each held until `period.block_end`.
///
/// Up to `concurrency` lookups are in flight at once. Results are ordered by token id
/// regardless of completion order, and the first failure aborts the whole snapshot.
pub async fn resolve_initial_leaves<C>(
    chain: &C,
    collection: Address,
    period: &RewardPeriod,
    concurrency: usize,
) -> Result<Vec<Leaf>, LoyaltyError>
where
    C: ChainStateProvider + ?Sized,
{
    let period = *period;
    let start = std::time::Instant::now();
    tracing::info!(
        "Resolving owners of {} tokens at block {} ({} concurrent lookups)",
        period.total_supply,
        period.block_start,
        concurrency.max(1)
    );

    let leaves: Vec<Leaf> = stream::iter(0..period.total_supply)
        .map(|token_id| async move {
            let holder = chain
                .owner_of(collection, token_id, period.block_start)
                .await
                .map_err(|source| LoyaltyError::OwnershipQueryFailed {
                    token_id,
                    block: period.block_start,
                    source,
                })?;
            tracing::trace!("Token {} held by {} at block {}", token_id, holder, period.block_start);
            Ok::<_, LoyaltyError>(Leaf::new(holder, collection, token_id, period.block_end))
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    tracing::info!(
        "Resolved {} owners in {:.2}s",
        leaves.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(leaves)
}
