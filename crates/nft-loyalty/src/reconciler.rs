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

//! Folding period transfers into the initial leaves.

use std::collections::BTreeMap;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::{
    errors::LoyaltyError,
    leaf::{AggregateResult, Leaf, RewardPeriod, TransferEvent},
};

/// What the reconciliation pass did, beyond the leaves themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    /// Number of transfer events applied
    pub transfers_applied: usize,
    /// Number of distinct tokens that moved during the period
    pub tokens_reassigned: usize,
    /// Recipient of the latest transfer, by token id. Leaves keep their snapshot holder;
    /// this is reported for auditing only.
    pub last_recipients: BTreeMap<u64, Address>,
}

/// Apply `events` to `leaves` and fold the result into an [AggregateResult].
///
/// `leaves` must be the snapshot for `period`, indexed by token id. Events may arrive in
/// any order; they are applied sorted by (block, transaction index, log index), so each
/// token ends up held until its chronologically latest transfer. Every event is checked
/// before any leaf is touched.
pub fn reconcile_transfers(
    mut leaves: Vec<Leaf>,
    events: Vec<TransferEvent>,
    period: &RewardPeriod,
) -> Result<(AggregateResult, ReconcileSummary), LoyaltyError> {
    debug_assert_eq!(
        leaves.len() as u64,
        period.total_supply,
        "snapshot does not cover every token of the period"
    );
    let mut indexed = Vec::with_capacity(events.len());
    for event in events {
        let index = leaf_index(&event, leaves.len(), period)?;
        indexed.push((index, event));
    }

    // Sort events by block number, then transaction index, then log index
    indexed.sort_by_key(|(_, event)| event.position());

    let mut summary = ReconcileSummary::default();
    for (index, event) in &indexed {
        let leaf = &mut leaves[*index];
        tracing::trace!(
            "Token {} transferred to {} at block {} (was held until {})",
            leaf.token_id,
            event.to,
            event.block_number,
            leaf.held_until
        );
        leaf.held_until = event.block_number;
        summary.last_recipients.insert(leaf.token_id, event.to);
    }
    summary.transfers_applied = indexed.len();
    summary.tokens_reassigned = summary.last_recipients.len();

    let result = AggregateResult::from_leaves(leaves, period.block_start);
    tracing::info!(
        "Applied {} transfers across {} tokens; total held {} blocks",
        summary.transfers_applied,
        summary.tokens_reassigned,
        result.total_held
    );

    Ok((result, summary))
}

/// Position of the leaf `event` targets, or the error that rejects it.
fn leaf_index(
    event: &TransferEvent,
    leaf_count: usize,
    period: &RewardPeriod,
) -> Result<usize, LoyaltyError> {
    if !period.contains(event.block_number) {
        return Err(LoyaltyError::EventOutsidePeriod {
            token_id: event.token_id,
            block: event.block_number,
            block_start: period.block_start,
            block_end: period.block_end,
        });
    }

    u64::try_from(event.token_id)
        .ok()
        .filter(|token_id| *token_id < period.total_supply)
        .and_then(|token_id| usize::try_from(token_id).ok())
        .filter(|index| *index < leaf_count)
        .ok_or(LoyaltyError::TokenOutOfRange {
            token_id: event.token_id,
            block: event.block_number,
            total_supply: period.total_supply,
        })
}
