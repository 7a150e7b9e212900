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

//! Leaf, transfer and period types shared by the resolver and reconciler.

use alloy::{
    primitives::{Address, U256},
    sol_types::SolValue,
};
use serde::{Deserialize, Serialize};

use crate::errors::LoyaltyError;

/// Inclusive block range `[block_start, block_end]` over which holding is credited,
/// together with the number of tokens in the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPeriod {
    /// Snapshot block at which initial ownership is sampled
    pub block_start: u64,
    /// Last block of the period
    pub block_end: u64,
    /// Number of tokens, ids `0..total_supply`
    pub total_supply: u64,
}

impl RewardPeriod {
    /// Validate and build a period. Rejects `block_end < block_start` and an empty supply.
    pub fn new(block_start: u64, block_end: u64, total_supply: u64) -> Result<Self, LoyaltyError> {
        if block_end < block_start || total_supply == 0 {
            return Err(LoyaltyError::InvalidRange { block_start, block_end, total_supply });
        }
        Ok(Self { block_start, block_end, total_supply })
    }

    /// Number of blocks a token held for the whole period is credited with.
    pub fn duration(&self) -> u64 {
        self.block_end - self.block_start
    }

    /// Whether `block` falls inside the period.
    pub fn contains(&self, block: u64) -> bool {
        (self.block_start..=self.block_end).contains(&block)
    }
}

/// One token's reward attribution record.
///
/// The field order is the downstream encoding order and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leaf {
    /// Address credited for the token
    pub holder: Address,
    /// NFT collection contract
    pub collection: Address,
    /// Token identifier
    pub token_id: u64,
    /// Block at which the holder's attribution ends
    pub held_until: u64,
}

impl Leaf {
    pub fn new(holder: Address, collection: Address, token_id: u64, held_until: u64) -> Self {
        Self { holder, collection, token_id, held_until }
    }

    /// Blocks credited to this leaf within the period starting at `block_start`.
    pub fn blocks_held(&self, block_start: u64) -> u64 {
        self.held_until.saturating_sub(block_start)
    }

    /// ABI encoding of `(address holder, address collection, uint256 tokenId, uint256 heldUntil)`.
    pub fn abi_encode(&self) -> Vec<u8> {
        (self.holder, self.collection, U256::from(self.token_id), U256::from(self.held_until))
            .abi_encode()
    }
}

/// A decoded ERC-721 `Transfer` log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferEvent {
    /// Token id as emitted on chain
    pub token_id: U256,
    /// Previous owner
    pub from: Address,
    /// Recipient
    pub to: Address,
    /// Block the transfer was mined in
    pub block_number: u64,
    /// Position of the transaction within the block
    pub transaction_index: u64,
    /// Position of the log within the block
    pub log_index: u64,
}

impl TransferEvent {
    /// Chronological sort key.
    pub fn position(&self) -> (u64, u64, u64) {
        (self.block_number, self.transaction_index, self.log_index)
    }
}

/// The finished leaf set of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    /// One leaf per token, indexed by token id
    pub leaves: Vec<Leaf>,
    /// Sum of `held_until - block_start` over all leaves
    pub total_held: u64,
}

impl AggregateResult {
    /// Fold finished leaves into the aggregate.
    pub fn from_leaves(leaves: Vec<Leaf>, block_start: u64) -> Self {
        let total_held = total_held(&leaves, block_start);
        Self { leaves, total_held }
    }
}

/// Total block-weighted holding across `leaves`. Saturates at `u64::MAX`.
pub fn total_held(leaves: &[Leaf], block_start: u64) -> u64 {
    leaves.iter().fold(0u64, |total, leaf| total.saturating_add(leaf.blocks_held(block_start)))
}
