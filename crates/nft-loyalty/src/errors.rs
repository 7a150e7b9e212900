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

//! Error types for a leaf computation run.

use alloy::primitives::U256;
use thiserror::Error;

/// Errors that carry a stable, greppable code alongside their message.
pub trait CodedError: std::error::Error {
    fn code(&self) -> &str;
}

/// Every way a run can fail. None of these are recovered internally; a failed run
/// yields no leaves at all.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LoyaltyError {
    /// The period or supply was rejected before any chain query was issued.
    #[error("invalid reward period: blocks {block_start}..={block_end} with total supply {total_supply}")]
    InvalidRange {
        /// First block of the period.
        block_start: u64,
        /// Last block of the period.
        block_end: u64,
        /// Number of tokens requested.
        total_supply: u64,
    },

    /// The owner of a token could not be resolved at the snapshot block.
    #[error("failed to resolve owner of token {token_id} at block {block}: {source:#}")]
    OwnershipQueryFailed {
        /// Token whose owner lookup failed.
        token_id: u64,
        /// Snapshot block of the lookup.
        block: u64,
        /// Underlying chain error.
        #[source]
        source: anyhow::Error,
    },

    /// The transfer event range could not be fetched completely.
    #[error("failed to fetch transfer events for blocks {from_block}..={to_block}: {source:#}")]
    EventQueryFailed {
        /// First block of the queried range.
        from_block: u64,
        /// Last block of the queried range.
        to_block: u64,
        /// Underlying chain error.
        #[source]
        source: anyhow::Error,
    },

    /// A transfer references a token outside `0..total_supply`.
    #[error("transfer in block {block} references token {token_id}, outside 0..{total_supply}")]
    TokenOutOfRange {
        /// Token id carried by the event.
        token_id: U256,
        /// Block of the offending event.
        block: u64,
        /// Configured supply.
        total_supply: u64,
    },

    /// A transfer was delivered for a block outside the reward period.
    #[error(
        "transfer of token {token_id} in block {block} lies outside period {block_start}..={block_end}"
    )]
    EventOutsidePeriod {
        /// Token id carried by the event.
        token_id: U256,
        /// Block of the offending event.
        block: u64,
        /// First block of the period.
        block_start: u64,
        /// Last block of the period.
        block_end: u64,
    },
}

impl LoyaltyError {
    /// Pipeline stage the error was raised in.
    pub fn stage(&self) -> &'static str {
        match self {
            LoyaltyError::InvalidRange { .. } => "validate",
            LoyaltyError::OwnershipQueryFailed { .. } => "resolve",
            LoyaltyError::EventQueryFailed { .. } => "fetch-events",
            LoyaltyError::TokenOutOfRange { .. } | LoyaltyError::EventOutsidePeriod { .. } => {
                "reconcile"
            }
        }
    }
}

impl CodedError for LoyaltyError {
    fn code(&self) -> &str {
        match self {
            LoyaltyError::InvalidRange { .. } => "[L-VAL-001]",
            LoyaltyError::OwnershipQueryFailed { .. } => "[L-RES-001]",
            LoyaltyError::EventQueryFailed { .. } => "[L-EVT-001]",
            LoyaltyError::TokenOutOfRange { .. } => "[L-REC-001]",
            LoyaltyError::EventOutsidePeriod { .. } => "[L-REC-002]",
        }
    }
}
