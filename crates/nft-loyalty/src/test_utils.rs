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

//! In-memory [ChainStateProvider] for tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use alloy::primitives::{Address, U256};
use anyhow::bail;

use crate::{chain::ChainStateProvider, leaf::TransferEvent};

/// Chain state served from memory, with optional per-token latency and failures.
#[derive(Debug, Default)]
pub struct MockChainState {
    owners: HashMap<u64, Address>,
    owner_delays: HashMap<u64, Duration>,
    failing_owners: HashSet<u64>,
    events: Vec<TransferEvent>,
    fail_events: bool,
    owner_queries: Mutex<Vec<(u64, u64)>>,
    event_queries: AtomicUsize,
    owners_in_flight: AtomicUsize,
    max_owners_in_flight: AtomicUsize,
}

impl MockChainState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_owner(mut self, token_id: u64, owner: Address) -> Self {
        self.owners.insert(token_id, owner);
        self
    }

    /// Serve `owners[i]` as the owner of token `i`.
    pub fn with_owners(mut self, owners: &[Address]) -> Self {
        for (token_id, owner) in owners.iter().enumerate() {
            self.owners.insert(token_id as u64, *owner);
        }
        self
    }

    /// Delay the `ownerOf` response for `token_id`.
    pub fn with_owner_delay(mut self, token_id: u64, delay: Duration) -> Self {
        self.owner_delays.insert(token_id, delay);
        self
    }

    /// Make the `ownerOf` lookup for `token_id` fail.
    pub fn with_failing_owner(mut self, token_id: u64) -> Self {
        self.failing_owners.insert(token_id);
        self
    }

    /// Add a transfer of `token_id` to `to` at `block`. Log positions follow insertion order.
    pub fn with_transfer(mut self, token_id: u64, to: Address, block: u64) -> Self {
        let log_index = self.events.len() as u64;
        self.events.push(TransferEvent {
            token_id: U256::from(token_id),
            from: self.owners.get(&token_id).copied().unwrap_or_default(),
            to,
            block_number: block,
            transaction_index: 0,
            log_index,
        });
        self
    }

    /// Add `event` as is, keeping its block position.
    pub fn with_event(mut self, event: TransferEvent) -> Self {
        self.events.push(event);
        self
    }

    /// Make the event range fetch fail.
    pub fn with_failing_events(mut self) -> Self {
        self.fail_events = true;
        self
    }

    /// `(token_id, block)` of every `ownerOf` query served so far.
    pub fn owner_queries(&self) -> Vec<(u64, u64)> {
        self.owner_queries.lock().map(|queries| queries.clone()).unwrap_or_default()
    }

    /// Highest number of `ownerOf` lookups observed in flight at once.
    pub fn max_owner_queries_in_flight(&self) -> usize {
        self.max_owners_in_flight.load(Ordering::SeqCst)
    }

    /// Number of event range fetches served so far.
    pub fn event_queries(&self) -> usize {
        self.event_queries.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ChainStateProvider for MockChainState {
    async fn owner_of(
        &self,
        _collection: Address,
        token_id: u64,
        block: u64,
    ) -> anyhow::Result<Address> {
        if let Ok(mut queries) = self.owner_queries.lock() {
            queries.push((token_id, block));
        }
        let in_flight = self.owners_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_owners_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        if let Some(delay) = self.owner_delays.get(&token_id) {
            tokio::time::sleep(*delay).await;
        }
        self.owners_in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.failing_owners.contains(&token_id) {
            bail!("execution reverted: ownerOf({token_id})");
        }
        match self.owners.get(&token_id) {
            Some(owner) => Ok(*owner),
            None => bail!("execution reverted: ERC721NonexistentToken({token_id})"),
        }
    }

    async fn transfer_events(
        &self,
        _collection: Address,
        from_block: u64,
        to_block: u64,
    ) -> anyhow::Result<Vec<TransferEvent>> {
        self.event_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_events {
            bail!("eth_getLogs failed for blocks {from_block}..={to_block}");
        }
        Ok(self.events.clone())
    }
}
