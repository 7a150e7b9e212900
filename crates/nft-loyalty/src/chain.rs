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

//! Chain state access: the [ChainStateProvider] seam and its JSON-RPC implementation.

use alloy::{
    primitives::{Address, U256},
    providers::{
        fillers::{ChainIdFiller, FillProvider, JoinFill},
        Identity, Provider, ProviderBuilder, RootProvider,
    },
    rpc::{
        client::RpcClient,
        types::{BlockId, BlockNumberOrTag, Filter, Log},
    },
    sol_types::SolEvent,
    transports::layers::RetryBackoffLayer,
};
use anyhow::{bail, Context};
use url::Url;

use crate::{config::RpcConfig, contracts::IERC721, leaf::TransferEvent};

/// Default number of blocks per `eth_getLogs` request, to stay under provider limits
pub const DEFAULT_LOG_CHUNK_SIZE: u64 = 5000;

/// Read-only view of the chain needed by a run.
///
/// Implementations are expected to either succeed or fail definitively; retrying is
/// their own concern.
#[async_trait::async_trait]
pub trait ChainStateProvider: Send + Sync {
    /// Owner of `token_id` in `collection` as of `block`.
    async fn owner_of(
        &self,
        collection: Address,
        token_id: u64,
        block: u64,
    ) -> anyhow::Result<Address>;

    /// Every `Transfer` emitted by `collection` in `from_block..=to_block`, in no
    /// particular order. Must return the complete set or fail.
    async fn transfer_events(
        &self,
        collection: Address,
        from_block: u64,
        to_block: u64,
    ) -> anyhow::Result<Vec<TransferEvent>>;
}

/// Provider type produced by [RpcChainState::connect].
pub type RpcProvider = FillProvider<JoinFill<Identity, ChainIdFiller>, RootProvider>;

/// [ChainStateProvider] backed by an alloy [Provider].
#[derive(Clone)]
pub struct RpcChainState<P> {
    provider: P,
    log_chunk_size: u64,
}

impl<P> RpcChainState<P> {
    pub fn new(provider: P) -> Self {
        Self { provider, log_chunk_size: DEFAULT_LOG_CHUNK_SIZE }
    }

    /// Override the number of blocks fetched per `eth_getLogs` request.
    pub fn with_log_chunk_size(mut self, log_chunk_size: u64) -> Self {
        self.log_chunk_size = log_chunk_size.max(1);
        self
    }
}

impl RpcChainState<RpcProvider> {
    /// Connect to `rpc_url` with retry/backoff taken from `config`.
    pub fn connect(rpc_url: Url, config: &RpcConfig) -> Self {
        let client = RpcClient::builder()
            .layer(RetryBackoffLayer::new(
                config.retries,
                config.backoff_ms,
                config.compute_units_per_second,
            ))
            .http(rpc_url);
        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .filler(ChainIdFiller::default())
            .connect_client(client);

        Self::new(provider).with_log_chunk_size(config.log_chunk_size)
    }
}

impl<P: Provider> RpcChainState<P> {
    /// `totalSupply()` of an enumerable collection as of `block`.
    pub async fn total_supply(&self, collection: Address, block: u64) -> anyhow::Result<u64> {
        let supply = IERC721::new(collection, &self.provider)
            .totalSupply()
            .block(BlockId::number(block))
            .call()
            .await
            .with_context(|| format!("totalSupply() failed at block {block}"))?;
        u64::try_from(supply)
            .map_err(|_| anyhow::anyhow!("totalSupply() {supply} does not fit in u64"))
    }
}

#[async_trait::async_trait]
impl<P: Provider> ChainStateProvider for RpcChainState<P> {
    async fn owner_of(
        &self,
        collection: Address,
        token_id: u64,
        block: u64,
    ) -> anyhow::Result<Address> {
        let owner = IERC721::new(collection, &self.provider)
            .ownerOf(U256::from(token_id))
            .block(BlockId::number(block))
            .call()
            .await
            .with_context(|| format!("ownerOf({token_id}) failed"))?;
        Ok(owner)
    }

    async fn transfer_events(
        &self,
        collection: Address,
        from_block: u64,
        to_block: u64,
    ) -> anyhow::Result<Vec<TransferEvent>> {
        let filter =
            Filter::new().address(collection).event_signature(IERC721::Transfer::SIGNATURE_HASH);
        let logs =
            query_logs_chunked(&self.provider, filter, from_block, to_block, self.log_chunk_size)
                .await?;

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            if log.removed {
                tracing::debug!("Skipping removed Transfer log {:?}", log.transaction_hash);
                continue;
            }
            events.push(decode_transfer(log)?);
        }
        Ok(events)
    }
}

/// Query logs in chunks of `chunk_size` blocks to avoid rate limiting.
pub async fn query_logs_chunked<P: Provider>(
    provider: &P,
    filter: Filter,
    from_block: u64,
    to_block: u64,
    chunk_size: u64,
) -> anyhow::Result<Vec<Log>> {
    let chunk_size = chunk_size.max(1);
    let mut all_logs = Vec::new();
    let mut current_from = from_block;

    while current_from <= to_block {
        let current_to = current_from.saturating_add(chunk_size - 1).min(to_block);

        let chunk_filter = filter
            .clone()
            .from_block(BlockNumberOrTag::Number(current_from))
            .to_block(BlockNumberOrTag::Number(current_to));

        let logs = provider
            .get_logs(&chunk_filter)
            .await
            .with_context(|| format!("eth_getLogs failed for blocks {current_from}..={current_to}"))?;
        tracing::debug!("Fetched {} logs for blocks {}..={}", logs.len(), current_from, current_to);
        all_logs.extend(logs);

        if current_to == to_block {
            break;
        }
        current_from = current_to + 1;
    }

    Ok(all_logs)
}

/// Decode a `Transfer` log. Logs without a mined position are rejected.
pub fn decode_transfer(log: &Log) -> anyhow::Result<TransferEvent> {
    let decoded = log
        .log_decode::<IERC721::Transfer>()
        .with_context(|| format!("malformed Transfer log in tx {:?}", log.transaction_hash))?;

    let (Some(block_number), Some(transaction_index), Some(log_index)) =
        (log.block_number, log.transaction_index, log.log_index)
    else {
        bail!("Transfer log in tx {:?} has no block position", log.transaction_hash);
    };

    Ok(TransferEvent {
        token_id: decoded.inner.data.tokenId,
        from: decoded.inner.data.from,
        to: decoded.inner.data.to,
        block_number,
        transaction_index,
        log_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, B256};
    use httpmock::prelude::*;
    use serde_json::json;

    const COLLECTION: Address = address!("0x00000000000000000000000000000000000000c0");
    const ALICE: Address = address!("0x00000000000000000000000000000000000000a1");
    const BOB: Address = address!("0x00000000000000000000000000000000000000b2");

    fn rpc_state(server: &MockServer) -> RpcChainState<impl Provider> {
        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect_http(server.base_url().parse().unwrap());
        RpcChainState::new(provider)
    }

    fn transfer_log(
        from: Address,
        to: Address,
        token_id: u64,
        block: u64,
        log_index: u64,
    ) -> serde_json::Value {
        json!({
            "address": COLLECTION,
            "topics": [
                IERC721::Transfer::SIGNATURE_HASH,
                from.into_word(),
                to.into_word(),
                B256::from(U256::from(token_id)),
            ],
            "data": "0x",
            "blockHash": B256::repeat_byte(0x11),
            "blockNumber": format!("{block:#x}"),
            "transactionHash": B256::repeat_byte(0x22),
            "transactionIndex": "0x0",
            "logIndex": format!("{log_index:#x}"),
            "removed": false
        })
    }

    fn rpc_result(result: serde_json::Value) -> serde_json::Value {
        json!({ "jsonrpc": "2.0", "id": 0, "result": result })
    }

    #[tokio::test]
    async fn owner_of_is_pinned_to_snapshot_block() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/").body_contains("eth_call").body_contains("\"0x64\"");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(rpc_result(json!(format!("{:#x}", ALICE.into_word()))));
        });

        let owner = rpc_state(&server).owner_of(COLLECTION, 3, 100).await.unwrap();

        mock.assert();
        assert_eq!(owner, ALICE);
    }

    #[tokio::test]
    async fn owner_of_surfaces_reverts() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/");
            then.status(200).header("content-type", "application/json").json_body(json!({
                "jsonrpc": "2.0",
                "id": 0,
                "error": { "code": 3, "message": "execution reverted: ERC721: invalid token ID" }
            }));
        });

        let err = rpc_state(&server).owner_of(COLLECTION, 99, 100).await.unwrap_err();
        assert!(format!("{err:#}").contains("ownerOf(99)"));
    }

    #[tokio::test]
    async fn transfer_events_are_decoded() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/").body_contains("eth_getLogs");
            then.status(200).header("content-type", "application/json").json_body(rpc_result(
                json!([transfer_log(ALICE, BOB, 3, 150, 1), transfer_log(BOB, ALICE, 0, 120, 0)]),
            ));
        });

        let events = rpc_state(&server).transfer_events(COLLECTION, 100, 200).await.unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].token_id, U256::from(3));
        assert_eq!(events[0].from, ALICE);
        assert_eq!(events[0].to, BOB);
        assert_eq!(events[0].position(), (150, 0, 1));
        assert_eq!(events[1].block_number, 120);
    }

    #[tokio::test]
    async fn transfer_events_are_fetched_in_chunks() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/").body_contains("eth_getLogs");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(rpc_result(json!([transfer_log(ALICE, BOB, 1, 150, 0)])));
        });

        // 100..=149, 150..=199, 200..=200
        let events = rpc_state(&server)
            .with_log_chunk_size(50)
            .transfer_events(COLLECTION, 100, 200)
            .await
            .unwrap();

        mock.assert_hits(3);
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn malformed_transfer_log_fails_the_fetch() {
        let server = MockServer::start();
        let mut log = transfer_log(ALICE, BOB, 1, 150, 0);
        // ERC-20 style Transfer: token id is not indexed.
        log["topics"].as_array_mut().unwrap().pop();
        server.mock(|when, then| {
            when.method(POST).path("/").body_contains("eth_getLogs");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(rpc_result(json!([log])));
        });

        let err = rpc_state(&server).transfer_events(COLLECTION, 100, 200).await.unwrap_err();
        assert!(err.to_string().contains("malformed Transfer log"));
    }

    fn serve_logs(server: &MockServer, logs: Vec<serde_json::Value>) {
        server.mock(|when, then| {
            when.method(POST).path("/").body_contains("eth_getLogs");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(rpc_result(json!(logs)));
        });
    }

    #[tokio::test]
    async fn log_without_block_number_fails_the_fetch() {
        let server = MockServer::start();
        let mut pending = transfer_log(ALICE, BOB, 1, 150, 0);
        pending["blockNumber"] = serde_json::Value::Null;
        serve_logs(&server, vec![transfer_log(BOB, ALICE, 0, 120, 0), pending]);

        let err = rpc_state(&server).transfer_events(COLLECTION, 100, 200).await.unwrap_err();
        assert!(err.to_string().contains("has no block position"));
    }

    #[tokio::test]
    async fn log_without_tx_or_log_index_fails_the_fetch() {
        for field in ["transactionIndex", "logIndex"] {
            let server = MockServer::start();
            let mut log = transfer_log(ALICE, BOB, 1, 150, 0);
            log[field] = serde_json::Value::Null;
            serve_logs(&server, vec![log]);

            let err = rpc_state(&server).transfer_events(COLLECTION, 100, 200).await.unwrap_err();
            assert!(err.to_string().contains("has no block position"), "{field}: {err:#}");
        }
    }

    #[tokio::test]
    async fn removed_logs_are_skipped() {
        let server = MockServer::start();
        let mut reorged = transfer_log(ALICE, BOB, 1, 150, 0);
        reorged["removed"] = json!(true);
        serve_logs(&server, vec![reorged, transfer_log(BOB, ALICE, 0, 120, 1)]);

        let events = rpc_state(&server).transfer_events(COLLECTION, 100, 200).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].token_id, U256::ZERO);
        assert_eq!(events[0].position(), (120, 0, 1));
    }
}
