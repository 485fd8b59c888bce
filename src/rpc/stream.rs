// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The streaming listener: the unary method mirrors plus the
//! `streamBlocks` / `streamTransactions` subscriptions, served over
//! jsonrpsee on the `--grpc-listen` address.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use jsonrpsee::core::{async_trait, RpcResult, SubscriptionResult};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::Server;
use jsonrpsee::types::ErrorObjectOwned;
use jsonrpsee::{PendingSubscriptionSink, SubscriptionMessage, SubscriptionSink};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::error::RpcError;
use super::methods;
use super::RpcState;
use crate::epoch::{epochs_in_range, TransactionWithMeta};
use crate::gsfa::{collect_signatures_for_address, GsfaQuery, TxFilter};
use crate::solana::encoding::{self, UiEncoding};
use crate::solana::Pubkey;

/// Slots covered when the caller gives no end slot.
pub const DEFAULT_STREAM_WINDOW: u64 = 100;

/// Whole-stream deadline for `streamTransactions`.
pub const STREAM_TX_DEADLINE: Duration = Duration::from_secs(60);

/// Concurrent per-address GSFA queries in account-fanout mode.
pub const ADDRESS_FANOUT: usize = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlocksFilter {
    pub account_include: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionsFilter {
    pub vote: Option<bool>,
    pub failed: Option<bool>,
    pub account_include: Vec<String>,
    pub account_exclude: Vec<String>,
    pub account_required: Vec<String>,
}

#[rpc(server)]
pub trait ChronicleStream {
    #[method(name = "getVersion")]
    async fn get_version(&self) -> RpcResult<Value>;

    #[method(name = "getBlock")]
    async fn get_block(&self, slot: u64, options: Option<Value>) -> RpcResult<Value>;

    #[method(name = "getTransaction")]
    async fn get_transaction(&self, signature: String, options: Option<Value>)
        -> RpcResult<Value>;

    #[method(name = "getBlockTime")]
    async fn get_block_time(&self, slot: u64) -> RpcResult<Value>;

    #[method(name = "getSignaturesForAddress")]
    async fn get_signatures_for_address(
        &self,
        address: String,
        options: Option<Value>,
    ) -> RpcResult<Value>;

    #[method(name = "getGenesisHash")]
    async fn get_genesis_hash(&self) -> RpcResult<Value>;

    #[subscription(name = "streamBlocks", unsubscribe = "streamBlocksUnsubscribe", item = Value)]
    async fn stream_blocks(
        &self,
        start_slot: u64,
        end_slot: Option<u64>,
        filter: Option<BlocksFilter>,
    ) -> SubscriptionResult;

    #[subscription(
        name = "streamTransactions",
        unsubscribe = "streamTransactionsUnsubscribe",
        item = Value
    )]
    async fn stream_transactions(
        &self,
        start_slot: u64,
        end_slot: Option<u64>,
        filter: Option<TransactionsFilter>,
    ) -> SubscriptionResult;
}

pub struct StreamService {
    state: Arc<RpcState>,
}

impl StreamService {
    pub fn new(state: Arc<RpcState>) -> Self {
        Self { state }
    }
}

fn params(values: &[Value]) -> Value {
    Value::Array(values.to_vec())
}

fn parse_keys(raw: &[String]) -> Result<Vec<Pubkey>, RpcError> {
    raw.iter()
        .map(|s| {
            s.parse()
                .map_err(|e| RpcError::invalid_params(format!("account key {s}: {e}")))
        })
        .collect()
}

#[async_trait]
impl ChronicleStreamServer for StreamService {
    async fn get_version(&self) -> RpcResult<Value> {
        methods::get_version(&self.state)
            .map(|(v, _)| v)
            .map_err(ErrorObjectOwned::from)
    }

    async fn get_block(&self, slot: u64, options: Option<Value>) -> RpcResult<Value> {
        let params = params(&[json!(slot), options.unwrap_or(Value::Null)]);
        methods::get_block(&self.state, &params)
            .await
            .map(|(v, _)| v)
            .map_err(ErrorObjectOwned::from)
    }

    async fn get_transaction(
        &self,
        signature: String,
        options: Option<Value>,
    ) -> RpcResult<Value> {
        let params = params(&[json!(signature), options.unwrap_or(Value::Null)]);
        methods::get_transaction(&self.state, &params)
            .await
            .map(|(v, _)| v)
            .map_err(ErrorObjectOwned::from)
    }

    async fn get_block_time(&self, slot: u64) -> RpcResult<Value> {
        let params = params(&[json!(slot)]);
        methods::get_block_time(&self.state, &params)
            .await
            .map(|(v, _)| v)
            .map_err(ErrorObjectOwned::from)
    }

    async fn get_signatures_for_address(
        &self,
        address: String,
        options: Option<Value>,
    ) -> RpcResult<Value> {
        let params = params(&[json!(address), options.unwrap_or(Value::Null)]);
        methods::get_signatures_for_address(&self.state, &params)
            .await
            .map(|(v, _)| v)
            .map_err(ErrorObjectOwned::from)
    }

    async fn get_genesis_hash(&self) -> RpcResult<Value> {
        methods::get_genesis_hash(&self.state)
            .await
            .map(|(v, _)| v)
            .map_err(ErrorObjectOwned::from)
    }

    async fn stream_blocks(
        &self,
        pending: PendingSubscriptionSink,
        start_slot: u64,
        end_slot: Option<u64>,
        filter: Option<BlocksFilter>,
    ) -> SubscriptionResult {
        let include = match parse_keys(&filter.unwrap_or_default().account_include) {
            Ok(keys) => keys,
            Err(e) => {
                pending.reject(ErrorObjectOwned::from(e)).await;
                return Ok(());
            }
        };
        let sink = pending.accept().await?;
        let end = end_slot.unwrap_or(start_slot + DEFAULT_STREAM_WINDOW - 1);
        let ct = self.state.shutdown.child_token();
        let include_filter = TxFilter {
            account_include: include.clone(),
            ..Default::default()
        };
        debug!(start_slot, end, "streamBlocks subscription");

        for slot in start_slot..=end {
            if ct.is_cancelled() || sink.is_closed() {
                break;
            }
            let Ok(handler) = self.state.multi.handler_for_slot(slot) else {
                continue;
            };
            // Missing slots are silently skipped; real failures end the
            // stream.
            let assembled = match handler.get_block(slot, true, true, &ct).await {
                Ok(assembled) => assembled,
                Err(crate::Error::NotFound(_)) => continue,
                Err(e) => return Err(RpcError::from(e).to_string().into()),
            };
            if !include.is_empty() {
                let touches = assembled
                    .transactions
                    .iter()
                    .any(|tx| include_filter.matches(tx).unwrap_or(false));
                if !touches {
                    continue;
                }
            }
            let block = methods::render_block(
                &assembled,
                UiEncoding::Json,
                methods::TransactionDetails::Full,
                Some(0),
            )
            .map_err(|e| e.to_string())?;
            let payload = json!({"slot": slot, "block": block});
            sink.send(SubscriptionMessage::from_json(&payload)?).await?;
        }
        Ok(())
    }

    async fn stream_transactions(
        &self,
        pending: PendingSubscriptionSink,
        start_slot: u64,
        end_slot: Option<u64>,
        filter: Option<TransactionsFilter>,
    ) -> SubscriptionResult {
        let filter = filter.unwrap_or_default();
        let parsed = (|| -> Result<TxFilter, RpcError> {
            Ok(TxFilter {
                vote: filter.vote,
                failed: filter.failed,
                account_include: parse_keys(&filter.account_include)?,
                account_exclude: parse_keys(&filter.account_exclude)?,
                account_required: parse_keys(&filter.account_required)?,
            })
        })();
        let tx_filter = match parsed {
            Ok(f) => f,
            Err(e) => {
                pending.reject(ErrorObjectOwned::from(e)).await;
                return Ok(());
            }
        };
        let sink = pending.accept().await?;
        let end = end_slot.unwrap_or(start_slot + DEFAULT_STREAM_WINDOW - 1);
        let ct = self.state.shutdown.child_token();
        debug!(start_slot, end, "streamTransactions subscription");

        let work = async {
            if tx_filter.account_include.is_empty() {
                self.scan_slots(&sink, start_slot, end, &tx_filter, &ct).await
            } else {
                self.fan_out_addresses(&sink, start_slot, end, &tx_filter, &ct)
                    .await
            }
        };
        match tokio::time::timeout(STREAM_TX_DEADLINE, work).await {
            Ok(result) => result,
            Err(_) => Err("stream deadline exceeded".to_string().into()),
        }
    }
}

impl StreamService {
    /// Mode (a): no account filter; scan blocks in slot order and emit
    /// matching transactions as they are discovered.
    async fn scan_slots(
        &self,
        sink: &SubscriptionSink,
        start: u64,
        end: u64,
        filter: &TxFilter,
        ct: &tokio_util::sync::CancellationToken,
    ) -> SubscriptionResult {
        for slot in start..=end {
            if ct.is_cancelled() || sink.is_closed() {
                return Ok(());
            }
            let Ok(handler) = self.state.multi.handler_for_slot(slot) else {
                continue;
            };
            let assembled = match handler.get_block(slot, true, false, ct).await {
                Ok(assembled) => assembled,
                Err(crate::Error::NotFound(_)) => continue,
                Err(e) => return Err(RpcError::from(e).to_string().into()),
            };
            for tx in &assembled.transactions {
                if !filter.matches(tx).map_err(|e| e.to_string())? {
                    continue;
                }
                sink.send(SubscriptionMessage::from_json(&render_transaction(tx)?)?)
                    .await?;
            }
        }
        Ok(())
    }

    /// Mode (b): per-address GSFA queries, at most [`ADDRESS_FANOUT`]
    /// concurrent, buffered and flushed in `(slot, position)` order.
    /// Cancellation is observed at every suspension point: between
    /// sub-query completions, inside each record materialisation, and in
    /// the flush loop; on cancellation or failure the buffer is discarded
    /// with the stream.
    async fn fan_out_addresses(
        &self,
        sink: &SubscriptionSink,
        start: u64,
        end: u64,
        filter: &TxFilter,
        ct: &tokio_util::sync::CancellationToken,
    ) -> SubscriptionResult {
        let readers: Vec<_> = self
            .state
            .multi
            .gsfa_readers_descending()
            .into_iter()
            .filter(|(_, reader)| {
                epochs_in_range(start, end).any(|e| e == reader.epoch())
            })
            .map(|(_, reader)| reader)
            .collect();
        let multi = self.state.multi.clone();

        // Per-address sub-queries: the address filter narrows to one
        // account, the rest of the predicate still applies.
        let mut buffered: BTreeMap<(u64, u64, String), TransactionWithMeta> = BTreeMap::new();
        let mut queries = futures::stream::iter(filter.account_include.clone().into_iter().map(
            |address| {
                let readers = readers.clone();
                let multi = multi.clone();
                let ct = ct.clone();
                let mut sub_filter = filter.clone();
                sub_filter.account_include = vec![address];
                let query = GsfaQuery {
                    limit: usize::MAX,
                    before: None,
                    until: None,
                    slot_range: Some(start..=end),
                };
                async move {
                    collect_signatures_for_address(
                        &readers,
                        &address,
                        &query,
                        Some(&sub_filter),
                        true,
                        |epoch, record| {
                            let multi = multi.clone();
                            let ct = ct.clone();
                            async move {
                                if ct.is_cancelled() {
                                    return Err(crate::Error::Cancelled);
                                }
                                methods::materialize_record(&multi, epoch, record, true).await
                            }
                        },
                    )
                    .await
                }
                .boxed()
            },
        ))
        .buffer_unordered(ADDRESS_FANOUT);

        loop {
            let result = tokio::select! {
                _ = ct.cancelled() => return Ok(()),
                next = queries.next() => match next {
                    Some(result) => result,
                    None => break,
                },
            };
            let hits = result.map_err(|e| RpcError::from(e).to_string())?;
            for hit in hits {
                let Some(tx) = hit.tx else {
                    continue;
                };
                buffered.insert(
                    (hit.slot, tx.position.unwrap_or(u64::MAX), hit.signature.to_string()),
                    tx,
                );
            }
        }

        for ((_slot, _position, _signature), tx) in &buffered {
            if ct.is_cancelled() || sink.is_closed() {
                return Ok(());
            }
            sink.send(SubscriptionMessage::from_json(&render_transaction(tx)?)?)
                .await?;
        }
        Ok(())
    }
}

fn render_transaction(tx: &TransactionWithMeta) -> Result<Value, jsonrpsee::core::StringError> {
    let meta = match &tx.meta {
        Some(meta) => encoding::meta_to_json(meta).map_err(|e| e.to_string())?,
        None => Value::Null,
    };
    Ok(json!({
        "slot": tx.slot,
        "position": tx.position,
        "signature": tx.signature().map(|s| s.to_string()).map_err(|e| e.to_string())?,
        "transaction": encoding::transaction_to_json(&tx.parsed),
        "meta": meta,
        "isVote": tx.parsed.is_vote(),
    }))
}

/// Run the streaming listener until cancelled.
pub async fn serve(
    state: Arc<RpcState>,
    addr: SocketAddr,
    ct: tokio_util::sync::CancellationToken,
) -> anyhow::Result<()> {
    let server = Server::builder().build(addr).await?;
    info!(%addr, "streaming listener up");
    let handle = server.start(StreamService::new(state).into_rpc());
    ct.cancelled_owned().await;
    let _ = handle.stop();
    handle.stopped().await;
    Ok(())
}
