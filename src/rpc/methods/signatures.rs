// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use serde_json::{json, Value};

use super::{options_at, parse_commitment, required_str, MethodResult};
use crate::epoch::TransactionWithMeta;
use crate::gsfa::{collect_signatures_for_address, GsfaQuery, LogRecord};
use crate::multi_epoch::MultiEpoch;
use crate::rpc::error::RpcError;
use crate::rpc::RpcState;
use crate::solana::{Pubkey, Signature};

pub const MAX_SIGNATURE_LIMIT: usize = 1000;

/// Dereference one GSFA log record into a resolved transaction.
pub(crate) async fn materialize_record(
    multi: &Arc<MultiEpoch>,
    epoch: u64,
    record: LogRecord,
    want_meta: bool,
) -> crate::error::Result<TransactionWithMeta> {
    let handler = multi
        .get_epoch(epoch)
        .ok_or_else(|| crate::Error::not_found(format!("epoch {epoch} unloaded")))?;
    let (_cid, bytes) = handler
        .get_node_by_offset_and_size(record.offset, record.size)
        .await?;
    let node = crate::dag::decode_transaction(&bytes)?;
    handler.resolve_transaction(node, want_meta).await
}

pub async fn get_signatures_for_address(state: &RpcState, params: &Value) -> MethodResult {
    let address: Pubkey = required_str(params, 0, "address")?
        .parse()
        .map_err(|e| RpcError::invalid_params(format!("address: {e}")))?;
    let options = options_at(params, 1);
    parse_commitment(options)?;
    let limit = match options.get("limit") {
        None | Some(Value::Null) => MAX_SIGNATURE_LIMIT,
        Some(v) => match v.as_i64() {
            // Out-of-range limits coerce rather than error.
            Some(n) if (1..=MAX_SIGNATURE_LIMIT as i64).contains(&n) => n as usize,
            Some(_) => MAX_SIGNATURE_LIMIT,
            None => return Err(RpcError::invalid_params("limit must be a number")),
        },
    };
    let parse_sig = |key: &str| -> Result<Option<Signature>, RpcError> {
        match options.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => s
                .parse()
                .map(Some)
                .map_err(|e| RpcError::invalid_params(format!("{key}: {e}"))),
            Some(other) => Err(RpcError::invalid_params(format!(
                "{key} must be a string, got {other}"
            ))),
        }
    };
    let before = parse_sig("before")?;
    let until = parse_sig("until")?;

    let readers = state.multi.gsfa_readers_descending();
    if readers.is_empty() {
        return Err(RpcError::internal("no gsfa index configured"));
    }
    let served_by = readers.first().map(|(handler, _)| handler.root());
    let only_signatures = state.multi.options().gsfa_only_signatures;

    let query = GsfaQuery {
        limit,
        before,
        until,
        slot_range: None,
    };
    let gsfa_readers: Vec<_> = readers.iter().map(|(_, reader)| reader.clone()).collect();
    let multi = state.multi.clone();
    // In signatures-only mode the log records answer everything; nothing
    // is materialised out of the archive.
    let hits = collect_signatures_for_address(
        &gsfa_readers,
        &address,
        &query,
        None,
        !only_signatures,
        |epoch, record: LogRecord| {
            let multi = multi.clone();
            async move { materialize_record(&multi, epoch, record, true).await }
        },
    )
    .await?;

    let mut out = Vec::with_capacity(hits.len());
    for hit in &hits {
        let block_time = state
            .multi
            .get_epoch(crate::epoch::epoch_of_slot(hit.slot))
            .and_then(|h| h.get_blocktime(hit.slot).ok());
        let err = match hit.tx.as_ref().and_then(|tx| tx.meta.as_ref()) {
            Some(meta) => meta
                .err()
                .map_err(|e| RpcError::internal(e.to_string()))?
                .map(|e| serde_json::to_value(e).unwrap_or(Value::Null))
                .unwrap_or(Value::Null),
            None => Value::Null,
        };
        let memo = hit
            .tx
            .as_ref()
            .and_then(|tx| tx.parsed.memo())
            .map_or(Value::Null, Value::from);
        out.push(json!({
            "signature": hit.signature.to_string(),
            "slot": hit.slot,
            "blockTime": block_time,
            "err": err,
            "memo": memo,
            "confirmationStatus": "finalized",
        }));
    }

    Ok((Value::Array(out), served_by))
}
