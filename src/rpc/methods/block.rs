// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use serde_json::{json, Value};

use super::{
    check_transaction_version, options_at, parse_commitment, parse_encoding, required_u64,
    version_json, MethodResult,
};
use crate::epoch::AssembledBlock;
use crate::error::Error;
use crate::rpc::error::RpcError;
use crate::rpc::RpcState;
use crate::solana::encoding::{self, UiEncoding};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransactionDetails {
    Full,
    Signatures,
    None,
}

fn parse_details(options: &Value) -> Result<TransactionDetails, RpcError> {
    match options.get("transactionDetails").and_then(Value::as_str) {
        None | Some("full") => Ok(TransactionDetails::Full),
        Some("signatures") => Ok(TransactionDetails::Signatures),
        Some("none") => Ok(TransactionDetails::None),
        Some(other) => Err(RpcError::invalid_params(format!(
            "unsupported transactionDetails: {other}"
        ))),
    }
}

pub async fn get_block(state: &RpcState, params: &Value) -> MethodResult {
    let slot = required_u64(params, 0, "slot")?;
    let options = options_at(params, 1);
    parse_commitment(options)?;
    let encoding = parse_encoding(options)?;
    let details = parse_details(options)?;
    let want_rewards = options
        .get("rewards")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let max_version = options
        .get("maxSupportedTransactionVersion")
        .and_then(Value::as_u64);

    let handler = state
        .multi
        .handler_for_slot(slot)
        .map_err(|_| RpcError::slot_skipped(slot))?;
    let root = handler.root();

    // Slot 0 without an archived block is synthesised from genesis.
    if slot == 0 && handler.find_cid_from_slot(0).is_err() {
        if let Some(genesis) = handler.genesis() {
            let result = json!({
                "blockhash": genesis.hash,
                "previousBlockhash": genesis.hash,
                "parentSlot": 0,
                "blockHeight": 0,
                "blockTime": genesis.creation_time,
                "transactions": [],
                "rewards": [],
            });
            return Ok((result, Some(root)));
        }
    }

    let want_meta = details == TransactionDetails::Full;
    let ct = state.shutdown.child_token();
    let assembled = handler
        .get_block(slot, want_meta, want_rewards, &ct)
        .await
        .map_err(|e| match e {
            Error::NotFound(_) => RpcError::slot_skipped(slot),
            other => RpcError::from(other),
        })?;

    let mut result = render_block(&assembled, encoding, details, max_version)?;

    // Genesis overrides for an archived slot 0: the chain's first block has
    // itself as parent.
    if slot == 0 {
        if let Some(genesis) = handler.genesis() {
            result["blockTime"] = json!(genesis.creation_time);
        }
        result["blockHeight"] = json!(0);
        result["previousBlockhash"] = result["blockhash"].clone();
    }

    Ok((result, Some(root)))
}

pub(crate) fn render_block(
    assembled: &AssembledBlock,
    encoding: UiEncoding,
    details: TransactionDetails,
    max_version: Option<u64>,
) -> Result<Value, RpcError> {
    let mut result = json!({
        "blockhash": assembled.blockhash,
        "parentSlot": assembled.block.meta.parent_slot,
        "blockTime": match assembled.block.meta.blocktime {
            0 => Value::Null,
            t => json!(t),
        },
        "blockHeight": assembled.block.meta.block_height,
        "rewards": assembled
            .rewards
            .as_ref()
            .map_or_else(|| json!([]), encoding::rewards_to_json),
    });
    if let Some(previous) = &assembled.previous_blockhash {
        result["previousBlockhash"] = json!(previous);
    }

    match details {
        TransactionDetails::None => {}
        TransactionDetails::Signatures => {
            let signatures: Vec<String> = assembled
                .transactions
                .iter()
                .map(|tx| tx.signature().map(|s| s.to_string()))
                .collect::<Result<_, _>>()
                .map_err(RpcError::from)?;
            result["signatures"] = json!(signatures);
        }
        TransactionDetails::Full => {
            let mut rendered = Vec::with_capacity(assembled.transactions.len());
            for tx in &assembled.transactions {
                let version = tx.parsed.message.version();
                check_transaction_version(version, max_version)?;
                let mut entry = json!({
                    "transaction": encoding::encode_transaction_payload(
                        &tx.raw,
                        &tx.parsed,
                        encoding,
                    )
                    .map_err(|e| RpcError::invalid_params(e.to_string()))?,
                    "meta": match &tx.meta {
                        Some(meta) => encoding::meta_to_json(meta)
                            .map_err(|e| RpcError::internal(e.to_string()))?,
                        None => Value::Null,
                    },
                });
                if max_version.is_some() {
                    entry["version"] = version_json(version);
                }
                rendered.push(entry);
            }
            result["transactions"] = Value::Array(rendered);
        }
    }
    Ok(result)
}
