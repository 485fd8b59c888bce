// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Method handlers. Each returns the JSON result plus the root CID of the
//! archive that served it, which the HTTP layer exposes as `DAG-Root-CID`.

mod block;
mod misc;
mod signatures;
mod transaction;

pub use block::get_block;
pub(crate) use block::{render_block, TransactionDetails};
pub use misc::{get_block_time, get_genesis_hash, get_version};
pub use signatures::get_signatures_for_address;
pub(crate) use signatures::materialize_record;
pub use transaction::get_transaction;

use cid::Cid;
use serde_json::Value;

use super::error::RpcError;
use crate::solana::encoding::UiEncoding;

/// Result plus the serving archive's root, when one epoch served it.
pub type MethodResult = Result<(Value, Option<Cid>), RpcError>;

pub(crate) fn param_at(params: &Value, index: usize) -> Option<&Value> {
    params.as_array().and_then(|a| a.get(index))
}

pub(crate) fn required_u64(params: &Value, index: usize, what: &str) -> Result<u64, RpcError> {
    param_at(params, index)
        .and_then(Value::as_u64)
        .ok_or_else(|| RpcError::invalid_params(format!("expected {what} at position {index}")))
}

pub(crate) fn required_str<'a>(
    params: &'a Value,
    index: usize,
    what: &str,
) -> Result<&'a str, RpcError> {
    param_at(params, index)
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_params(format!("expected {what} at position {index}")))
}

pub(crate) fn options_at(params: &Value, index: usize) -> &Value {
    param_at(params, index).unwrap_or(&Value::Null)
}

pub(crate) fn parse_encoding(options: &Value) -> Result<UiEncoding, RpcError> {
    match options.get("encoding") {
        None | Some(Value::Null) => Ok(UiEncoding::Json),
        Some(Value::String(name)) => UiEncoding::from_str(name)
            .ok_or_else(|| RpcError::invalid_params(format!("unsupported encoding: {name}"))),
        Some(other) => Err(RpcError::invalid_params(format!(
            "encoding must be a string, got {other}"
        ))),
    }
}

pub(crate) fn parse_commitment(options: &Value) -> Result<(), RpcError> {
    match options.get("commitment").and_then(Value::as_str) {
        // Historical data is final by definition; anything weaker is
        // accepted and means the same thing.
        None | Some("finalized") | Some("confirmed") | Some("processed") => Ok(()),
        Some(other) => Err(RpcError::invalid_params(format!(
            "unsupported commitment: {other}"
        ))),
    }
}

/// `maxSupportedTransactionVersion` handling shared by getBlock and
/// getTransaction: a versioned transaction is only representable when the
/// caller declared support for its version.
pub(crate) fn check_transaction_version(
    version: Option<u8>,
    max_supported: Option<u64>,
) -> Result<(), RpcError> {
    match version {
        None => Ok(()),
        Some(v) if max_supported.is_some_and(|max| u64::from(v) <= max) => Ok(()),
        Some(v) => Err(RpcError::unsupported_transaction_version(v)),
    }
}

pub(crate) fn version_json(version: Option<u8>) -> Value {
    match version {
        None => Value::String("legacy".into()),
        Some(v) => Value::from(v),
    }
}
