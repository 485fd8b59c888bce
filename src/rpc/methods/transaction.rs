// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use serde_json::{json, Value};

use super::{
    check_transaction_version, options_at, parse_commitment, parse_encoding, required_str,
    version_json, MethodResult,
};
use crate::error::Error;
use crate::rpc::error::RpcError;
use crate::rpc::RpcState;
use crate::solana::encoding::{self, UiEncoding};
use crate::solana::Signature;

pub async fn get_transaction(state: &RpcState, params: &Value) -> MethodResult {
    let signature: Signature = required_str(params, 0, "signature")?
        .parse()
        .map_err(|e| RpcError::invalid_params(format!("signature: {e}")))?;
    let options = options_at(params, 1);
    parse_commitment(options)?;
    let encoding = match options.get("encoding") {
        // getTransaction historically defaults to base64 framing here.
        None | Some(Value::Null) => UiEncoding::Base64,
        _ => parse_encoding(options)?,
    };
    let max_version = options
        .get("maxSupportedTransactionVersion")
        .and_then(Value::as_u64);

    // A signature nobody knows is a null result, not an error.
    let handler = match state.multi.find_epoch_for_signature(&signature).await {
        Ok(handler) => handler,
        Err(Error::NotFound(_)) => return Ok((Value::Null, None)),
        Err(e) => return Err(e.into()),
    };
    let root = handler.root();

    let (node, _cid) = match handler.get_transaction_node(&signature).await {
        Ok(found) => found,
        Err(Error::NotFound(_)) => return Ok((Value::Null, Some(root))),
        Err(e) => return Err(e.into()),
    };
    let resolved = handler.resolve_transaction(node, true).await?;

    let version = resolved.parsed.message.version();
    check_transaction_version(version, max_version)?;

    let block_time = handler.get_blocktime(resolved.slot).ok();
    let mut result = json!({
        "slot": resolved.slot,
        "blockTime": block_time,
        "transaction": encoding::encode_transaction_payload(
            &resolved.raw,
            &resolved.parsed,
            encoding,
        )
        .map_err(|e| RpcError::invalid_params(e.to_string()))?,
        "meta": match &resolved.meta {
            Some(meta) => encoding::meta_to_json(meta)
                .map_err(|e| RpcError::internal(e.to_string()))?,
            None => Value::Null,
        },
    });
    if max_version.is_some() {
        result["version"] = version_json(version);
    }
    Ok((result, Some(root)))
}
