// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use serde_json::{json, Value};

use super::{required_u64, MethodResult};
use crate::rpc::error::RpcError;
use crate::rpc::RpcState;
use crate::version;

pub async fn get_block_time(state: &RpcState, params: &Value) -> MethodResult {
    let slot = required_u64(params, 0, "slot")?;
    let Ok(handler) = state.multi.handler_for_slot(slot) else {
        return Ok((Value::Null, None));
    };
    let root = handler.root();
    if slot == 0 {
        if let Some(genesis) = handler.genesis() {
            return Ok((json!(genesis.creation_time), Some(root)));
        }
    }
    // Blocktimes come from the index or nowhere; they are never recomputed.
    match handler.get_blocktime(slot) {
        Ok(time) => Ok((json!(time), Some(root))),
        Err(_) => Ok((Value::Null, Some(root))),
    }
}

pub async fn get_genesis_hash(state: &RpcState) -> MethodResult {
    let handler = state
        .multi
        .get_epoch(0)
        .ok_or_else(|| RpcError::new(crate::rpc::error::LONG_TERM_STORAGE_SLOT_SKIPPED,
            "epoch 0 is not loaded"))?;
    let genesis = handler.genesis().ok_or_else(|| {
        RpcError::new(
            crate::rpc::error::LONG_TERM_STORAGE_SLOT_SKIPPED,
            "epoch 0 carries no genesis manifest",
        )
    })?;
    Ok((json!(genesis.hash), Some(handler.root())))
}

pub fn get_version(state: &RpcState) -> MethodResult {
    let epochs = state.multi.epoch_numbers();
    let result = json!({
        "solana-core": version::SOLANA_CORE_VERSION,
        "feature-set": version::FEATURE_SET,
        "faithful": {
            "version": version::CHRONICLE_VERSION,
            "commit": version::GIT_COMMIT,
            "epochs": epochs,
        },
    });
    Ok((result, None))
}
