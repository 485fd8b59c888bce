// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! End-to-end serving over a synthetic epoch: archive + sealed indexes in,
//! node-compatible responses out.

mod common;

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use chronicle::cache::NodeCache;
use chronicle::epoch::{EpochConfig, EpochHandler};
use chronicle::multi_epoch::{MultiEpoch, ServeOptions};
use chronicle::rpc::{methods, RpcState};
use chronicle::solana::Signature;

const GENESIS_TIME: i64 = 1_584_368_940;

async fn fixture_state(dir: &std::path::Path) -> (Arc<RpcState>, cid::Cid) {
    let blocks = common::default_blocks(GENESIS_TIME);
    let (config_path, root) = common::build_epoch_dir(dir, 0, &blocks, Some(GENESIS_TIME)).await;

    let cache = Arc::new(NodeCache::default());
    let config = EpochConfig::load(&config_path).unwrap();
    let handler = EpochHandler::open(
        config,
        Some(config_path),
        cache.clone(),
        &dir.join("cache"),
    )
    .await
    .unwrap();

    let multi = Arc::new(MultiEpoch::new(ServeOptions::default(), None, cache));
    multi.add_or_replace(Arc::new(handler));
    let state = Arc::new(RpcState {
        multi,
        proxy: None,
        shutdown: CancellationToken::new(),
    });
    (state, root)
}

#[tokio::test(flavor = "multi_thread")]
async fn get_block_assembles_in_position_order() {
    let dir = tempfile::tempdir().unwrap();
    let (state, root) = fixture_state(dir.path()).await;

    let (result, served_by) = methods::get_block(&state, &json!([1, {"encoding": "json"}]))
        .await
        .unwrap();
    assert_eq!(served_by, Some(root));
    assert_eq!(result["parentSlot"], json!(0));
    assert_eq!(result["blockTime"], json!(GENESIS_TIME + 1));
    let txs = result["transactions"].as_array().unwrap();
    assert_eq!(txs.len(), 3);
    // Position order is the write order of the fixture.
    for (i, tx) in txs.iter().enumerate() {
        let sigs = tx["transaction"]["signatures"].as_array().unwrap();
        let expected = Signature([i as u8 + 1; 64]).to_string();
        assert_eq!(sigs[0], json!(expected));
    }
    // The chained meta decodes like the inline ones.
    assert_eq!(txs[1]["meta"]["fee"], json!(5000));
    assert_eq!(txs[1]["meta"]["status"], json!({"Ok": null}));
    assert_eq!(txs[2]["meta"], Value::Null);
    assert_eq!(result["rewards"], json!([]));
    assert!(result["blockhash"].is_string());
}

#[tokio::test(flavor = "multi_thread")]
async fn previous_blockhash_comes_from_the_parent() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _) = fixture_state(dir.path()).await;

    let (block1, _) = methods::get_block(&state, &json!([1])).await.unwrap();
    let (block2, _) = methods::get_block(&state, &json!([2])).await.unwrap();
    assert_eq!(block2["previousBlockhash"], block1["blockhash"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn skipped_slot_is_a_skipped_slot_error() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _) = fixture_state(dir.path()).await;

    let err = methods::get_block(&state, &json!([3])).await.unwrap_err();
    assert_eq!(err.code, chronicle::rpc::error::LONG_TERM_STORAGE_SLOT_SKIPPED);

    // An epoch that is not loaded at all reports the same way.
    let err = methods::get_block(&state, &json!([432_000 * 5])).await.unwrap_err();
    assert_eq!(err.code, chronicle::rpc::error::LONG_TERM_STORAGE_SLOT_SKIPPED);
}

#[tokio::test(flavor = "multi_thread")]
async fn slot_zero_synthesises_from_genesis() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _) = fixture_state(dir.path()).await;

    let (result, _) = methods::get_block(&state, &json!([0, {"encoding": "json"}]))
        .await
        .unwrap();
    assert_eq!(result["parentSlot"], json!(0));
    assert_eq!(result["blockHeight"], json!(0));
    assert_eq!(result["blockTime"], json!(GENESIS_TIME));
    assert_eq!(result["transactions"], json!([]));
    assert_eq!(result["rewards"], json!([]));
    assert_eq!(result["previousBlockhash"], result["blockhash"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn get_transaction_finds_the_epoch_and_encodes_base64() {
    let dir = tempfile::tempdir().unwrap();
    let (state, root) = fixture_state(dir.path()).await;

    let signature = Signature([4u8; 64]).to_string();
    let (result, served_by) = methods::get_transaction(&state, &json!([signature]))
        .await
        .unwrap();
    assert_eq!(served_by, Some(root));
    assert_eq!(result["slot"], json!(2));
    assert_eq!(result["blockTime"], json!(GENESIS_TIME + 2));
    assert_eq!(result["transaction"][1], json!("base64"));
    assert_eq!(result["meta"]["status"], json!({"Ok": null}));
    assert_eq!(result["meta"]["err"], Value::Null);

    // Unknown signatures are a null result, not an error.
    let unknown = Signature([200u8; 64]).to_string();
    let (result, _) = methods::get_transaction(&state, &json!([unknown]))
        .await
        .unwrap();
    assert_eq!(result, Value::Null);
}

#[tokio::test(flavor = "multi_thread")]
async fn signatures_for_address_descend_and_respect_limit() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _) = fixture_state(dir.path()).await;

    let voter = common::fixture_voter().to_string();
    let (result, _) = methods::get_signatures_for_address(&state, &json!([voter, {"limit": 3}]))
        .await
        .unwrap();
    let entries = result.as_array().unwrap();
    assert_eq!(entries.len(), 3);
    let slots: Vec<u64> = entries
        .iter()
        .map(|e| e["slot"].as_u64().unwrap())
        .collect();
    assert_eq!(slots, vec![100, 90, 80]);
    for entry in entries {
        assert_eq!(entry["confirmationStatus"], json!("finalized"));
        assert_eq!(entry["err"], Value::Null);
        assert!(entry["blockTime"].as_i64().is_some());
        assert!(entry["signature"].is_string());
    }

    // Out-of-range limits coerce to the maximum instead of failing.
    let (result, _) = methods::get_signatures_for_address(
        &state,
        &json!([common::fixture_voter().to_string(), {"limit": 5000}]),
    )
    .await
    .unwrap();
    assert_eq!(result.as_array().unwrap().len(), 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn block_time_and_genesis_methods() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _) = fixture_state(dir.path()).await;

    let (time, _) = methods::get_block_time(&state, &json!([70])).await.unwrap();
    assert_eq!(time, json!(GENESIS_TIME + 70));
    let (missing, _) = methods::get_block_time(&state, &json!([3])).await.unwrap();
    assert_eq!(missing, Value::Null);
    let (zero, _) = methods::get_block_time(&state, &json!([0])).await.unwrap();
    assert_eq!(zero, json!(GENESIS_TIME));

    let (hash, _) = methods::get_genesis_hash(&state).await.unwrap();
    assert_eq!(hash, json!(bs58::encode([7u8; 32]).into_string()));

    let (version, _) = methods::get_version(&state).unwrap();
    assert_eq!(version["solana-core"], json!("2.0.15"));
    assert_eq!(version["faithful"]["epochs"], json!([0]));
}

#[tokio::test(flavor = "multi_thread")]
async fn handler_serves_typed_fetches_and_capped_reads() {
    let dir = tempfile::tempdir().unwrap();
    let blocks = common::default_blocks(GENESIS_TIME);
    let (config_path, root) = common::build_epoch_dir(dir.path(), 0, &blocks, None).await;
    let cache = Arc::new(NodeCache::default());
    let handler = EpochHandler::open(
        EpochConfig::load(&config_path).unwrap(),
        None,
        cache,
        &dir.path().join("cache"),
    )
    .await
    .unwrap();

    assert_eq!(handler.root(), root);
    let block_cid = handler.find_cid_from_slot(2).unwrap();
    let os = handler.find_offset_and_size_from_cid(&block_cid).unwrap();
    let raw = handler
        .read_at_from_car(os.offset, u64::from(os.size))
        .await
        .unwrap();
    assert_eq!(raw.len(), os.size as usize);
    let (cid, _bytes) = handler
        .get_node_by_offset_and_size(os.offset, os.size)
        .await
        .unwrap();
    assert_eq!(cid, block_cid);
    assert!(handler.find_cid_from_slot(7).is_err());

    let signature = Signature([1u8; 64]);
    assert!(handler.contains_signature(&signature));
    assert!(!handler.contains_signature(&Signature([99u8; 64])));
    let (node, _) = handler.get_transaction_node(&signature).await.unwrap();
    assert_eq!(node.slot, 1);
}
