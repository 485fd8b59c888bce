// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The HTTP envelope: POST-only, 1 KiB body cap, JSON-RPC 2.0 framing and
//! the DAG-Root-CID response header.

mod common;

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use chronicle::cache::NodeCache;
use chronicle::epoch::{EpochConfig, EpochHandler};
use chronicle::multi_epoch::{MultiEpoch, ServeOptions};
use chronicle::rpc::{self, RpcState};

async fn spawn_server(dir: &std::path::Path) -> (String, cid::Cid, CancellationToken) {
    let blocks = common::default_blocks(1_700_000_000);
    let (config_path, root) = common::build_epoch_dir(dir, 0, &blocks, None).await;
    let cache = Arc::new(NodeCache::default());
    let handler = EpochHandler::open(
        EpochConfig::load(&config_path).unwrap(),
        Some(config_path),
        cache.clone(),
        &dir.join("cache"),
    )
    .await
    .unwrap();
    let multi = Arc::new(MultiEpoch::new(ServeOptions::default(), None, cache));
    multi.add_or_replace(Arc::new(handler));

    let ct = CancellationToken::new();
    let state = Arc::new(RpcState {
        multi,
        proxy: None,
        shutdown: ct.clone(),
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_ct = ct.clone();
    tokio::spawn(async move {
        rpc::serve_on(state, listener, server_ct).await.unwrap();
    });
    (format!("http://{addr}"), root, ct)
}

#[tokio::test(flavor = "multi_thread")]
async fn post_round_trip_sets_dag_root_header() {
    let dir = tempfile::tempdir().unwrap();
    let (url, root, ct) = spawn_server(dir.path()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(&url)
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "getBlockTime", "params": [70]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()
            .get("DAG-Root-CID")
            .and_then(|v| v.to_str().ok()),
        Some(root.to_string().as_str())
    );
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["jsonrpc"], json!("2.0"));
    assert_eq!(body["id"], json!(1));
    assert_eq!(body["result"], json!(1_700_000_070));
    ct.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn non_post_is_405_with_method_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (url, _root, ct) = spawn_server(dir.path()).await;
    let resp = reqwest::Client::new().get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 405);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], json!(-32601));
    ct.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_body_is_413_with_invalid_request() {
    let dir = tempfile::tempdir().unwrap();
    let (url, _root, ct) = spawn_server(dir.path()).await;
    let padding = "x".repeat(2048);
    let resp = reqwest::Client::new()
        .post(&url)
        .header("Content-Type", "application/json")
        .body(format!(
            "{{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"getVersion\",\"params\":[\"{padding}\"]}}"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 413);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], json!(-32600));
    ct.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_method_without_proxy_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let (url, _root, ct) = spawn_server(dir.path()).await;
    let resp = reqwest::Client::new()
        .post(&url)
        .json(&json!({"jsonrpc": "2.0", "id": 7, "method": "getSlot", "params": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], json!(-32601));
    ct.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn garbage_body_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let (url, _root, ct) = spawn_server(dir.path()).await;
    let resp = reqwest::Client::new()
        .post(&url)
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], json!(-32700));
    ct.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn metrics_endpoint_exposes_the_registry() {
    let dir = tempfile::tempdir().unwrap();
    let (url, _root, ct) = spawn_server(dir.path()).await;
    let text = reqwest::Client::new()
        .get(format!("{url}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.contains("chronicle_"), "got: {text}");
    ct.cancel();
}
