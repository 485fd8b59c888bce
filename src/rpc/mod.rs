// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The JSON-RPC listener: POST-only JSON-RPC 2.0 over HTTP with a 1 KiB
//! request cap, a `DAG-Root-CID` response header naming the archive that
//! served the request, a `/metrics` route, and optional transparent
//! proxying of unknown methods to an upstream.

pub mod error;
pub mod methods;
pub mod stream;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use cid::Cid;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn, Instrument};

use crate::metrics::{metrics, MethodLabels, StatusLabels};
use crate::multi_epoch::MultiEpoch;
use error::RpcError;

/// Request bodies above this are rejected with 413.
pub const MAX_BODY_BYTES: usize = 1024;

pub const DAG_ROOT_CID_HEADER: &str = "DAG-Root-CID";

pub struct RpcState {
    pub multi: Arc<MultiEpoch>,
    /// Upstream URL for unknown-method proxying.
    pub proxy: Option<String>,
    pub shutdown: CancellationToken,
}

pub fn router(state: Arc<RpcState>) -> Router {
    Router::new()
        .route("/", any(handle_root))
        .route("/metrics", any(handle_metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(
    state: Arc<RpcState>,
    addr: SocketAddr,
    ct: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "json-rpc listener up");
    serve_on(state, listener, ct).await
}

/// Serve on an already-bound listener; tests use this with port 0.
pub async fn serve_on(
    state: Arc<RpcState>,
    listener: tokio::net::TcpListener,
    ct: CancellationToken,
) -> anyhow::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled_owned().await })
        .await?;
    Ok(())
}

async fn handle_metrics(method: Method) -> Response {
    if method != Method::GET {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        crate::metrics::encode(),
    )
        .into_response()
}

#[derive(Debug, serde::Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

async fn handle_root(
    State(state): State<Arc<RpcState>>,
    request: axum::extract::Request,
) -> Response {
    if request.method() != Method::POST {
        return envelope_error(
            StatusCode::METHOD_NOT_ALLOWED,
            Value::Null,
            RpcError::method_not_found(request.method().as_str()),
        );
    }
    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(_) => {
            return envelope_error(
                StatusCode::PAYLOAD_TOO_LARGE,
                Value::Null,
                RpcError::invalid_request(format!(
                    "request body exceeds {MAX_BODY_BYTES} bytes"
                )),
            );
        }
    };
    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(e) => {
            return envelope_error(
                StatusCode::OK,
                Value::Null,
                RpcError::parse_error(e.to_string()),
            );
        }
    };

    let request_id: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    let span = info_span!("rpc", id = %request_id, method = %request.method);
    dispatch(state, request, &body).instrument(span).await
}

async fn dispatch(state: Arc<RpcState>, request: RpcRequest, raw_body: &[u8]) -> Response {
    metrics()
        .rpc_requests
        .get_or_create(&MethodLabels {
            method: request.method.clone(),
        })
        .inc();

    let outcome = match request.method.as_str() {
        "getBlock" => methods::get_block(&state, &request.params).await,
        "getTransaction" => methods::get_transaction(&state, &request.params).await,
        "getBlockTime" => methods::get_block_time(&state, &request.params).await,
        "getSignaturesForAddress" => {
            methods::get_signatures_for_address(&state, &request.params).await
        }
        "getGenesisHash" => methods::get_genesis_hash(&state).await,
        "getVersion" => methods::get_version(&state),
        other => {
            if let Some(upstream) = &state.proxy {
                return proxy(upstream, raw_body).await;
            }
            return envelope_error(
                StatusCode::NOT_FOUND,
                request.id,
                RpcError::method_not_found(other),
            );
        }
    };

    let status_label = match &outcome {
        Ok(_) => "ok".to_owned(),
        Err(e) => e.code.to_string(),
    };
    metrics()
        .rpc_responses
        .get_or_create(&StatusLabels {
            method: request.method.clone(),
            status: status_label,
        })
        .inc();

    match outcome {
        Ok((result, served_by)) => {
            let payload = json!({"jsonrpc": "2.0", "id": request.id, "result": result});
            json_response(StatusCode::OK, &payload, served_by)
        }
        Err(e) => {
            if e.code == error::INTERNAL_ERROR {
                warn!(method = %request.method, error = %e, "request failed");
            }
            envelope_error(StatusCode::OK, request.id, e)
        }
    }
}

async fn proxy(upstream: &str, body: &[u8]) -> Response {
    let client = reqwest::Client::new();
    let upstream_response = client
        .post(upstream)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body.to_vec())
        .timeout(std::time::Duration::from_secs(30))
        .send()
        .await;
    match upstream_response {
        Ok(resp) => {
            let status =
                StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
            match resp.bytes().await {
                Ok(bytes) => {
                    let mut response = Response::new(Body::from(bytes));
                    *response.status_mut() = status;
                    response.headers_mut().insert(
                        header::CONTENT_TYPE,
                        HeaderValue::from_static("application/json"),
                    );
                    response
                }
                Err(e) => {
                    envelope_error(
                        StatusCode::BAD_GATEWAY,
                        Value::Null,
                        RpcError::internal(format!("proxy read: {e}")),
                    )
                }
            }
        }
        Err(e) => envelope_error(
            StatusCode::BAD_GATEWAY,
            Value::Null,
            RpcError::internal(format!("proxy: {e}")),
        ),
    }
}

fn json_response(status: StatusCode, payload: &Value, served_by: Option<Cid>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if let Some(root) = served_by {
        if let Ok(value) = HeaderValue::from_str(&root.to_string()) {
            headers.insert(DAG_ROOT_CID_HEADER, value);
        }
    }
    let body = serde_json::to_vec(payload).unwrap_or_else(|_| b"{}".to_vec());
    (status, headers, body).into_response()
}

fn envelope_error(status: StatusCode, id: Value, error: RpcError) -> Response {
    let payload = json!({"jsonrpc": "2.0", "id": id, "error": error.to_json()});
    json_response(status, &payload, None)
}
