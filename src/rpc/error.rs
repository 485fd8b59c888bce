// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! JSON-RPC error codes and the mapping from the internal taxonomy.

use serde_json::{json, Value};

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
/// Upstream's "slot was skipped, or missing in long-term storage".
pub const LONG_TERM_STORAGE_SLOT_SKIPPED: i64 = -32009;
/// Upstream's "transaction version not supported by the requesting client".
pub const UNSUPPORTED_TRANSACTION_VERSION: i64 = -32015;

#[derive(Debug, Clone)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }

    pub fn slot_skipped(slot: u64) -> Self {
        Self::new(
            LONG_TERM_STORAGE_SLOT_SKIPPED,
            format!("Slot {slot} was skipped, or missing in long-term storage"),
        )
    }

    pub fn unsupported_transaction_version(version: u8) -> Self {
        Self::new(
            UNSUPPORTED_TRANSACTION_VERSION,
            format!(
                "Transaction version ({version}) is not supported by the requesting client. \
                 Please try the request again with the following configuration parameter: \
                 \"maxSupportedTransactionVersion\": {version}"
            ),
        )
    }

    pub fn to_json(&self) -> Value {
        json!({"code": self.code, "message": self.message})
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for RpcError {}

impl From<crate::Error> for RpcError {
    fn from(e: crate::Error) -> Self {
        match &e {
            crate::Error::InvalidParams(msg) => Self::invalid_params(msg.clone()),
            crate::Error::NotFound(msg) => Self::new(LONG_TERM_STORAGE_SLOT_SKIPPED, msg.clone()),
            // Unavailable is INTERNAL at the wire but logged distinctly by
            // the dispatcher.
            crate::Error::Unavailable(msg) => Self::internal(msg.clone()),
            crate::Error::Internal(msg) => Self::internal(msg.clone()),
            crate::Error::Cancelled => Self::internal("request cancelled"),
            crate::Error::DeadlineExceeded => Self::internal("deadline exceeded"),
        }
    }
}

impl From<RpcError> for jsonrpsee::types::ErrorObjectOwned {
    fn from(e: RpcError) -> Self {
        jsonrpsee::types::ErrorObject::owned(e.code as i32, e.message, None::<Value>)
    }
}
