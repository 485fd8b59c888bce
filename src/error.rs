// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::io;

/// Request-level error taxonomy. Subsystem errors converge into these five
/// classes before they reach a wire listener; only [`Error::NotFound`] may
/// translate into a `null` JSON-RPC result, everything else is an error
/// response.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid params: {0}")]
    InvalidParams(String),
    /// The semantic key (slot, signature, epoch) is not in any index.
    #[error("not found: {0}")]
    NotFound(String),
    /// An archive piece or remote source cannot be reached right now.
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// Index or archive integrity failure, decode failure, hash mismatch.
    #[error("internal: {0}")]
    Internal(String),
    #[error("request cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl Error {
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<crate::car::CarError> for Error {
    fn from(e: crate::car::CarError) -> Self {
        match e {
            crate::car::CarError::PieceUnavailable(_) => Self::Unavailable(e.to_string()),
            _ => Self::Internal(e.to_string()),
        }
    }
}

impl From<crate::dag::NodeError> for Error {
    fn from(e: crate::dag::NodeError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<crate::index::IndexError> for Error {
    fn from(e: crate::index::IndexError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<crate::gsfa::GsfaError> for Error {
    fn from(e: crate::gsfa::GsfaError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<crate::solana::SolanaError> for Error {
    fn from(e: crate::solana::SolanaError) -> Self {
        Self::Internal(e.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
