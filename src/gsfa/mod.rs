// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The getSignaturesForAddress reverse index.
//!
//! Per epoch: an append-only log of record batches, one singly-linked list
//! per address, newest batch last; plus a hash index from address to the
//! head pointer. Traversing back-links therefore yields an address's
//! transactions in descending slot order, and stacking per-epoch readers
//! newest-first extends that order across the whole ledger. Each record
//! carries the transaction signature next to its archive pointer, so
//! signature-scoped scans resolve from the log without archive reads.

mod linkedlog;
mod multi;
mod reader;
mod writer;

pub use linkedlog::{LogBatch, LogPtr, LogRecord};
pub use multi::{
    collect_signatures_for_address, GsfaHit, GsfaQuery, TxFilter, GSFA_EPOCH_DEADLINE,
};
pub use reader::GsfaReader;
pub use writer::GsfaWriter;

/// File names inside a GSFA index directory.
pub const HEADS_FILE: &str = "heads.index";
pub const LOG_FILE: &str = "records.log";

#[derive(Debug, thiserror::Error)]
pub enum GsfaError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("log offset {0} does not fit in 48 bits")]
    OffsetRange(u64),
    #[error("batch of {0} records does not fit a 16-bit size")]
    BatchTooLarge(usize),
    #[error("corrupt gsfa index: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Index(#[from] crate::index::IndexError),
}
