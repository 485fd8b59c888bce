// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Chronicle serves historical Solana ledger data out of immutable,
//! content-addressed epoch archives (CAR files) and the sealed index files
//! produced alongside them. It exposes the node-compatible `getBlock`,
//! `getTransaction`, `getBlockTime` and `getSignaturesForAddress` JSON-RPC
//! methods, plus a streaming listener for `streamBlocks` and
//! `streamTransactions`.
//!
//! The crate is organised leaves-first:
//! - [`car`] reads CAR containers, stitched split pieces included.
//! - [`dag`] decodes the archive node kinds and reassembles DataFrame chains.
//! - [`index`] is the sealed on-disk index family.
//! - [`gsfa`] is the per-address reverse index.
//! - [`epoch`] owns one epoch's archive, indexes and caches.
//! - [`multi_epoch`] routes requests across the loaded epochs.
//! - [`rpc`] is the wire layer.

pub mod cache;
pub mod car;
pub mod cli;
pub mod dag;
pub mod epoch;
pub mod error;
pub mod fetch;
pub mod gsfa;
pub mod index;
pub mod metrics;
pub mod multi_epoch;
pub mod rpc;
pub mod solana;
pub mod version;
pub mod watch;

pub use error::Error;
