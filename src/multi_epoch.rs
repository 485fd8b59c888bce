// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Directory of epoch handlers and the request routing on top of it.
//!
//! Readers take the directory lock only long enough to clone the `Arc`s
//! they need; the watcher takes the write half for add/replace/remove, so
//! a reload never stalls in-flight requests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::cache::NodeCache;
use crate::epoch::{epoch_of_slot, EpochHandler};
use crate::error::{Error, Result};
use crate::gsfa::GsfaReader;
use crate::index::SigToEpochReader;
use crate::metrics::{metrics, EpochLabels};
use crate::solana::Signature;

#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Serve getSignaturesForAddress from the index alone, skipping the
    /// per-transaction meta enrichment.
    pub gsfa_only_signatures: bool,
    /// Bound on concurrent epoch probes while locating a signature.
    pub epoch_search_concurrency: usize,
    /// Bound on concurrent epoch loads (startup and watcher).
    pub epoch_load_concurrency: usize,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            gsfa_only_signatures: false,
            epoch_search_concurrency: num_cpus::get(),
            epoch_load_concurrency: num_cpus::get(),
        }
    }
}

pub struct MultiEpoch {
    epochs: RwLock<BTreeMap<u64, Arc<EpochHandler>>>,
    sig_to_epoch: Option<SigToEpochReader>,
    options: ServeOptions,
    cache: Arc<NodeCache>,
}

impl MultiEpoch {
    pub fn new(
        options: ServeOptions,
        sig_to_epoch: Option<SigToEpochReader>,
        cache: Arc<NodeCache>,
    ) -> Self {
        Self {
            epochs: RwLock::new(BTreeMap::new()),
            sig_to_epoch,
            options,
            cache,
        }
    }

    pub fn options(&self) -> &ServeOptions {
        &self.options
    }

    pub fn cache(&self) -> &Arc<NodeCache> {
        &self.cache
    }

    pub fn count_epochs(&self) -> usize {
        self.epochs.read().len()
    }

    pub fn epoch_numbers(&self) -> Vec<u64> {
        self.epochs.read().keys().copied().collect()
    }

    pub fn get_epoch(&self, epoch: u64) -> Option<Arc<EpochHandler>> {
        self.epochs.read().get(&epoch).cloned()
    }

    /// Handlers newest-first.
    pub fn epochs_descending(&self) -> Vec<Arc<EpochHandler>> {
        self.epochs.read().values().rev().cloned().collect()
    }

    /// Per-epoch GSFA readers, epoch-descending, for epochs that have one.
    pub fn gsfa_readers_descending(&self) -> Vec<(Arc<EpochHandler>, Arc<GsfaReader>)> {
        self.epochs
            .read()
            .values()
            .rev()
            .filter_map(|h| h.gsfa().map(|g| (h.clone(), g.clone())))
            .collect()
    }

    /// Route a slot to the handler of its epoch.
    pub fn handler_for_slot(&self, slot: u64) -> Result<Arc<EpochHandler>> {
        let epoch = epoch_of_slot(slot);
        self.get_epoch(epoch)
            .ok_or_else(|| Error::not_found(format!("epoch {epoch} is not loaded")))
    }

    /// Add or replace; replacement is remove-then-add under one write lock.
    pub fn add_or_replace(&self, handler: Arc<EpochHandler>) {
        let epoch = handler.epoch();
        let replaced = self.epochs.write().insert(epoch, handler).is_some();
        metrics()
            .epoch_available
            .get_or_create(&EpochLabels { epoch })
            .set(1);
        info!(epoch, replaced, "epoch handler installed");
    }

    pub fn remove(&self, epoch: u64) -> bool {
        let removed = self.epochs.write().remove(&epoch).is_some();
        if removed {
            metrics()
                .epoch_available
                .get_or_create(&EpochLabels { epoch })
                .set(0);
            info!(epoch, "epoch handler removed");
        }
        removed
    }

    /// Remove the handler loaded from `path`, if any. The watcher uses
    /// this on config file deletion.
    pub fn remove_by_config_path(&self, path: &Path) -> Option<u64> {
        let epoch = {
            let epochs = self.epochs.read();
            epochs
                .values()
                .find(|h| h.config_path() == Some(path))
                .map(|h| h.epoch())
        }?;
        self.remove(epoch);
        Some(epoch)
    }

    pub fn config_paths(&self) -> Vec<(u64, PathBuf)> {
        self.epochs
            .read()
            .values()
            .filter_map(|h| Some((h.epoch(), h.config_path()?.to_owned())))
            .collect()
    }

    /// Locate the epoch holding `signature`.
    ///
    /// With a signature-to-epoch index the probe is a single lookup, but a
    /// filter or index positive is never trusted by itself: the epoch's
    /// full signature index confirms before the handler is returned.
    /// Otherwise epochs are probed newest-first with bounded concurrency.
    pub async fn find_epoch_for_signature(
        &self,
        signature: &Signature,
    ) -> Result<Arc<EpochHandler>> {
        if let Some(index) = &self.sig_to_epoch {
            if let Some(epoch) = index.get(signature.as_bytes()) {
                if let Some(handler) = self.get_epoch(epoch) {
                    if handler.contains_signature(signature) {
                        return Ok(handler);
                    }
                    warn!(
                        epoch,
                        %signature,
                        "sig-to-epoch positive not confirmed by the epoch index"
                    );
                } else {
                    return Err(Error::not_found(format!(
                        "signature maps to epoch {epoch}, which is not loaded"
                    )));
                }
            } else {
                return Err(Error::not_found(format!("signature {signature} unknown")));
            }
        }

        let handlers = self.epochs_descending();
        let concurrency = self.options.epoch_search_concurrency.max(1);
        let mut probes = futures::stream::iter(handlers.into_iter().map(|handler| {
            let signature = *signature;
            async move {
                // The filter can say "maybe"; only a confirmed index hit
                // claims the signature.
                handler.contains_signature(&signature).then_some(handler)
            }
        }))
        .buffered(concurrency);
        while let Some(found) = probes.next().await {
            if let Some(handler) = found {
                return Ok(handler);
            }
        }
        Err(Error::not_found(format!("signature {signature} unknown")))
    }
}
