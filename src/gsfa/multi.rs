// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::future::Future;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use super::linkedlog::LogRecord;
use super::GsfaReader;
use crate::epoch::TransactionWithMeta;
use crate::error::{Error, Result};
use crate::solana::{Pubkey, Signature};

/// Deadline for walking one epoch's log on behalf of one address.
pub const GSFA_EPOCH_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default)]
pub struct GsfaQuery {
    pub limit: usize,
    /// Start strictly after this signature (exclusive).
    pub before: Option<Signature>,
    /// Stop at this signature (inclusive).
    pub until: Option<Signature>,
    /// Restrict to slots in this range; batches entirely below it end the
    /// walk early.
    pub slot_range: Option<RangeInclusive<u64>>,
}

/// Structural transaction predicate: vote-ness, failure, and account sets.
/// Transactions failing it are skipped without counting against the limit.
#[derive(Debug, Clone, Default)]
pub struct TxFilter {
    pub vote: Option<bool>,
    pub failed: Option<bool>,
    pub account_include: Vec<Pubkey>,
    pub account_exclude: Vec<Pubkey>,
    pub account_required: Vec<Pubkey>,
}

impl TxFilter {
    pub fn is_empty(&self) -> bool {
        self.vote.is_none()
            && self.failed.is_none()
            && self.account_include.is_empty()
            && self.account_exclude.is_empty()
            && self.account_required.is_empty()
    }

    pub fn matches(&self, tx: &TransactionWithMeta) -> Result<bool> {
        if let Some(want_vote) = self.vote {
            if tx.parsed.is_vote() != want_vote {
                return Ok(false);
            }
        }
        if let Some(want_failed) = self.failed {
            let failed = match &tx.meta {
                Some(meta) => meta.is_failed()?,
                None => false,
            };
            if failed != want_failed {
                return Ok(false);
            }
        }
        if self.account_include.is_empty()
            && self.account_exclude.is_empty()
            && self.account_required.is_empty()
        {
            return Ok(true);
        }
        let involved = involved_accounts(tx);
        if !self.account_include.is_empty()
            && !self.account_include.iter().any(|k| involved.contains(k))
        {
            return Ok(false);
        }
        if self.account_exclude.iter().any(|k| involved.contains(k)) {
            return Ok(false);
        }
        if !self.account_required.iter().all(|k| involved.contains(k)) {
            return Ok(false);
        }
        Ok(true)
    }
}

/// Static account keys plus the addresses the meta loaded through lookup
/// tables.
pub fn involved_accounts(tx: &TransactionWithMeta) -> Vec<Pubkey> {
    let mut keys: Vec<Pubkey> = tx.parsed.message.static_account_keys().to_vec();
    if let Some(meta) = &tx.meta {
        let (writable, readonly) = meta.loaded_addresses();
        keys.extend(writable);
        keys.extend(readonly);
    }
    keys
}

/// One hit from the reverse index: everything the log record itself knows,
/// plus the resolved transaction when the query asked for one.
#[derive(Debug, Clone)]
pub struct GsfaHit {
    pub epoch: u64,
    pub signature: Signature,
    pub slot: u64,
    pub record: LogRecord,
    pub tx: Option<TransactionWithMeta>,
}

struct WalkState {
    out: Vec<GsfaHit>,
    skipping: bool,
    done: bool,
}

/// Collect an address's transactions in descending slot order across
/// epochs. `readers` must be sorted by epoch descending.
///
/// The log records carry signatures, so `before`/`until` scanning never
/// touches the archive: records discarded while looking for `before` are
/// judged from the log alone. A record that survives is materialised
/// through `fetch` only when `materialize` is set or a predicate needs the
/// decoded transaction; signature-only listings run entirely off the log.
pub async fn collect_signatures_for_address<F, Fut>(
    readers: &[Arc<GsfaReader>],
    address: &Pubkey,
    query: &GsfaQuery,
    filter: Option<&TxFilter>,
    materialize: bool,
    fetch: F,
) -> Result<Vec<GsfaHit>>
where
    F: Fn(u64, LogRecord) -> Fut,
    Fut: Future<Output = Result<TransactionWithMeta>>,
{
    let mut state = WalkState {
        out: Vec::with_capacity(query.limit.min(1024)),
        skipping: query.before.is_some(),
        done: false,
    };
    for reader in readers {
        if state.done {
            break;
        }
        if let Some(range) = &query.slot_range {
            let (first, last) = crate::epoch::epoch_limits(reader.epoch());
            if *range.start() > last || *range.end() < first {
                continue;
            }
        }
        tokio::time::timeout(
            GSFA_EPOCH_DEADLINE,
            walk_epoch(reader, address, query, filter, materialize, &fetch, &mut state),
        )
        .await
        .map_err(|_| Error::DeadlineExceeded)??;
    }
    Ok(state.out)
}

async fn walk_epoch<F, Fut>(
    reader: &Arc<GsfaReader>,
    address: &Pubkey,
    query: &GsfaQuery,
    filter: Option<&TxFilter>,
    materialize: bool,
    fetch: &F,
    state: &mut WalkState,
) -> Result<()>
where
    F: Fn(u64, LogRecord) -> Fut,
    Fut: Future<Output = Result<TransactionWithMeta>>,
{
    let Some(mut ptr) = reader.head(address) else {
        return Ok(());
    };
    loop {
        let batch = reader.batch(ptr).map_err(Error::from)?;
        if let Some(range) = &query.slot_range {
            // Records are ascending within a batch; if even the newest is
            // below the range, every older batch is too.
            let batch_max = batch.records.last().map_or(0, |r| r.slot);
            if batch_max < *range.start() {
                return Ok(());
            }
        }
        for record in batch.records.iter().rev() {
            if state.done {
                return Ok(());
            }
            if let Some(range) = &query.slot_range {
                if record.slot > *range.end() {
                    continue;
                }
                if record.slot < *range.start() {
                    return Ok(());
                }
            }
            let signature = Signature(record.signature);
            if state.skipping {
                // The stored signature answers this; no archive fetch for
                // records above the `before` mark.
                if query.before == Some(signature) {
                    state.skipping = false;
                }
                continue;
            }
            let is_until = query.until == Some(signature);
            let tx = if materialize || filter.is_some() {
                Some(fetch(reader.epoch(), *record).await?)
            } else {
                None
            };
            let keep = match (filter, &tx) {
                (Some(f), Some(tx)) => f.matches(tx)?,
                _ => true,
            };
            if keep {
                state.out.push(GsfaHit {
                    epoch: reader.epoch(),
                    signature,
                    slot: record.slot,
                    record: *record,
                    tx,
                });
                if state.out.len() >= query.limit {
                    state.done = true;
                }
            }
            if is_until {
                state.done = true;
            }
        }
        if batch.prev.is_none() {
            return Ok(());
        }
        ptr = batch.prev;
    }
}
