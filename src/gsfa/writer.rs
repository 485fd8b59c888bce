// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::linkedlog::{LogBatch, LogPtr, LogRecord};
use super::{GsfaError, HEADS_FILE, LOG_FILE};
use crate::index::typed::KIND_GSFA_HEADS;
use crate::index::{CompactIndexWriter, IndexMetadata};
use crate::solana::Pubkey;

/// Records buffered per address before a batch is flushed to the log.
const BATCH_FLUSH: usize = 1024;

struct PendingHead {
    head: LogPtr,
    pending: Vec<LogRecord>,
}

/// Write-once builder for one epoch's GSFA index. Push records in
/// ascending slot order (the natural order of a streaming archive pass);
/// batches land in the log newest-last, which is what gives readers
/// descending slot order along the back-links.
pub struct GsfaWriter {
    dir: PathBuf,
    log: BufWriter<File>,
    log_len: u64,
    heads: HashMap<Pubkey, PendingHead>,
    record_count: u64,
}

impl GsfaWriter {
    pub fn create(dir: impl AsRef<Path>) -> Result<Self, GsfaError> {
        let dir = dir.as_ref().to_owned();
        std::fs::create_dir_all(&dir)?;
        let log = BufWriter::new(File::create(dir.join(LOG_FILE))?);
        Ok(Self {
            dir,
            log,
            log_len: 0,
            heads: HashMap::new(),
            record_count: 0,
        })
    }

    pub fn push(&mut self, address: Pubkey, record: LogRecord) -> Result<(), GsfaError> {
        let entry = self.heads.entry(address).or_insert(PendingHead {
            head: LogPtr::none(),
            pending: Vec::new(),
        });
        entry.pending.push(record);
        self.record_count += 1;
        if entry.pending.len() >= BATCH_FLUSH.min(LogBatch::max_records()) {
            let batch = LogBatch {
                prev: entry.head,
                records: std::mem::take(&mut entry.pending),
            };
            let bytes = batch.encode()?;
            self.log.write_all(&bytes)?;
            entry.head = LogPtr::new(self.log_len, bytes.len() as u16)?;
            self.log_len += bytes.len() as u64;
        }
        Ok(())
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Flush every pending batch and seal the heads index.
    pub fn seal(
        mut self,
        mut metadata: IndexMetadata,
        tmp_dir: Option<&Path>,
    ) -> Result<(), GsfaError> {
        // Drain pending batches deterministically.
        let mut addresses: Vec<Pubkey> = self.heads.keys().copied().collect();
        addresses.sort();
        for address in &addresses {
            let entry = self.heads.get_mut(address).expect("key exists");
            if entry.pending.is_empty() {
                continue;
            }
            let batch = LogBatch {
                prev: entry.head,
                records: std::mem::take(&mut entry.pending),
            };
            let bytes = batch.encode()?;
            self.log.write_all(&bytes)?;
            entry.head = LogPtr::new(self.log_len, bytes.len() as u16)?;
            self.log_len += bytes.len() as u64;
        }
        self.log.flush()?;
        self.log.get_mut().sync_all()?;

        metadata.set_u64(IndexMetadata::KEY_ENTRY_COUNT, self.record_count);
        let mut heads = CompactIndexWriter::create(
            self.dir.join(HEADS_FILE),
            self.heads.len() as u64,
            8,
            {
                let mut m = metadata;
                m.set(IndexMetadata::KEY_KIND, KIND_GSFA_HEADS.as_bytes());
                m
            },
            tmp_dir,
        )?;
        for address in &addresses {
            let entry = &self.heads[address];
            if entry.head.is_none() {
                continue;
            }
            heads.insert(address.as_bytes(), &entry.head.to_le_bytes())?;
        }
        heads.seal()?;
        Ok(())
    }
}
