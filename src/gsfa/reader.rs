// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::Path;

use memmap2::Mmap;

use super::linkedlog::{LogBatch, LogPtr};
use super::{GsfaError, HEADS_FILE, LOG_FILE};
use crate::index::typed::KIND_GSFA_HEADS;
use crate::index::{CompactIndexReader, IndexMetadata};
use crate::solana::Pubkey;

/// Read side of one epoch's GSFA index. A reader is bound to its epoch at
/// construction and never re-targeted, so any number of concurrent queries
/// against it observe the same epoch id.
pub struct GsfaReader {
    epoch: u64,
    heads: CompactIndexReader,
    log: Mmap,
}

impl GsfaReader {
    pub fn open(dir: &Path, epoch: u64) -> Result<Self, GsfaError> {
        let heads = CompactIndexReader::open(dir.join(HEADS_FILE))?;
        heads.metadata().check_kind(KIND_GSFA_HEADS)?;
        if let Some(index_epoch) = heads.metadata().epoch() {
            if index_epoch != epoch {
                return Err(GsfaError::Corrupt(format!(
                    "gsfa index sealed for epoch {index_epoch}, configured for {epoch}"
                )));
            }
        }
        let log_file = std::fs::File::open(dir.join(LOG_FILE))?;
        // Safety: the log is write-once and sealed before readers open it.
        let log = unsafe { Mmap::map(&log_file)? };
        Ok(Self { epoch, heads, log })
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn metadata(&self) -> &IndexMetadata {
        self.heads.metadata()
    }

    /// Head of the address's linked log, newest batch.
    pub fn head(&self, address: &Pubkey) -> Option<LogPtr> {
        let raw: [u8; 8] = self.heads.get(address.as_bytes())?.try_into().ok()?;
        let ptr = LogPtr::from_le_bytes(raw);
        (!ptr.is_none()).then_some(ptr)
    }

    pub fn batch(&self, ptr: LogPtr) -> Result<LogBatch, GsfaError> {
        let start = ptr.offset() as usize;
        let end = start + usize::from(ptr.size());
        let buf = self
            .log
            .get(start..end)
            .ok_or_else(|| GsfaError::Corrupt(format!("pointer {start}..{end} beyond log end")))?;
        LogBatch::decode(buf)
    }
}
