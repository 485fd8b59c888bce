// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The sealed on-disk index family.
//!
//! Every index is produced offline by a streaming writer, sealed once, and
//! then only ever opened read-only and memory-mapped. Each file carries a
//! fixed header plus a small key-value metadata block naming the archive
//! root CID, the epoch number and the network, so readers can cross-check
//! that an index belongs to the archive they serve.

pub mod blocktime;
pub mod bucketteer;
pub mod compact;
pub mod hashing;
pub mod typed;

pub use blocktime::{SlotToBlocktimeReader, SlotToBlocktimeWriter};
pub use bucketteer::{BucketteerReader, BucketteerWriter};
pub use compact::{CompactIndexReader, CompactIndexWriter};
pub use typed::{
    CidToOffsetReader, CidToOffsetWriter, OffsetAndSize, SigToCidReader, SigToCidWriter,
    SigToEpochReader, SigToEpochWriter, SlotToCidReader, SlotToCidWriter,
};

use cid::Cid;

pub const INDEX_VERSION: u64 = 1;

/// Magic of the compact hash-bucket index format.
pub const COMPACT_MAGIC: [u8; 8] = *b"rdcecidx";
/// Magic of the dense slot-to-blocktime array.
pub const BLOCKTIME_MAGIC: [u8; 8] = *b"rdceblkt";
/// Magic of the signature-exists filter.
pub const BUCKETTEER_MAGIC: [u8; 8] = *b"buckteer";

const MAX_METADATA_ENTRIES: usize = 255;
const MAX_METADATA_PART: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad magic: expected {expected:?}")]
    BadMagic { expected: [u8; 8] },
    #[error("unsupported index version {0}")]
    UnsupportedVersion(u64),
    #[error("corrupt index: {0}")]
    Corrupt(String),
    #[error("metadata entry too large or too many entries")]
    MetadataTooLarge,
    #[error("value size mismatch: index holds {index}, caller supplied {supplied}")]
    ValueSize { index: u32, supplied: usize },
    #[error("duplicate key with conflicting values")]
    DuplicateKey,
    #[error("index kind mismatch: expected {expected}, found {found}")]
    WrongKind { expected: String, found: String },
    #[error("could not find a collision-free bucket seed")]
    SeedExhausted,
}

/// Bounded key-value metadata block carried by every sealed index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexMetadata {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl IndexMetadata {
    pub const KEY_ROOT_CID: &'static str = "root_cid";
    pub const KEY_EPOCH: &'static str = "epoch";
    pub const KEY_NETWORK: &'static str = "network";
    pub const KEY_KIND: &'static str = "kind";
    pub const KEY_ENTRY_COUNT: &'static str = "entry_count";

    pub fn new() -> Self {
        Self::default()
    }

    /// Standard metadata for an index over archive `root` of `epoch`.
    pub fn for_archive(kind: &str, root: &Cid, epoch: u64, network: &str) -> Self {
        let mut meta = Self::new();
        meta.set(Self::KEY_KIND, kind.as_bytes());
        meta.set(Self::KEY_ROOT_CID, &root.to_bytes());
        meta.set_u64(Self::KEY_EPOCH, epoch);
        meta.set(Self::KEY_NETWORK, network.as_bytes());
        meta
    }

    pub fn set(&mut self, key: &str, value: &[u8]) {
        self.entries.retain(|(k, _)| k != key.as_bytes());
        self.entries.push((key.as_bytes().to_vec(), value.to_vec()));
    }

    pub fn set_u64(&mut self, key: &str, value: u64) {
        self.set(key, &value.to_le_bytes());
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key.as_bytes())
            .map(|(_, v)| v.as_slice())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        let raw: [u8; 8] = self.get(key)?.try_into().ok()?;
        Some(u64::from_le_bytes(raw))
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        std::str::from_utf8(self.get(key)?).ok()
    }

    pub fn root_cid(&self) -> Option<Cid> {
        Cid::try_from(self.get(Self::KEY_ROOT_CID)?).ok()
    }

    pub fn epoch(&self) -> Option<u64> {
        self.get_u64(Self::KEY_EPOCH)
    }

    pub fn kind(&self) -> Option<&str> {
        self.get_str(Self::KEY_KIND)
    }

    pub fn encode(&self) -> Result<Vec<u8>, IndexError> {
        if self.entries.len() > MAX_METADATA_ENTRIES {
            return Err(IndexError::MetadataTooLarge);
        }
        let mut out = vec![self.entries.len() as u8];
        for (k, v) in &self.entries {
            if k.len() > MAX_METADATA_PART || v.len() > MAX_METADATA_PART {
                return Err(IndexError::MetadataTooLarge);
            }
            out.push(k.len() as u8);
            out.extend_from_slice(k);
            out.push(v.len() as u8);
            out.extend_from_slice(v);
        }
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, IndexError> {
        let corrupt = || IndexError::Corrupt("truncated metadata block".into());
        let mut pos = 0usize;
        let count = *buf.first().ok_or_else(corrupt)? as usize;
        pos += 1;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let klen = *buf.get(pos).ok_or_else(corrupt)? as usize;
            pos += 1;
            let key = buf.get(pos..pos + klen).ok_or_else(corrupt)?.to_vec();
            pos += klen;
            let vlen = *buf.get(pos).ok_or_else(corrupt)? as usize;
            pos += 1;
            let value = buf.get(pos..pos + vlen).ok_or_else(corrupt)?.to_vec();
            pos += vlen;
            entries.push((key, value));
        }
        Ok(Self { entries })
    }

    /// Verify that this index was sealed over the archive rooted at `root`.
    pub fn check_root(&self, root: &Cid) -> Result<(), IndexError> {
        match self.root_cid() {
            Some(r) if r == *root => Ok(()),
            Some(r) => Err(IndexError::Corrupt(format!(
                "index sealed over root {r}, archive root is {root}"
            ))),
            None => Err(IndexError::Corrupt("index carries no root cid".into())),
        }
    }

    pub fn check_kind(&self, expected: &str) -> Result<(), IndexError> {
        match self.kind() {
            Some(k) if k == expected => Ok(()),
            other => Err(IndexError::WrongKind {
                expected: expected.to_owned(),
                found: other.unwrap_or("<missing>").to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::cid_for;

    #[test]
    fn metadata_roundtrip() {
        let root = cid_for(b"some archive");
        let meta = IndexMetadata::for_archive("slot_to_cid", &root, 42, "mainnet");
        let decoded = IndexMetadata::decode(&meta.encode().unwrap()).unwrap();
        assert_eq!(decoded, meta);
        assert_eq!(decoded.root_cid(), Some(root));
        assert_eq!(decoded.epoch(), Some(42));
        assert_eq!(decoded.get_str(IndexMetadata::KEY_NETWORK), Some("mainnet"));
        decoded.check_root(&root).unwrap();
        decoded.check_kind("slot_to_cid").unwrap();
        assert!(decoded.check_root(&cid_for(b"other")).is_err());
        assert!(decoded.check_kind("sig_to_cid").is_err());
    }

    #[test]
    fn oversized_metadata_is_rejected() {
        let mut meta = IndexMetadata::new();
        meta.set("key", &[0u8; 256]);
        assert!(matches!(
            meta.encode(),
            Err(IndexError::MetadataTooLarge)
        ));
    }
}
