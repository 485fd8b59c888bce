// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Typed views over the compact index: CID → (offset, size), slot → CID,
//! signature → CID, and the cross-epoch signature → epoch map.

use std::path::Path;

use cid::Cid;

use super::{CompactIndexReader, CompactIndexWriter, IndexError, IndexMetadata};

pub const KIND_CID_TO_OFFSET: &str = "cid_to_offset_and_size";
pub const KIND_SLOT_TO_CID: &str = "slot_to_cid";
pub const KIND_SIG_TO_CID: &str = "sig_to_cid";
pub const KIND_SIG_TO_EPOCH: &str = "sig_to_epoch";
pub const KIND_GSFA_HEADS: &str = "gsfa_heads";

/// Encoded CID length used by all CID-valued indexes.
pub const CID_VALUE_LEN: usize = 36;
const OFFSET_SIZE_LEN: usize = 12;
const EPOCH_VALUE_LEN: usize = 8;

/// Where a node's section lives in the stitched archive address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetAndSize {
    pub offset: u64,
    pub size: u32,
}

impl OffsetAndSize {
    pub fn encode(&self) -> [u8; OFFSET_SIZE_LEN] {
        let mut out = [0u8; OFFSET_SIZE_LEN];
        out[..8].copy_from_slice(&self.offset.to_le_bytes());
        out[8..].copy_from_slice(&self.size.to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        Some(Self {
            offset: u64::from_le_bytes(buf.get(..8)?.try_into().ok()?),
            size: u32::from_le_bytes(buf.get(8..12)?.try_into().ok()?),
        })
    }
}

fn encode_cid(cid: &Cid) -> Result<[u8; CID_VALUE_LEN], IndexError> {
    let bytes = cid.to_bytes();
    bytes.as_slice().try_into().map_err(|_| {
        IndexError::Corrupt(format!(
            "cid {cid} encodes to {} bytes, indexes store {CID_VALUE_LEN}",
            bytes.len()
        ))
    })
}

fn decode_cid(buf: &[u8]) -> Option<Cid> {
    Cid::try_from(buf).ok()
}

macro_rules! typed_index {
    (
        $(#[$doc:meta])*
        $writer:ident, $reader:ident, $kind:expr, $value_len:expr,
        key: $key_ty:ty => $key_encode:expr
    ) => {
        $(#[$doc])*
        pub struct $writer {
            inner: CompactIndexWriter,
        }

        impl $writer {
            pub fn create(
                dest: impl AsRef<Path>,
                expected_items: u64,
                mut metadata: IndexMetadata,
                tmp_dir: Option<&Path>,
            ) -> Result<Self, IndexError> {
                metadata.set(IndexMetadata::KEY_KIND, $kind.as_bytes());
                Ok(Self {
                    inner: CompactIndexWriter::create(
                        dest,
                        expected_items,
                        $value_len,
                        metadata,
                        tmp_dir,
                    )?,
                })
            }

            pub fn seal(self) -> Result<(), IndexError> {
                self.inner.seal()
            }
        }

        pub struct $reader {
            inner: CompactIndexReader,
        }

        impl $reader {
            pub fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
                let inner = CompactIndexReader::open(path)?;
                inner.metadata().check_kind($kind)?;
                if inner.value_size() != $value_len {
                    return Err(IndexError::ValueSize {
                        index: inner.value_size() as u32,
                        supplied: $value_len,
                    });
                }
                Ok(Self { inner })
            }

            pub fn metadata(&self) -> &IndexMetadata {
                self.inner.metadata()
            }

            pub fn entry_count(&self) -> u64 {
                self.inner.entry_count()
            }

            fn get_raw(&self, key: &$key_ty) -> Option<&[u8]> {
                let encode = $key_encode;
                self.inner.get(encode(key).as_ref())
            }

            pub fn contains(&self, key: &$key_ty) -> bool {
                self.get_raw(key).is_some()
            }
        }
    };
}

typed_index!(
    /// CID → section `(offset, size)` in the archive.
    CidToOffsetWriter, CidToOffsetReader, KIND_CID_TO_OFFSET, OFFSET_SIZE_LEN,
    key: Cid => |cid: &Cid| cid.to_bytes()
);

impl CidToOffsetWriter {
    pub fn insert(&mut self, cid: &Cid, value: OffsetAndSize) -> Result<(), IndexError> {
        self.inner.insert(&cid.to_bytes(), &value.encode())
    }
}

impl CidToOffsetReader {
    pub fn get(&self, cid: &Cid) -> Option<OffsetAndSize> {
        OffsetAndSize::decode(self.get_raw(cid)?)
    }
}

typed_index!(
    /// Slot → Block CID.
    SlotToCidWriter, SlotToCidReader, KIND_SLOT_TO_CID, CID_VALUE_LEN,
    key: u64 => |slot: &u64| slot.to_le_bytes()
);

impl SlotToCidWriter {
    pub fn insert(&mut self, slot: u64, cid: &Cid) -> Result<(), IndexError> {
        self.inner.insert(&slot.to_le_bytes(), &encode_cid(cid)?)
    }
}

impl SlotToCidReader {
    pub fn get(&self, slot: u64) -> Option<Cid> {
        decode_cid(self.get_raw(&slot)?)
    }
}

typed_index!(
    /// Transaction signature → Transaction CID.
    SigToCidWriter, SigToCidReader, KIND_SIG_TO_CID, CID_VALUE_LEN,
    key: [u8; 64] => |sig: &[u8; 64]| *sig
);

impl SigToCidWriter {
    pub fn insert(&mut self, signature: &[u8; 64], cid: &Cid) -> Result<(), IndexError> {
        self.inner.insert(signature, &encode_cid(cid)?)
    }
}

impl SigToCidReader {
    pub fn get(&self, signature: &[u8; 64]) -> Option<Cid> {
        decode_cid(self.get_raw(signature)?)
    }
}

typed_index!(
    /// Cross-epoch transaction signature → epoch number.
    SigToEpochWriter, SigToEpochReader, KIND_SIG_TO_EPOCH, EPOCH_VALUE_LEN,
    key: [u8; 64] => |sig: &[u8; 64]| *sig
);

impl SigToEpochWriter {
    pub fn insert(&mut self, signature: &[u8; 64], epoch: u64) -> Result<(), IndexError> {
        self.inner.insert(signature, &epoch.to_le_bytes())
    }
}

impl SigToEpochReader {
    pub fn get(&self, signature: &[u8; 64]) -> Option<u64> {
        let raw: [u8; 8] = self.get_raw(signature)?.try_into().ok()?;
        Some(u64::from_le_bytes(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::cid_for;

    fn meta(kind: &str) -> IndexMetadata {
        IndexMetadata::for_archive(kind, &cid_for(b"arch"), 3, "testnet")
    }

    #[test]
    fn offset_and_size_roundtrip() {
        let v = OffsetAndSize {
            offset: 0x1234_5678_9abc,
            size: 4096,
        };
        assert_eq!(OffsetAndSize::decode(&v.encode()), Some(v));
    }

    #[test]
    fn slot_to_cid_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("slot.index");
        let mut writer =
            SlotToCidWriter::create(&dest, 100, meta(KIND_SLOT_TO_CID), None).unwrap();
        let cids: Vec<Cid> = (0u64..100).map(|i| cid_for(&i.to_le_bytes())).collect();
        for (slot, cid) in cids.iter().enumerate() {
            writer.insert(slot as u64, cid).unwrap();
        }
        writer.seal().unwrap();

        let reader = SlotToCidReader::open(&dest).unwrap();
        for (slot, cid) in cids.iter().enumerate() {
            assert_eq!(reader.get(slot as u64), Some(*cid));
        }
        assert_eq!(reader.get(100), None);
    }

    #[test]
    fn kind_is_checked_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("sig.index");
        let mut writer =
            SigToCidWriter::create(&dest, 1, meta(KIND_SIG_TO_CID), None).unwrap();
        writer.insert(&[9u8; 64], &cid_for(b"tx")).unwrap();
        writer.seal().unwrap();

        assert!(SigToCidReader::open(&dest).is_ok());
        assert!(matches!(
            SlotToCidReader::open(&dest),
            Err(IndexError::WrongKind { .. })
        ));
    }

    #[test]
    fn sig_to_epoch_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("sig-epoch.index");
        let mut writer =
            SigToEpochWriter::create(&dest, 2, meta(KIND_SIG_TO_EPOCH), None).unwrap();
        writer.insert(&[1u8; 64], 7).unwrap();
        writer.insert(&[2u8; 64], 8).unwrap();
        writer.seal().unwrap();
        let reader = SigToEpochReader::open(&dest).unwrap();
        assert_eq!(reader.get(&[1u8; 64]), Some(7));
        assert_eq!(reader.get(&[2u8; 64]), Some(8));
        assert_eq!(reader.get(&[3u8; 64]), None);
    }
}
