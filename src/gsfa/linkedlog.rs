// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use byteorder::{ByteOrder, LittleEndian};

use super::GsfaError;

/// Packed pointer into the linked log: 48-bit byte offset, 16-bit batch
/// size. The all-zero pointer means "no older batch".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogPtr(u64);

const OFFSET_BITS: u32 = 48;
const MAX_OFFSET: u64 = (1 << OFFSET_BITS) - 1;

impl LogPtr {
    pub fn new(offset: u64, size: u16) -> Result<Self, GsfaError> {
        if offset > MAX_OFFSET {
            return Err(GsfaError::OffsetRange(offset));
        }
        Ok(Self((offset << (64 - OFFSET_BITS)) | u64::from(size)))
    }

    pub const fn none() -> Self {
        Self(0)
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    pub fn offset(&self) -> u64 {
        self.0 >> (64 - OFFSET_BITS)
    }

    pub fn size(&self) -> u16 {
        (self.0 & 0xffff) as u16
    }

    pub fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    pub fn from_le_bytes(raw: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(raw))
    }
}

/// One record pointing at a transaction section in the same epoch's
/// archive. The signature is stored alongside the pointer so `before` /
/// `until` scanning and signature-only listings resolve from the log
/// without touching the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord {
    pub offset: u64,
    pub size: u32,
    pub slot: u64,
    pub signature: [u8; 64],
}

pub const RECORD_LEN: usize = 84;
const BATCH_HEADER_LEN: usize = 12;

/// A batch node in the log: back-link to the next-older batch, then its
/// records in ascending slot order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogBatch {
    pub prev: LogPtr,
    pub records: Vec<LogRecord>,
}

impl LogBatch {
    pub fn encoded_len(record_count: usize) -> usize {
        BATCH_HEADER_LEN + record_count * RECORD_LEN
    }

    /// Largest record count whose batch still fits a 16-bit pointer size.
    pub fn max_records() -> usize {
        (usize::from(u16::MAX) - BATCH_HEADER_LEN) / RECORD_LEN
    }

    pub fn encode(&self) -> Result<Vec<u8>, GsfaError> {
        let len = Self::encoded_len(self.records.len());
        if len > usize::from(u16::MAX) {
            return Err(GsfaError::BatchTooLarge(self.records.len()));
        }
        let mut out = vec![0u8; len];
        out[..8].copy_from_slice(&self.prev.to_le_bytes());
        LittleEndian::write_u32(&mut out[8..12], self.records.len() as u32);
        for (i, record) in self.records.iter().enumerate() {
            let base = BATCH_HEADER_LEN + i * RECORD_LEN;
            LittleEndian::write_u64(&mut out[base..base + 8], record.offset);
            LittleEndian::write_u32(&mut out[base + 8..base + 12], record.size);
            LittleEndian::write_u64(&mut out[base + 12..base + 20], record.slot);
            out[base + 20..base + 84].copy_from_slice(&record.signature);
        }
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, GsfaError> {
        if buf.len() < BATCH_HEADER_LEN {
            return Err(GsfaError::Corrupt("batch shorter than header".into()));
        }
        let prev = LogPtr::from_le_bytes(buf[..8].try_into().expect("exact length"));
        let count = LittleEndian::read_u32(&buf[8..12]) as usize;
        if buf.len() != Self::encoded_len(count) {
            return Err(GsfaError::Corrupt(format!(
                "batch declares {count} records in {} bytes",
                buf.len()
            )));
        }
        let mut records = Vec::with_capacity(count);
        for i in 0..count {
            let base = BATCH_HEADER_LEN + i * RECORD_LEN;
            records.push(LogRecord {
                offset: LittleEndian::read_u64(&buf[base..base + 8]),
                size: LittleEndian::read_u32(&buf[base + 8..base + 12]),
                slot: LittleEndian::read_u64(&buf[base + 12..base + 20]),
                signature: buf[base + 20..base + 84]
                    .try_into()
                    .expect("exact length"),
            });
        }
        Ok(Self { prev, records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ptr_packs_offset_and_size() {
        let ptr = LogPtr::new(0x1234_5678_9abc, 512).unwrap();
        assert_eq!(ptr.offset(), 0x1234_5678_9abc);
        assert_eq!(ptr.size(), 512);
        assert!(!ptr.is_none());
        assert!(LogPtr::none().is_none());
        assert!(LogPtr::new(1 << 48, 1).is_err());
    }

    #[test]
    fn batch_roundtrip() {
        let batch = LogBatch {
            prev: LogPtr::new(128, 32).unwrap(),
            records: vec![
                LogRecord {
                    offset: 100,
                    size: 50,
                    slot: 7,
                    signature: [1u8; 64],
                },
                LogRecord {
                    offset: 200,
                    size: 60,
                    slot: 9,
                    signature: [2u8; 64],
                },
            ],
        };
        let bytes = batch.encode().unwrap();
        assert_eq!(bytes.len(), LogBatch::encoded_len(2));
        assert_eq!(LogBatch::decode(&bytes).unwrap(), batch);
    }

    #[test]
    fn truncated_batch_is_rejected() {
        let batch = LogBatch {
            prev: LogPtr::none(),
            records: vec![LogRecord {
                offset: 1,
                size: 2,
                slot: 3,
                signature: [7u8; 64],
            }],
        };
        let bytes = batch.encode().unwrap();
        assert!(LogBatch::decode(&bytes[..bytes.len() - 1]).is_err());
    }
}
