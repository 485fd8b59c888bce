// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Signature-exists filter ("bucketteer").
//!
//! Two-level probabilistic membership filter over the epoch's transaction
//! signatures: the first two signature bytes select a bucket, each bucket
//! holds the 64-bit fingerprints of its signatures in Eytzinger order so
//! the membership probe walks a branch-predictable implicit tree. False
//! positives are possible and tolerated (every positive is confirmed
//! against the full signature index); false negatives are not.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use memmap2::Mmap;

use super::hashing::hash_key;
use super::{IndexError, IndexMetadata, BUCKETTEER_MAGIC, INDEX_VERSION};

pub struct BucketteerWriter {
    dest: PathBuf,
    buckets: BTreeMap<u16, Vec<u64>>,
    metadata: IndexMetadata,
}

impl BucketteerWriter {
    pub fn create(dest: impl AsRef<Path>, metadata: IndexMetadata) -> Self {
        Self {
            dest: dest.as_ref().to_owned(),
            buckets: BTreeMap::new(),
            metadata,
        }
    }

    pub fn put(&mut self, signature: &[u8; 64]) {
        let prefix = u16::from_be_bytes([signature[0], signature[1]]);
        self.buckets
            .entry(prefix)
            .or_default()
            .push(hash_key(signature));
    }

    pub fn seal(self) -> Result<(), IndexError> {
        let metadata = self.metadata.encode()?;
        let mut out = BufWriter::new(File::create(&self.dest)?);

        // Header region: everything between the u32 size prefix and the
        // bucket payloads; bucket offsets are relative to the region end.
        let header_len = 8 + 8 + 4 + metadata.len() + 8 + self.buckets.len() * 10;
        out.write_u32::<LittleEndian>(header_len as u32)?;
        out.write_all(&BUCKETTEER_MAGIC)?;
        out.write_u64::<LittleEndian>(INDEX_VERSION)?;
        out.write_u32::<LittleEndian>(metadata.len() as u32)?;
        out.write_all(&metadata)?;
        out.write_u64::<LittleEndian>(self.buckets.len() as u64)?;

        let mut payloads: Vec<Vec<u64>> = Vec::with_capacity(self.buckets.len());
        let mut offset = 0u64;
        for (prefix, mut fingerprints) in self.buckets {
            fingerprints.sort_unstable();
            fingerprints.dedup();
            let laid_out = eytzinger(&fingerprints);
            out.write_u16::<LittleEndian>(prefix)?;
            out.write_u64::<LittleEndian>(offset)?;
            offset += 4 + laid_out.len() as u64 * 8;
            payloads.push(laid_out);
        }
        for bucket in payloads {
            out.write_u32::<LittleEndian>(bucket.len() as u32)?;
            for fp in bucket {
                out.write_u64::<LittleEndian>(fp)?;
            }
        }
        out.flush()?;
        Ok(())
    }
}

/// Breadth-first layout of the sorted input's implicit binary search tree.
fn eytzinger(sorted: &[u64]) -> Vec<u64> {
    fn fill(sorted: &[u64], out: &mut [u64], node: usize, next: &mut usize) {
        if node <= out.len() {
            fill(sorted, out, 2 * node, next);
            out[node - 1] = sorted[*next];
            *next += 1;
            fill(sorted, out, 2 * node + 1, next);
        }
    }
    let mut out = vec![0u64; sorted.len()];
    let mut next = 0;
    fill(sorted, &mut out, 1, &mut next);
    out
}

fn eytzinger_contains(layout: &[u64], wanted: u64) -> bool {
    let n = layout.len();
    let mut i = 1usize;
    while i <= n {
        let v = layout[i - 1];
        if v == wanted {
            return true;
        }
        i = 2 * i + usize::from(v < wanted);
    }
    false
}

pub struct BucketteerReader {
    mmap: Mmap,
    metadata: IndexMetadata,
    prefix_count: usize,
    table_off: usize,
    buckets_off: usize,
}

impl BucketteerReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let file = File::open(path.as_ref())?;
        // Safety: the file is sealed and never mutated after open.
        let mmap = unsafe { Mmap::map(&file)? };
        let buf = &mmap[..];
        let corrupt = |what: &str| IndexError::Corrupt(format!("bucketteer: {what}"));
        let header_len = u32::from_le_bytes(
            buf.get(0..4).ok_or_else(|| corrupt("no size prefix"))?.try_into().unwrap(),
        ) as usize;
        let header = buf
            .get(4..4 + header_len)
            .ok_or_else(|| corrupt("truncated header"))?;
        if header.get(..8) != Some(&BUCKETTEER_MAGIC[..]) {
            return Err(IndexError::BadMagic {
                expected: BUCKETTEER_MAGIC,
            });
        }
        let version = u64::from_le_bytes(header[8..16].try_into().unwrap());
        if version != INDEX_VERSION {
            return Err(IndexError::UnsupportedVersion(version));
        }
        let meta_len = u32::from_le_bytes(
            header
                .get(16..20)
                .ok_or_else(|| corrupt("missing metadata length"))?
                .try_into()
                .unwrap(),
        ) as usize;
        let metadata = IndexMetadata::decode(
            header
                .get(20..20 + meta_len)
                .ok_or_else(|| corrupt("truncated metadata"))?,
        )?;
        let count_off = 20 + meta_len;
        let prefix_count = u64::from_le_bytes(
            header
                .get(count_off..count_off + 8)
                .ok_or_else(|| corrupt("missing prefix count"))?
                .try_into()
                .unwrap(),
        ) as usize;
        let table_off = 4 + count_off + 8;
        let buckets_off = 4 + header_len;
        if table_off + prefix_count * 10 != buckets_off {
            return Err(corrupt("prefix table does not fill the header"));
        }
        Ok(Self {
            mmap,
            metadata,
            prefix_count,
            table_off,
            buckets_off,
        })
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    fn bucket_offset(&self, prefix: u16) -> Option<u64> {
        // The prefix table is sorted; binary search it.
        let mut lo = 0usize;
        let mut hi = self.prefix_count;
        while lo < hi {
            let mid = (lo + hi) / 2;
            let at = self.table_off + mid * 10;
            let entry = self.mmap.get(at..at + 10)?;
            let p = u16::from_le_bytes(entry[0..2].try_into().unwrap());
            match p.cmp(&prefix) {
                std::cmp::Ordering::Equal => {
                    return Some(u64::from_le_bytes(entry[2..10].try_into().unwrap()));
                }
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        None
    }

    pub fn has(&self, signature: &[u8; 64]) -> bool {
        let prefix = u16::from_be_bytes([signature[0], signature[1]]);
        let Some(offset) = self.bucket_offset(prefix) else {
            return false;
        };
        let base = self.buckets_off + offset as usize;
        let Some(count_raw) = self.mmap.get(base..base + 4) else {
            return false;
        };
        let count = u32::from_le_bytes(count_raw.try_into().unwrap()) as usize;
        let Some(region) = self.mmap.get(base + 4..base + 4 + count * 8) else {
            return false;
        };
        let layout: Vec<u64> = region
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        eytzinger_contains(&layout, hash_key(signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(n: u64) -> [u8; 64] {
        let mut s = [0u8; 64];
        s[..8].copy_from_slice(&n.to_be_bytes());
        s[8..16].copy_from_slice(&n.wrapping_mul(0x9e37_79b9_7f4a_7c15).to_le_bytes());
        s
    }

    #[test]
    fn eytzinger_layout_finds_all_members() {
        for n in [0usize, 1, 2, 7, 8, 9, 100] {
            let sorted: Vec<u64> = (0..n as u64).map(|i| i * 3).collect();
            let layout = eytzinger(&sorted);
            assert_eq!(layout.len(), n);
            for v in &sorted {
                assert!(eytzinger_contains(&layout, *v), "lost {v} at n={n}");
            }
            assert!(!eytzinger_contains(&layout, 1));
        }
    }

    #[test]
    fn no_false_negatives_after_seal() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("sig-exists.index");
        let meta = IndexMetadata::for_archive(
            "sig_exists",
            &crate::dag::cid_for(b"arch"),
            0,
            "devnet",
        );
        let mut writer = BucketteerWriter::create(&dest, meta);
        let sigs: Vec<[u8; 64]> = (0..10_000u64).map(sig).collect();
        for s in &sigs {
            writer.put(s);
        }
        writer.seal().unwrap();

        let reader = BucketteerReader::open(&dest).unwrap();
        for s in &sigs {
            assert!(reader.has(s));
        }
    }

    #[test]
    fn misses_stay_misses() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("sig-exists.index");
        let mut writer = BucketteerWriter::create(&dest, IndexMetadata::new());
        for n in 0..1_000u64 {
            writer.put(&sig(n));
        }
        writer.seal().unwrap();
        let reader = BucketteerReader::open(&dest).unwrap();
        let mut false_positives = 0u32;
        for n in 1_000_000..1_100_000u64 {
            if reader.has(&sig(n)) {
                false_positives += 1;
            }
        }
        // 64-bit fingerprints over 1k entries: any hit here is astronomically
        // unlikely, but the filter only promises a bound, not zero.
        assert!(false_positives <= 1, "false positives: {false_positives}");
    }
}
