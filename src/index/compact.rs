// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Compact hash-bucket index.
//!
//! The writer streams `(key, value)` pairs into a temp file, then `seal`
//! groups them into same-sized buckets and picks a per-bucket seed under
//! which the 64-bit entry hashes are pairwise distinct. Lookups hash the
//! key once to pick the bucket and once with the bucket seed to scan it;
//! buckets are small by construction, so the scan is a handful of
//! cache-line reads. Matches are by 64-bit fingerprint: a miss can in
//! principle alias a stored hash, which callers tolerate the same way they
//! tolerate the signature-exists filter's false positives.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::Mmap;

use super::hashing::{hash_key, hash_key_seeded};
use super::{IndexError, IndexMetadata, COMPACT_MAGIC, INDEX_VERSION};

const HEADER_LEN: usize = 32;
const BUCKET_HEADER_LEN: usize = 16;
const TARGET_BUCKET_ENTRIES: u64 = 16;
const MAX_SEED_ATTEMPTS: u32 = 1 << 16;

/// Streaming writer. Supply the expected item count up front; it sizes the
/// bucket table.
pub struct CompactIndexWriter {
    dest: PathBuf,
    bucket_count: u64,
    value_size: usize,
    metadata: IndexMetadata,
    spill: BufWriter<File>,
    spill_path: PathBuf,
    _tmp: tempfile::TempDir,
    count: u64,
}

impl CompactIndexWriter {
    pub fn create(
        dest: impl AsRef<Path>,
        expected_items: u64,
        value_size: usize,
        metadata: IndexMetadata,
        tmp_dir: Option<&Path>,
    ) -> Result<Self, IndexError> {
        let tmp = match tmp_dir {
            Some(dir) => tempfile::TempDir::new_in(dir)?,
            None => tempfile::TempDir::new()?,
        };
        let spill_path = tmp.path().join("entries.spill");
        let spill = BufWriter::new(File::create(&spill_path)?);
        let bucket_count = expected_items.div_ceil(TARGET_BUCKET_ENTRIES).max(1);
        Ok(Self {
            dest: dest.as_ref().to_owned(),
            bucket_count,
            value_size,
            metadata,
            spill,
            spill_path,
            _tmp: tmp,
            count: 0,
        })
    }

    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<(), IndexError> {
        if value.len() != self.value_size {
            return Err(IndexError::ValueSize {
                index: self.value_size as u32,
                supplied: value.len(),
            });
        }
        if key.len() > usize::from(u16::MAX) {
            return Err(IndexError::Corrupt("key longer than 64 KiB".into()));
        }
        self.spill.write_u16::<LittleEndian>(key.len() as u16)?;
        self.spill.write_all(key)?;
        self.spill.write_all(value)?;
        self.count += 1;
        Ok(())
    }

    /// Finalise into the destination file. Creating the destination
    /// truncates whatever half-written file a crashed earlier seal left
    /// behind, so seal is idempotent.
    pub fn seal(mut self) -> Result<(), IndexError> {
        self.spill.flush()?;
        let mut buckets: Vec<Vec<(Vec<u8>, Vec<u8>)>> =
            vec![Vec::new(); self.bucket_count as usize];
        let mut spill = BufReader::new(File::open(&self.spill_path)?);
        for _ in 0..self.count {
            let klen = spill.read_u16::<LittleEndian>()? as usize;
            let mut key = vec![0u8; klen];
            spill.read_exact(&mut key)?;
            let mut value = vec![0u8; self.value_size];
            spill.read_exact(&mut value)?;
            let bucket = (hash_key(&key) % self.bucket_count) as usize;
            buckets[bucket].push((key, value));
        }

        self.metadata
            .set_u64(IndexMetadata::KEY_ENTRY_COUNT, self.count);
        let metadata = self.metadata.encode()?;

        let mut out = BufWriter::new(File::create(&self.dest)?);
        out.write_all(&COMPACT_MAGIC)?;
        out.write_u64::<LittleEndian>(INDEX_VERSION)?;
        out.write_u64::<LittleEndian>(self.bucket_count)?;
        out.write_u32::<LittleEndian>(self.value_size as u32)?;
        out.write_u32::<LittleEndian>(0)?;
        out.write_u32::<LittleEndian>(metadata.len() as u32)?;
        out.write_all(&metadata)?;

        let entry_size = 8 + self.value_size;
        let mut sealed: Vec<(u32, Vec<(u64, Vec<u8>)>)> =
            Vec::with_capacity(buckets.len());
        let mut entry_offset = 0u64;
        let mut table: Vec<(u32, u32, u64)> = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            let (seed, entries) = seal_bucket(bucket)?;
            table.push((seed, entries.len() as u32, entry_offset));
            entry_offset += (entries.len() * entry_size) as u64;
            sealed.push((seed, entries));
        }
        for (seed, count, offset) in table {
            out.write_u32::<LittleEndian>(seed)?;
            out.write_u32::<LittleEndian>(count)?;
            out.write_u64::<LittleEndian>(offset)?;
        }
        for (_seed, entries) in sealed {
            for (hash, value) in entries {
                out.write_u64::<LittleEndian>(hash)?;
                out.write_all(&value)?;
            }
        }
        out.flush()?;
        Ok(())
    }
}

/// Deduplicate, pick a collision-free seed, and order the bucket's entries
/// by their seeded hash.
fn seal_bucket(
    mut items: Vec<(Vec<u8>, Vec<u8>)>,
) -> Result<(u32, Vec<(u64, Vec<u8>)>), IndexError> {
    items.sort();
    items.dedup();
    for pair in items.windows(2) {
        if pair[0].0 == pair[1].0 {
            return Err(IndexError::DuplicateKey);
        }
    }
    'seed: for seed in 0..MAX_SEED_ATTEMPTS {
        let mut entries: Vec<(u64, Vec<u8>)> = items
            .iter()
            .map(|(k, v)| (hash_key_seeded(seed, k), v.clone()))
            .collect();
        entries.sort_by_key(|(h, _)| *h);
        for pair in entries.windows(2) {
            if pair[0].0 == pair[1].0 {
                continue 'seed;
            }
        }
        return Ok((seed, entries));
    }
    Err(IndexError::SeedExhausted)
}

/// Memory-mapped reader over a sealed compact index.
pub struct CompactIndexReader {
    mmap: Mmap,
    bucket_count: u64,
    value_size: usize,
    metadata: IndexMetadata,
    table_off: usize,
    entries_off: usize,
}

impl CompactIndexReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let file = File::open(path.as_ref())?;
        // Safety: the file is sealed and never mutated after open.
        let mmap = unsafe { Mmap::map(&file)? };
        let buf = &mmap[..];
        let header = buf
            .get(..HEADER_LEN)
            .ok_or_else(|| IndexError::Corrupt("file shorter than header".into()))?;
        if header[..8] != COMPACT_MAGIC {
            return Err(IndexError::BadMagic {
                expected: COMPACT_MAGIC,
            });
        }
        let version = u64::from_le_bytes(header[8..16].try_into().unwrap());
        if version != INDEX_VERSION {
            return Err(IndexError::UnsupportedVersion(version));
        }
        let bucket_count = u64::from_le_bytes(header[16..24].try_into().unwrap());
        let value_size = u32::from_le_bytes(header[24..28].try_into().unwrap()) as usize;
        let meta_len = u32::from_le_bytes(
            buf.get(HEADER_LEN..HEADER_LEN + 4)
                .ok_or_else(|| IndexError::Corrupt("missing metadata length".into()))?
                .try_into()
                .unwrap(),
        ) as usize;
        let meta_start = HEADER_LEN + 4;
        let metadata = IndexMetadata::decode(
            buf.get(meta_start..meta_start + meta_len)
                .ok_or_else(|| IndexError::Corrupt("truncated metadata".into()))?,
        )?;
        let table_off = meta_start + meta_len;
        let entries_off = table_off
            .checked_add((bucket_count as usize).saturating_mul(BUCKET_HEADER_LEN))
            .ok_or_else(|| IndexError::Corrupt("bucket table overflow".into()))?;
        if entries_off > buf.len() {
            return Err(IndexError::Corrupt("truncated bucket table".into()));
        }
        Ok(Self {
            mmap,
            bucket_count,
            value_size,
            metadata,
            table_off,
            entries_off,
        })
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    pub fn value_size(&self) -> usize {
        self.value_size
    }

    pub fn entry_count(&self) -> u64 {
        self.metadata
            .get_u64(IndexMetadata::KEY_ENTRY_COUNT)
            .unwrap_or(0)
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let bucket = (hash_key(key) % self.bucket_count) as usize;
        let header_start = self.table_off + bucket * BUCKET_HEADER_LEN;
        let header = self.mmap.get(header_start..header_start + BUCKET_HEADER_LEN)?;
        let seed = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let count = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;
        let offset = u64::from_le_bytes(header[8..16].try_into().unwrap()) as usize;
        let entry_size = 8 + self.value_size;
        let base = self.entries_off + offset;
        let region = self.mmap.get(base..base + count * entry_size)?;
        let wanted = hash_key_seeded(seed, key);
        for entry in region.chunks_exact(entry_size) {
            let hash = u64::from_le_bytes(entry[..8].try_into().unwrap());
            if hash == wanted {
                return Some(&entry[8..]);
            }
        }
        None
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }
}
