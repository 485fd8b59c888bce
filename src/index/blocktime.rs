// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Dense slot-to-blocktime array.
//!
//! One fixed-length file per epoch: the common header and metadata block,
//! then exactly `SLOTS_PER_EPOCH` little-endian `i64` seconds. Slots
//! without a block (or without a recorded time) hold the 0 sentinel.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use memmap2::Mmap;

use super::{IndexError, IndexMetadata, BLOCKTIME_MAGIC, INDEX_VERSION};
use crate::epoch::{epoch_of_slot, SLOTS_PER_EPOCH};

const HEADER_LEN: usize = 32;

pub struct SlotToBlocktimeWriter {
    dest: PathBuf,
    epoch: u64,
    times: Vec<i64>,
    metadata: IndexMetadata,
}

impl SlotToBlocktimeWriter {
    pub fn create(dest: impl AsRef<Path>, metadata: IndexMetadata) -> Result<Self, IndexError> {
        let epoch = metadata
            .epoch()
            .ok_or_else(|| IndexError::Corrupt("blocktime metadata needs an epoch".into()))?;
        Ok(Self {
            dest: dest.as_ref().to_owned(),
            epoch,
            times: vec![0; SLOTS_PER_EPOCH as usize],
            metadata,
        })
    }

    /// Record `time` for an absolute `slot`. Slots outside the epoch are
    /// rejected; a 0 time is indistinguishable from "unknown" by design of
    /// the sentinel.
    pub fn set(&mut self, slot: u64, time: i64) -> Result<(), IndexError> {
        if epoch_of_slot(slot) != self.epoch {
            return Err(IndexError::Corrupt(format!(
                "slot {slot} is outside epoch {}",
                self.epoch
            )));
        }
        let ix = (slot - self.epoch * SLOTS_PER_EPOCH) as usize;
        self.times[ix] = time;
        Ok(())
    }

    pub fn seal(self) -> Result<(), IndexError> {
        let metadata = self.metadata.encode()?;
        let mut out = BufWriter::new(File::create(&self.dest)?);
        out.write_all(&BLOCKTIME_MAGIC)?;
        out.write_u64::<LittleEndian>(INDEX_VERSION)?;
        out.write_u64::<LittleEndian>(SLOTS_PER_EPOCH)?;
        out.write_u32::<LittleEndian>(8)?;
        out.write_u32::<LittleEndian>(0)?;
        out.write_u32::<LittleEndian>(metadata.len() as u32)?;
        out.write_all(&metadata)?;
        for time in &self.times {
            out.write_i64::<LittleEndian>(*time)?;
        }
        out.flush()?;
        Ok(())
    }
}

pub struct SlotToBlocktimeReader {
    mmap: Mmap,
    epoch: u64,
    metadata: IndexMetadata,
    array_off: usize,
}

impl SlotToBlocktimeReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let file = File::open(path.as_ref())?;
        // Safety: the file is sealed and never mutated after open.
        let mmap = unsafe { Mmap::map(&file)? };
        let buf = &mmap[..];
        let header = buf
            .get(..HEADER_LEN)
            .ok_or_else(|| IndexError::Corrupt("file shorter than header".into()))?;
        if header[..8] != BLOCKTIME_MAGIC {
            return Err(IndexError::BadMagic {
                expected: BLOCKTIME_MAGIC,
            });
        }
        let version = u64::from_le_bytes(header[8..16].try_into().unwrap());
        if version != INDEX_VERSION {
            return Err(IndexError::UnsupportedVersion(version));
        }
        let slots = u64::from_le_bytes(header[16..24].try_into().unwrap());
        if slots != SLOTS_PER_EPOCH {
            return Err(IndexError::Corrupt(format!(
                "blocktime index covers {slots} slots, expected {SLOTS_PER_EPOCH}"
            )));
        }
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
        let epoch = metadata
            .epoch()
            .ok_or_else(|| IndexError::Corrupt("blocktime index carries no epoch".into()))?;
        let array_off = meta_start + meta_len;
        let expected = array_off + (SLOTS_PER_EPOCH as usize) * 8;
        if buf.len() < expected {
            return Err(IndexError::Corrupt("truncated blocktime array".into()));
        }
        Ok(Self {
            mmap,
            epoch,
            metadata,
            array_off,
        })
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    /// Blocktime for an absolute slot, `None` for the 0 sentinel and for
    /// slots outside this epoch.
    pub fn get(&self, slot: u64) -> Option<i64> {
        if epoch_of_slot(slot) != self.epoch {
            return None;
        }
        let ix = (slot - self.epoch * SLOTS_PER_EPOCH) as usize;
        let start = self.array_off + ix * 8;
        let raw: [u8; 8] = self.mmap.get(start..start + 8)?.try_into().ok()?;
        match i64::from_le_bytes(raw) {
            0 => None,
            t => Some(t),
        }
    }
}
