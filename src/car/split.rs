// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cid::Cid;

use super::{CarError, CarHeader, SectionCursor, MAX_READ_LENGTH};
use crate::dag;
use crate::fetch::{LocalFileSource, SectionSource};

/// Window scanned from the start of each piece while looking for its first
/// Block node. Entry and DataFrame sections precede the first Block in
/// write order, so the window has to cover a full block's worth of them.
const PROBE_WINDOW: usize = MAX_READ_LENGTH as usize;

/// One logical CAR over one or more physical pieces.
///
/// The address space is the concatenation of the piece lengths; offsets
/// handed out by the indexes resolve against it directly. Only the first
/// piece carries the container header.
pub struct SplitCarReader {
    pieces: Vec<PieceRegion>,
    header: CarHeader,
    header_size: u64,
    total_len: u64,
}

struct PieceRegion {
    source: Arc<dyn SectionSource>,
    global_start: u64,
    len: u64,
    first_slot: u64,
}

struct PieceProbe {
    source: Arc<dyn SectionSource>,
    header: Option<CarHeader>,
    header_size: u64,
    first_slot: u64,
}

impl SplitCarReader {
    /// Stitch `sources` into one archive. Piece order is established by each
    /// piece's first Block slot; the supplied order does not matter.
    pub async fn open(sources: Vec<Arc<dyn SectionSource>>) -> Result<Self, CarError> {
        if sources.is_empty() {
            return Err(CarError::PieceUnavailable("no pieces configured".into()));
        }
        let mut probes = Vec::with_capacity(sources.len());
        for source in sources {
            probes.push(probe_piece(source).await?);
        }
        probes.sort_by_key(|p| p.first_slot);
        for pair in probes.windows(2) {
            if pair[0].first_slot == pair[1].first_slot {
                return Err(CarError::PieceOverlap(format!(
                    "{} and {} both start at slot {}",
                    pair[0].source.describe(),
                    pair[1].source.describe(),
                    pair[0].first_slot,
                )));
            }
        }
        let header = probes[0]
            .header
            .clone()
            .ok_or_else(|| CarError::InvalidHeader("first piece carries no header".into()))?;
        header.single_root()?;
        let header_size = probes[0].header_size;
        for later in &probes[1..] {
            if later.header.is_some() {
                return Err(CarError::PieceOverlap(format!(
                    "unexpected container header in non-initial piece {}",
                    later.source.describe()
                )));
            }
        }
        let mut pieces = Vec::with_capacity(probes.len());
        let mut global_start = 0u64;
        for probe in probes {
            let len = probe.source.len();
            pieces.push(PieceRegion {
                source: probe.source,
                global_start,
                len,
                first_slot: probe.first_slot,
            });
            global_start += len;
        }
        Ok(Self {
            pieces,
            header,
            header_size,
            total_len: global_start,
        })
    }

    /// Single-file archives take the same path with one source.
    pub async fn open_single(source: Arc<dyn SectionSource>) -> Result<Self, CarError> {
        let probe = probe_piece(source).await?;
        let header = probe
            .header
            .clone()
            .ok_or_else(|| CarError::InvalidHeader("archive carries no header".into()))?;
        header.single_root()?;
        let len = probe.source.len();
        Ok(Self {
            pieces: vec![PieceRegion {
                source: probe.source,
                global_start: 0,
                len,
                first_slot: probe.first_slot,
            }],
            header,
            header_size: probe.header_size,
            total_len: len,
        })
    }

    pub fn root(&self) -> Cid {
        // Validated at open.
        self.header.roots[0]
    }

    pub fn header_size(&self) -> u64 {
        self.header_size
    }

    pub fn len(&self) -> u64 {
        self.total_len
    }

    pub fn is_empty(&self) -> bool {
        self.total_len == 0
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Read `len` bytes at `offset` over the stitched address space, capped
    /// at [`MAX_READ_LENGTH`] and clamped to the archive end.
    pub async fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>, CarError> {
        if offset >= self.total_len {
            return Err(CarError::OutOfBounds {
                offset,
                len: self.total_len,
            });
        }
        let len = len.min(MAX_READ_LENGTH).min(self.total_len - offset);
        let mut out = Vec::with_capacity(len as usize);
        let mut pos = offset;
        let mut remaining = len;
        while remaining > 0 {
            let piece = self.piece_for(pos)?;
            let local = pos - piece.global_start;
            let take = remaining.min(piece.len - local);
            let chunk = piece.source.read_at(local, take as usize).await?;
            if chunk.len() as u64 != take {
                return Err(CarError::TruncatedSection(pos));
            }
            out.extend_from_slice(&chunk);
            pos += take;
            remaining -= take;
        }
        Ok(out)
    }

    fn piece_for(&self, offset: u64) -> Result<&PieceRegion, CarError> {
        let ix = self
            .pieces
            .partition_point(|p| p.global_start + p.len <= offset);
        self.pieces.get(ix).ok_or(CarError::OutOfBounds {
            offset,
            len: self.total_len,
        })
    }
}

async fn probe_piece(source: Arc<dyn SectionSource>) -> Result<PieceProbe, CarError> {
    let window = source
        .read_at(0, PROBE_WINDOW.min(source.len() as usize))
        .await?;
    let mut cursor = SectionCursor::new(&window, 0);
    let header = cursor.strip_header();
    let header_size = match &header {
        Some(h) => h.encoded_len(),
        None => 0,
    };
    while let Some((_info, data)) = cursor.next_section()? {
        if let Ok(block) = dag::decode_block(data) {
            return Ok(PieceProbe {
                source,
                header,
                header_size,
                first_slot: block.slot,
            });
        }
    }
    Err(CarError::NoBlockInPiece(source.describe()))
}

/// Ordering information for one piece of a split archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarPieceInfo {
    pub path: PathBuf,
    pub first_slot: u64,
    pub len: u64,
    pub has_header: bool,
}

/// Order split-archive pieces ascending by the slot of their first Block
/// node. Pieces covering overlapping slot ranges reject the archive.
pub async fn sort_car_files(paths: &[impl AsRef<Path>]) -> Result<Vec<CarPieceInfo>, CarError> {
    let mut infos = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref().to_owned();
        let source: Arc<dyn SectionSource> = Arc::new(LocalFileSource::open(&path)?);
        let len = source.len();
        let probe = probe_piece(source).await?;
        infos.push(CarPieceInfo {
            path,
            first_slot: probe.first_slot,
            len,
            has_header: probe.header.is_some(),
        });
    }
    infos.sort_by_key(|i| i.first_slot);
    for pair in infos.windows(2) {
        if pair[0].first_slot == pair[1].first_slot {
            return Err(CarError::PieceOverlap(format!(
                "{} and {} both start at slot {}",
                pair[0].path.display(),
                pair[1].path.display(),
                pair[0].first_slot,
            )));
        }
    }
    Ok(infos)
}

/// Sequential section stream over a whole (possibly split) local archive,
/// in sorted piece order, with global offsets. This is the build-time
/// counterpart of [`SplitCarReader`]: index writers stream it, restarting
/// by opening a fresh instance.
pub struct MultiCarStream {
    pieces: Vec<CarPieceInfo>,
    header: super::CarHeader,
    header_size: u64,
    current: usize,
    reader: std::io::BufReader<std::fs::File>,
    position: u64,
}

impl MultiCarStream {
    pub async fn open(paths: &[impl AsRef<Path>]) -> Result<Self, CarError> {
        let pieces = sort_car_files(paths).await?;
        if !pieces[0].has_header {
            return Err(CarError::InvalidHeader(
                "first piece carries no header".into(),
            ));
        }
        if pieces.iter().skip(1).any(|p| p.has_header) {
            return Err(CarError::PieceOverlap(
                "unexpected container header in non-initial piece".into(),
            ));
        }
        let mut reader = std::io::BufReader::new(std::fs::File::open(&pieces[0].path)?);
        let stream = super::CarStream::new(&mut reader)?;
        let header = stream.header().clone();
        header.single_root()?;
        let header_size = stream.header_size();
        Ok(Self {
            pieces,
            header,
            header_size,
            current: 0,
            reader,
            position: header_size,
        })
    }

    pub fn root(&self) -> Cid {
        self.header.roots[0]
    }

    pub fn header_size(&self) -> u64 {
        self.header_size
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn next_section(&mut self) -> Result<Option<super::CarSection>, CarError> {
        loop {
            if let Some(mut section) =
                super::read_section_from(&mut self.reader, self.position)?
            {
                section.offset = self.position;
                self.position += section.section_len;
                return Ok(Some(section));
            }
            // Clean end of the current piece; move to the next one.
            self.current += 1;
            let Some(piece) = self.pieces.get(self.current) else {
                return Ok(None);
            };
            self.reader = std::io::BufReader::new(std::fs::File::open(&piece.path)?);
        }
    }
}
