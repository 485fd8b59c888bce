// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! CAR v1 container reading.
//!
//! An archive is one logical CAR that may physically be a single file or an
//! ordered set of split pieces ([`split::SplitCarReader`]). Offsets exposed
//! by this module are always global byte offsets over the stitched address
//! space; the first section starts exactly at the container header size.

mod split;

pub use split::{sort_car_files, CarPieceInfo, MultiCarStream, SplitCarReader};

use std::io::Read;

use cid::Cid;
use integer_encoding::{VarInt, VarIntReader};
use serde::{Deserialize, Serialize};

/// Largest accepted single section. Nodes past this size mean a corrupt or
/// hostile archive.
pub const MAX_SECTION_SIZE: u64 = 32 << 20;

/// Cap applied to every random-access read over the stitched address space.
pub const MAX_READ_LENGTH: u64 = 10 << 20;

const MAX_HEADER_SIZE: u64 = 1 << 20;

#[derive(Debug, thiserror::Error)]
pub enum CarError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid CAR header: {0}")]
    InvalidHeader(String),
    #[error("CAR file version must be 1, found {0}")]
    UnsupportedVersion(u64),
    #[error("expected a single root, found {0}")]
    RootCount(usize),
    #[error("section of {0} bytes exceeds the {MAX_SECTION_SIZE} byte limit")]
    SectionTooLarge(u64),
    #[error("truncated section at offset {0}")]
    TruncatedSection(u64),
    #[error("invalid cid at offset {offset}: {source}")]
    Cid {
        offset: u64,
        source: cid::Error,
    },
    #[error("archive piece unavailable: {0}")]
    PieceUnavailable(String),
    #[error("split pieces overlap: {0}")]
    PieceOverlap(String),
    #[error("no Block node found while probing piece {0}")]
    NoBlockInPiece(String),
    #[error("read at {offset} beyond archive end ({len})")]
    OutOfBounds { offset: u64, len: u64 },
}

impl From<crate::fetch::FetchError> for CarError {
    fn from(e: crate::fetch::FetchError) -> Self {
        match e {
            crate::fetch::FetchError::Io(io) => Self::Io(io),
            other => Self::PieceUnavailable(other.to_string()),
        }
    }
}

/// CAR file header.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct CarHeader {
    pub roots: Vec<Cid>,
    pub version: u64,
}

impl CarHeader {
    pub fn new(roots: Vec<Cid>, version: u64) -> Self {
        Self { roots, version }
    }

    /// The single root CID. Archives always carry exactly one.
    pub fn single_root(&self) -> Result<Cid, CarError> {
        match self.roots.as_slice() {
            [root] => Ok(*root),
            other => Err(CarError::RootCount(other.len())),
        }
    }

    /// Encoded size of the header on disk, varint length prefix included.
    pub fn encoded_len(&self) -> u64 {
        let body = serde_ipld_dagcbor::to_vec(self).expect("header encoding is infallible");
        (body.len() as u64).required_space() as u64 + body.len() as u64
    }
}

/// One section of a CAR stream: the varint length prefix at `offset`,
/// followed by the CID and the node payload.
#[derive(Debug, Clone)]
pub struct CarSection {
    pub cid: Cid,
    /// Global offset of the section start (the varint prefix).
    pub offset: u64,
    /// Full section length: varint prefix + CID + payload.
    pub section_len: u64,
    pub data: Vec<u8>,
}

/// Like [`CarSection`] without the payload.
#[derive(Debug, Clone, Copy)]
pub struct SectionInfo {
    pub cid: Cid,
    pub offset: u64,
    pub section_len: u64,
}

/// Lazy, restartable section reader over any byte stream.
pub struct CarStream<R> {
    reader: R,
    header: CarHeader,
    header_size: u64,
    position: u64,
}

impl<R: Read> CarStream<R> {
    pub fn new(mut reader: R) -> Result<Self, CarError> {
        let (header, header_size) = read_header(&mut reader)?;
        Ok(Self {
            reader,
            header,
            header_size,
            position: header_size,
        })
    }

    pub fn header(&self) -> &CarHeader {
        &self.header
    }

    /// Byte size of the container header; equals the offset of the first
    /// section.
    pub fn header_size(&self) -> u64 {
        self.header_size
    }

    /// Global offset of the next section.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn root(&self) -> Result<Cid, CarError> {
        self.header.single_root()
    }

    fn read_section_prefix(&mut self) -> Result<Option<(u64, u64)>, CarError> {
        let offset = self.position;
        let body_len: u64 = match self.reader.read_varint() {
            Ok(l) => l,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if body_len == 0 || body_len > MAX_SECTION_SIZE {
            return Err(CarError::SectionTooLarge(body_len));
        }
        Ok(Some((offset, body_len)))
    }

    /// Next `(cid, section_length, payload)` triple, or `None` at a clean
    /// end of stream. Mid-section EOF is an error.
    pub fn next_section(&mut self) -> Result<Option<CarSection>, CarError> {
        let section = read_section_from(&mut self.reader, self.position)?;
        if let Some(section) = &section {
            self.position = section.offset + section.section_len;
        }
        Ok(section)
    }

    /// Advance past the next section, returning only its CID and length.
    pub fn next_info(&mut self) -> Result<Option<SectionInfo>, CarError> {
        let Some((offset, body_len)) = self.read_section_prefix()? else {
            return Ok(None);
        };
        let cid = Cid::read_bytes(&mut self.reader)
            .map_err(|source| CarError::Cid { offset, source })?;
        let cid_len = cid.encoded_len() as u64;
        let remaining = body_len
            .checked_sub(cid_len)
            .ok_or(CarError::TruncatedSection(offset))?;
        let skipped = std::io::copy(
            &mut self.reader.by_ref().take(remaining),
            &mut std::io::sink(),
        )?;
        if skipped != remaining {
            return Err(CarError::TruncatedSection(offset));
        }
        let section_len = body_len.required_space() as u64 + body_len;
        self.position = offset + section_len;
        Ok(Some(SectionInfo {
            cid,
            offset,
            section_len,
        }))
    }
}

/// Read one full section at global `offset`, or `None` at a clean end of
/// stream. Shared by the single-stream and multi-piece readers.
pub(crate) fn read_section_from<R: Read>(
    reader: &mut R,
    offset: u64,
) -> Result<Option<CarSection>, CarError> {
    let body_len: u64 = match reader.read_varint() {
        Ok(l) => l,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if body_len == 0 || body_len > MAX_SECTION_SIZE {
        return Err(CarError::SectionTooLarge(body_len));
    }
    let mut body = vec![0u8; body_len as usize];
    reader
        .read_exact(&mut body)
        .map_err(|_| CarError::TruncatedSection(offset))?;
    let mut cursor = std::io::Cursor::new(&body);
    let cid = Cid::read_bytes(&mut cursor).map_err(|source| CarError::Cid { offset, source })?;
    let data = body.split_off(cursor.position() as usize);
    let section_len = body_len.required_space() as u64 + body_len;
    Ok(Some(CarSection {
        cid,
        offset,
        section_len,
        data,
    }))
}

fn read_header<R: Read>(reader: &mut R) -> Result<(CarHeader, u64), CarError> {
    let header_len: u64 = reader
        .read_varint()
        .map_err(|e| CarError::InvalidHeader(format!("length prefix: {e}")))?;
    if header_len == 0 || header_len > MAX_HEADER_SIZE {
        return Err(CarError::InvalidHeader(format!(
            "implausible header length {header_len}"
        )));
    }
    let mut buf = vec![0u8; header_len as usize];
    reader
        .read_exact(&mut buf)
        .map_err(|e| CarError::InvalidHeader(format!("truncated header: {e}")))?;
    let header: CarHeader = serde_ipld_dagcbor::from_slice(&buf)
        .map_err(|e| CarError::InvalidHeader(e.to_string()))?;
    if header.version != 1 {
        return Err(CarError::UnsupportedVersion(header.version));
    }
    if header.roots.is_empty() {
        return Err(CarError::InvalidHeader("empty roots".into()));
    }
    let header_size = header_len.required_space() as u64 + header_len;
    Ok((header, header_size))
}

/// Section iterator over an in-memory window of the archive. Used for
/// prefetch windows and piece probing, where the window may end mid-section;
/// truncation terminates iteration instead of failing.
pub struct SectionCursor<'a> {
    buf: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> SectionCursor<'a> {
    pub fn new(buf: &'a [u8], base: u64) -> Self {
        Self { buf, pos: 0, base }
    }

    /// If the window starts with a CAR header, consume it.
    pub fn strip_header(&mut self) -> Option<CarHeader> {
        let mut reader = &self.buf[self.pos..];
        let before = reader.len();
        match read_header(&mut reader) {
            Ok((header, _)) => {
                self.pos += before - reader.len();
                Some(header)
            }
            Err(_) => None,
        }
    }

    pub fn next_section(&mut self) -> Result<Option<(SectionInfo, &'a [u8])>, CarError> {
        let Some((body_len, varint_len)) = u64::decode_var(&self.buf[self.pos..]) else {
            return Ok(None);
        };
        if body_len == 0 || body_len > MAX_SECTION_SIZE {
            return Err(CarError::SectionTooLarge(body_len));
        }
        let body_start = self.pos + varint_len;
        let body_end = body_start + body_len as usize;
        if body_end > self.buf.len() {
            // Partial window; the remainder belongs to the next read.
            return Ok(None);
        }
        let offset = self.base + self.pos as u64;
        let body = &self.buf[body_start..body_end];
        let mut cursor = std::io::Cursor::new(body);
        let cid = Cid::read_bytes(&mut cursor).map_err(|source| CarError::Cid { offset, source })?;
        let data = &body[cursor.position() as usize..];
        self.pos = body_end;
        Ok(Some((
            SectionInfo {
                cid,
                offset,
                section_len: varint_len as u64 + body_len,
            },
            data,
        )))
    }
}

/// Parse one full section out of an exact byte buffer, as read back through
/// an index `(offset, size)` pair.
pub fn parse_section(buf: &[u8], offset: u64) -> Result<(Cid, &[u8]), CarError> {
    let mut cursor = SectionCursor::new(buf, offset);
    match cursor.next_section()? {
        Some((info, data)) if info.section_len as usize == buf.len() => Ok((info.cid, data)),
        _ => Err(CarError::TruncatedSection(offset)),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use integer_encoding::VarIntWriter;
    use std::io::Write;

    /// Serialize a CAR from `(cid, payload)` pairs, for test fixtures.
    pub fn write_car(root: Cid, sections: &[(Cid, Vec<u8>)]) -> Vec<u8> {
        let mut out = Vec::new();
        let header = serde_ipld_dagcbor::to_vec(&CarHeader::new(vec![root], 1)).unwrap();
        out.write_varint(header.len()).unwrap();
        out.write_all(&header).unwrap();
        for (cid, data) in sections {
            let body_len = cid.encoded_len() + data.len();
            out.write_varint(body_len).unwrap();
            cid.write_bytes(&mut out).unwrap();
            out.write_all(data).unwrap();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::testing::write_car;
    use super::*;
    use crate::dag;

    fn sample_sections() -> (Cid, Vec<(Cid, Vec<u8>)>) {
        let payloads: Vec<Vec<u8>> = (0..4u8)
            .map(|i| dag::encode(&dag::DataFrame::wrap(vec![i; 16])).unwrap())
            .collect();
        let sections: Vec<(Cid, Vec<u8>)> = payloads
            .into_iter()
            .map(|p| (dag::cid_for(&p), p))
            .collect();
        (sections[0].0, sections)
    }

    #[test]
    fn stream_yields_sections_with_global_offsets() {
        let (root, sections) = sample_sections();
        let bytes = write_car(root, &sections);
        let mut stream = CarStream::new(&bytes[..]).unwrap();
        assert_eq!(stream.root().unwrap(), root);
        assert_eq!(stream.position(), stream.header_size());

        let mut seen = Vec::new();
        let mut expected_offset = stream.header_size();
        while let Some(section) = stream.next_section().unwrap() {
            assert_eq!(section.offset, expected_offset);
            expected_offset += section.section_len;
            seen.push((section.cid, section.data));
        }
        assert_eq!(seen, sections);
        assert_eq!(expected_offset, bytes.len() as u64);
    }

    #[test]
    fn next_info_skips_payloads() {
        let (root, sections) = sample_sections();
        let bytes = write_car(root, &sections);
        let mut stream = CarStream::new(&bytes[..]).unwrap();
        let mut cids = Vec::new();
        while let Some(info) = stream.next_info().unwrap() {
            cids.push(info.cid);
        }
        assert_eq!(
            cids,
            sections.iter().map(|(c, _)| *c).collect::<Vec<_>>()
        );
    }

    #[test]
    fn mid_section_eof_is_fatal() {
        let (root, sections) = sample_sections();
        let bytes = write_car(root, &sections);
        let truncated = &bytes[..bytes.len() - 3];
        let mut stream = CarStream::new(truncated).unwrap();
        let mut last = Ok(None);
        loop {
            match stream.next_section() {
                Ok(Some(_)) => continue,
                other => {
                    last = other.map(|_| None);
                    break;
                }
            }
        }
        assert!(matches!(last, Err(CarError::TruncatedSection(_))));
    }

    #[test]
    fn multi_root_headers_are_rejected_for_root() {
        let (root, sections) = sample_sections();
        let mut bytes = Vec::new();
        use integer_encoding::VarIntWriter;
        use std::io::Write;
        let header =
            serde_ipld_dagcbor::to_vec(&CarHeader::new(vec![root, sections[1].0], 1)).unwrap();
        bytes.write_varint(header.len()).unwrap();
        bytes.write_all(&header).unwrap();
        let stream = CarStream::new(&bytes[..]).unwrap();
        assert!(matches!(stream.root(), Err(CarError::RootCount(2))));
    }

    #[test]
    fn section_cursor_stops_on_partial_window() {
        let (root, sections) = sample_sections();
        let bytes = write_car(root, &sections);
        let mut cursor = SectionCursor::new(&bytes[..bytes.len() - 5], 0);
        assert!(cursor.strip_header().is_some());
        let mut count = 0;
        while let Some(_section) = cursor.next_section().unwrap() {
            count += 1;
        }
        assert_eq!(count, sections.len() - 1);
    }

    #[test]
    fn parse_section_roundtrip() {
        let (root, sections) = sample_sections();
        let bytes = write_car(root, &sections);
        let mut stream = CarStream::new(&bytes[..]).unwrap();
        let first = stream.next_section().unwrap().unwrap();
        let raw = &bytes[first.offset as usize..(first.offset + first.section_len) as usize];
        let (cid, data) = parse_section(raw, first.offset).unwrap();
        assert_eq!(cid, first.cid);
        assert_eq!(data, &first.data[..]);
    }
}
