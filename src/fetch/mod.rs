// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Byte sources behind archive pieces and index files.
//!
//! A [`SectionSource`] is a random-access, read-only view of one archive
//! piece. Local paths are served straight from the filesystem; `http(s)`
//! URIs are served with ranged requests and bounded retry. `ipfs://`,
//! `filecoin://` and bare-CID URIs belong to the external retrieval client
//! and are reported as unavailable here.

pub mod http;

pub use http::HttpSource;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use positioned_io::ReadAt;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http error: {0}")]
    Http(String),
    #[error("source does not support ranged reads: {0}")]
    RangesUnsupported(String),
    #[error("unsupported uri (requires external retrieval client): {0}")]
    UnsupportedUri(String),
    #[error("background read task failed: {0}")]
    TaskJoin(String),
}

impl FetchError {
    /// Transient errors are worth a bounded retry; everything else fails the
    /// read immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

/// Random-access view of one archive piece.
#[async_trait::async_trait]
pub trait SectionSource: Send + Sync {
    /// Total length of the piece in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-readable origin, for logs.
    fn describe(&self) -> String;

    /// Read up to `len` bytes at `offset`. Reads past the end of the piece
    /// are clamped, not errors; callers observe the shorter buffer.
    async fn read_at(&self, offset: u64, len: usize) -> Result<Bytes, FetchError>;
}

/// A piece on the local filesystem.
pub struct LocalFileSource {
    file: Arc<std::fs::File>,
    len: u64,
    path: PathBuf,
}

impl LocalFileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FetchError> {
        let path = path.as_ref().to_owned();
        let file = std::fs::File::open(&path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Arc::new(file),
            len,
            path,
        })
    }
}

#[async_trait::async_trait]
impl SectionSource for LocalFileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn read_at(&self, offset: u64, len: usize) -> Result<Bytes, FetchError> {
        if offset >= self.len {
            return Ok(Bytes::new());
        }
        let len = len.min((self.len - offset) as usize);
        let file = self.file.clone();
        let buf = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, std::io::Error> {
            let mut buf = vec![0u8; len];
            file.read_exact_at(offset, &mut buf)?;
            Ok(buf)
        })
        .await
        .map_err(|e| FetchError::TaskJoin(e.to_string()))??;
        Ok(Bytes::from(buf))
    }
}

/// Open a piece URI as a [`SectionSource`].
pub async fn open_source(uri: &str) -> Result<Arc<dyn SectionSource>, FetchError> {
    if let Some(rest) = uri.strip_prefix("file://") {
        return Ok(Arc::new(LocalFileSource::open(rest)?));
    }
    if uri.starts_with("http://") || uri.starts_with("https://") {
        return Ok(Arc::new(HttpSource::open(uri).await?));
    }
    if uri.starts_with("ipfs://") || uri.starts_with("filecoin://") {
        return Err(FetchError::UnsupportedUri(uri.to_owned()));
    }
    if looks_like_cid(uri) {
        return Err(FetchError::UnsupportedUri(uri.to_owned()));
    }
    Ok(Arc::new(LocalFileSource::open(uri)?))
}

/// Resolve an index URI to a local path, downloading remote URIs into
/// `cache_dir` once. Sealed indexes are random-access structures; a network
/// round-trip inside every bucket probe is not serving anyone, so remote
/// copies are materialised before being memory-mapped.
pub async fn materialize(uri: &str, cache_dir: &Path) -> Result<PathBuf, FetchError> {
    if let Some(rest) = uri.strip_prefix("file://") {
        return Ok(PathBuf::from(rest));
    }
    if uri.starts_with("http://") || uri.starts_with("https://") {
        let name = uri.rsplit('/').next().unwrap_or("index");
        let dest = cache_dir.join(name);
        if dest.exists() {
            return Ok(dest);
        }
        std::fs::create_dir_all(cache_dir)?;
        http::download(uri, &dest).await?;
        return Ok(dest);
    }
    if uri.starts_with("ipfs://") || uri.starts_with("filecoin://") || looks_like_cid(uri) {
        return Err(FetchError::UnsupportedUri(uri.to_owned()));
    }
    Ok(PathBuf::from(uri))
}

fn looks_like_cid(uri: &str) -> bool {
    !uri.contains('/') && !uri.contains('.') && cid::Cid::try_from(uri).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_source_clamps_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("piece.bin");
        std::fs::write(&path, b"0123456789").unwrap();
        let src = LocalFileSource::open(&path).unwrap();
        assert_eq!(src.len(), 10);
        assert_eq!(&src.read_at(0, 4).await.unwrap()[..], b"0123");
        assert_eq!(&src.read_at(8, 100).await.unwrap()[..], b"89");
        assert!(src.read_at(10, 1).await.unwrap().is_empty());
    }

    #[test]
    fn cid_uris_are_recognised() {
        assert!(looks_like_cid(
            "bafyreidwx2fvfdiaox32v2wnn6dxpjefikmtouyl7bwdsctrc5ymncbvuq"
        ));
        assert!(!looks_like_cid("epoch-0.car"));
        assert!(!looks_like_cid("/tmp/epoch-0.car"));
    }
}
