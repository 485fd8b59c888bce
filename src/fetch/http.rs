// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::Path;
use std::sync::OnceLock;

use backon::{ExponentialBuilder, Retryable};
use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use super::{FetchError, SectionSource};

const RETRY_ATTEMPTS: usize = 3;

fn client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("default reqwest client")
    })
}

fn backoff() -> ExponentialBuilder {
    ExponentialBuilder::default().with_max_times(RETRY_ATTEMPTS)
}

/// An archive piece behind an `http(s)` URI supporting ranged requests.
pub struct HttpSource {
    url: String,
    len: u64,
}

impl HttpSource {
    pub async fn open(url: &str) -> Result<Self, FetchError> {
        let url_owned = url.to_owned();
        let len = (|| async { probe_length(&url_owned).await })
            .retry(backoff())
            .when(FetchError::is_transient)
            .await?;
        Ok(Self {
            url: url.to_owned(),
            len,
        })
    }

    async fn read_range(&self, offset: u64, len: usize) -> Result<Bytes, FetchError> {
        let end = offset + len as u64 - 1;
        let resp = client()
            .get(&self.url)
            .header(reqwest::header::RANGE, format!("bytes={offset}-{end}"))
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;
        match resp.status() {
            reqwest::StatusCode::PARTIAL_CONTENT => {}
            reqwest::StatusCode::OK => {
                return Err(FetchError::RangesUnsupported(self.url.clone()));
            }
            status => {
                return Err(FetchError::Http(format!("{}: status {status}", self.url)));
            }
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;
        Ok(body)
    }
}

#[async_trait::async_trait]
impl SectionSource for HttpSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn read_at(&self, offset: u64, len: usize) -> Result<Bytes, FetchError> {
        if offset >= self.len {
            return Ok(Bytes::new());
        }
        let len = len.min((self.len - offset) as usize);
        (|| async { self.read_range(offset, len).await })
            .retry(backoff())
            .when(FetchError::is_transient)
            .await
    }
}

async fn probe_length(url: &str) -> Result<u64, FetchError> {
    let resp = client()
        .head(url)
        .send()
        .await
        .map_err(|e| FetchError::Http(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(FetchError::Http(format!(
            "{url}: HEAD status {}",
            resp.status()
        )));
    }
    resp.content_length()
        .ok_or_else(|| FetchError::RangesUnsupported(format!("{url}: no content length")))
}

/// Probe a URI for reachability without transferring the body.
pub async fn probe(url: &str) -> Result<u64, FetchError> {
    probe_length(url).await
}

/// Stream a remote file to `dest`, atomically via a sibling temp file.
pub async fn download(url: &str, dest: &Path) -> Result<(), FetchError> {
    let resp = client()
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::Http(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(FetchError::Http(format!("{url}: status {}", resp.status())));
    }
    let tmp = dest.with_extension("part");
    let mut out = tokio::fs::File::create(&tmp).await?;
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| FetchError::Http(e.to_string()))?;
        out.write_all(&chunk).await?;
    }
    out.flush().await?;
    drop(out);
    tokio::fs::rename(&tmp, dest).await?;
    Ok(())
}
