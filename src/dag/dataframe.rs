// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::VecDeque;
use std::future::Future;

use cid::Cid;
use crc::Crc;

use super::{DataFrame, NodeError};

/// Upper bound on frames in one chain. Chains this long do not occur in
/// practice; the bound keeps a corrupt `next` graph from looping forever.
pub const MAX_CHAIN_FRAMES: usize = 1 << 16;

const CRC64: Crc<u64> = Crc::<u64>::new(&crc::CRC_64_GO_ISO);

/// Checksum used by DataFrame chains.
pub fn checksum(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

pub fn verify_hash(data: &[u8], declared: u64) -> Result<(), NodeError> {
    let computed = checksum(data);
    if computed != declared {
        return Err(NodeError::HashMismatch { declared, computed });
    }
    Ok(())
}

/// Fetch callback resolving a frame link to the decoded frame.
pub trait FrameFetch<E> {
    fn get(&self, cid: Cid) -> impl Future<Output = Result<DataFrame, E>> + Send;
}

impl<F, Fut, E> FrameFetch<E> for F
where
    F: Fn(Cid) -> Fut,
    Fut: Future<Output = Result<DataFrame, E>> + Send,
{
    fn get(&self, cid: Cid) -> impl Future<Output = Result<DataFrame, E>> + Send {
        self(cid)
    }
}

/// Walk a DataFrame chain from its first frame, concatenating payloads in
/// declared index order, and verify the declared checksum over the result.
///
/// Traversal is an explicit worklist over `next` links; each frame's links
/// are appended in order, so chains and fan-outs both reassemble in write
/// order even before the index sort.
pub async fn reassemble<E, F>(first: &DataFrame, fetch: F) -> Result<Vec<u8>, E>
where
    E: From<NodeError>,
    F: FrameFetch<E>,
{
    if first.is_complete() {
        if let Some(declared) = first.hash {
            verify_hash(&first.data, declared)?;
        }
        return Ok(first.data.to_vec());
    }

    let mut frames: Vec<(Option<u64>, Vec<u8>)> =
        vec![(first.index, first.data.to_vec())];
    let mut worklist: VecDeque<Cid> = first.next.iter().flatten().copied().collect();

    while let Some(link) = worklist.pop_front() {
        if frames.len() >= MAX_CHAIN_FRAMES {
            return Err(NodeError::ChainTooLong(MAX_CHAIN_FRAMES).into());
        }
        let frame = fetch.get(link).await?;
        worklist.extend(frame.next.iter().flatten().copied());
        frames.push((frame.index, frame.data.into_vec()));
    }

    if let Some(total) = first.total {
        if frames.len() as u64 != total {
            return Err(NodeError::ChainLengthMismatch {
                declared: total,
                assembled: frames.len() as u64,
            }
            .into());
        }
    }

    // The position index, when declared, is authoritative over link order.
    if frames.iter().all(|(ix, _)| ix.is_some()) {
        frames.sort_by_key(|(ix, _)| ix.unwrap_or(u64::MAX));
    }

    let mut out = Vec::with_capacity(frames.iter().map(|(_, d)| d.len()).sum());
    for (_, data) in frames {
        out.extend_from_slice(&data);
    }

    if let Some(declared) = first.hash {
        verify_hash(&out, declared)?;
    }
    Ok(out)
}
