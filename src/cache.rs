// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Content-addressed node payload cache.
//!
//! Keys are CIDs, so an entry can never go stale; eviction is purely about
//! the byte budget and the TTL. One cache is shared by every epoch handler
//! in the process.

use std::time::{Duration, Instant};

use bytes::Bytes;
use cid::Cid;
use lru::LruCache;
use parking_lot::Mutex;

use crate::metrics::metrics;

pub const DEFAULT_CACHE_BUDGET: usize = 256 << 20;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

struct Entry {
    data: Bytes,
    inserted: Instant,
}

struct Inner {
    map: LruCache<Cid, Entry>,
    bytes: usize,
}

pub struct NodeCache {
    inner: Mutex<Inner>,
    byte_budget: usize,
    ttl: Duration,
}

impl NodeCache {
    pub fn new(byte_budget: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: LruCache::unbounded(),
                bytes: 0,
            }),
            byte_budget,
            ttl,
        }
    }

    pub fn with_budget(byte_budget: usize) -> Self {
        Self::new(byte_budget, DEFAULT_CACHE_TTL)
    }

    /// Insert a payload. Re-inserting a present CID is a no-op: the content
    /// is the same by construction.
    pub fn put(&self, cid: Cid, data: Bytes) {
        if data.len() > self.byte_budget {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.map.contains(&cid) {
            return;
        }
        inner.bytes += data.len();
        inner.map.put(
            cid,
            Entry {
                data,
                inserted: Instant::now(),
            },
        );
        while inner.bytes > self.byte_budget {
            match inner.map.pop_lru() {
                Some((_, evicted)) => inner.bytes -= evicted.data.len(),
                None => break,
            }
        }
    }

    pub fn get(&self, cid: &Cid) -> Option<Bytes> {
        let mut inner = self.inner.lock();
        let hit = match inner.map.get(cid) {
            Some(entry) if entry.inserted.elapsed() <= self.ttl => Some(entry.data.clone()),
            Some(_) => None,
            None => {
                metrics().cache_misses.inc();
                return None;
            }
        };
        match hit {
            Some(data) => {
                metrics().cache_hits.inc();
                Some(data)
            }
            None => {
                // Present but past the TTL; drop it on the way out.
                if let Some(entry) = inner.map.pop(cid) {
                    inner.bytes -= entry.data.len();
                }
                metrics().cache_misses.inc();
                None
            }
        }
    }

    /// Drop every entry past the TTL.
    pub fn purge_expired(&self) {
        let mut inner = self.inner.lock();
        let expired: Vec<Cid> = inner
            .map
            .iter()
            .filter(|(_, e)| e.inserted.elapsed() > self.ttl)
            .map(|(cid, _)| *cid)
            .collect();
        for cid in expired {
            if let Some(entry) = inner.map.pop(&cid) {
                inner.bytes -= entry.data.len();
            }
        }
    }

    pub fn bytes_used(&self) -> usize {
        self.inner.lock().bytes
    }

    pub fn entry_count(&self) -> usize {
        self.inner.lock().map.len()
    }
}

impl Default for NodeCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_BUDGET, DEFAULT_CACHE_TTL)
    }
}
