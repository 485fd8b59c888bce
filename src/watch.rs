// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Config directory watcher.
//!
//! Scans the watched directories on an interval and diffs against the last
//! snapshot, emitting create, modify and remove events (a rename shows up
//! as remove + create). A failed load logs and leaves the previously
//! installed handler serving; concurrent events for the same path coalesce
//! through the in-flight set.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::NodeCache;
use crate::epoch::{EpochConfig, EpochHandler};
use crate::metrics::metrics;
use crate::multi_epoch::MultiEpoch;

pub const WATCH_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
enum WatchEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
}

pub struct WatcherConfig {
    pub dirs: Vec<PathBuf>,
    pub include: Option<glob::Pattern>,
    pub exclude: Option<glob::Pattern>,
    pub cache_dir: PathBuf,
}

impl WatcherConfig {
    fn matches(&self, path: &Path) -> bool {
        if !EpochConfig::is_config_file(path) {
            return false;
        }
        let name = path.to_string_lossy();
        if let Some(include) = &self.include {
            if !include.matches(&name) {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude {
            if exclude.matches(&name) {
                return false;
            }
        }
        true
    }

    fn scan(&self) -> HashMap<PathBuf, SystemTime> {
        let mut seen = HashMap::new();
        for dir in &self.dirs {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "config dir scan failed");
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() || !self.matches(&path) {
                    continue;
                }
                let mtime = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                seen.insert(path, mtime);
            }
        }
        seen
    }
}

fn diff(
    known: &HashMap<PathBuf, SystemTime>,
    current: &HashMap<PathBuf, SystemTime>,
) -> Vec<WatchEvent> {
    let mut events = Vec::new();
    for (path, mtime) in current {
        match known.get(path) {
            None => events.push(WatchEvent::Created(path.clone())),
            Some(old) if old != mtime => events.push(WatchEvent::Modified(path.clone())),
            Some(_) => {}
        }
    }
    for path in known.keys() {
        if !current.contains_key(path) {
            events.push(WatchEvent::Removed(path.clone()));
        }
    }
    events
}

/// Run the watch loop until cancelled. Event dispatch is bounded by
/// `load_concurrency`, with per-path in-flight dedup.
pub async fn run(
    multi: Arc<MultiEpoch>,
    cache: Arc<NodeCache>,
    config: WatcherConfig,
    load_concurrency: usize,
    ct: CancellationToken,
) {
    let config = Arc::new(config);
    let in_flight: Arc<Mutex<HashSet<PathBuf>>> = Arc::new(Mutex::new(HashSet::new()));
    let limiter = Arc::new(Semaphore::new(load_concurrency.max(1)));
    let mut known = config.scan();
    let mut ticker = tokio::time::interval(WATCH_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!(
        dirs = config.dirs.len(),
        tracked = known.len(),
        "config watcher running"
    );

    loop {
        tokio::select! {
            _ = ct.cancelled() => {
                debug!("config watcher stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        let current = config.scan();
        for event in diff(&known, &current) {
            let path = match &event {
                WatchEvent::Created(p) | WatchEvent::Modified(p) | WatchEvent::Removed(p) => {
                    p.clone()
                }
            };
            if !in_flight.lock().insert(path.clone()) {
                debug!(path = %path.display(), "event for path already in flight");
                continue;
            }
            metrics().watcher_events.inc();
            let multi = multi.clone();
            let cache = cache.clone();
            let config = config.clone();
            let in_flight = in_flight.clone();
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let _permit = limiter.acquire().await.expect("semaphore never closed");
                handle_event(&multi, &cache, &config, event).await;
                in_flight.lock().remove(&path);
            });
        }
        known = current;
    }
}

async fn handle_event(
    multi: &MultiEpoch,
    cache: &Arc<NodeCache>,
    watcher: &WatcherConfig,
    event: WatchEvent,
) {
    match event {
        WatchEvent::Created(path) | WatchEvent::Modified(path) => {
            let config = match EpochConfig::load(&path) {
                Ok(config) => config,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "config rejected, keeping prior state");
                    return;
                }
            };
            let epoch = config.epoch;
            match EpochHandler::open(
                config,
                Some(path.clone()),
                cache.clone(),
                &watcher.cache_dir,
            )
            .await
            {
                Ok(handler) => multi.add_or_replace(Arc::new(handler)),
                Err(e) => {
                    error!(
                        epoch,
                        path = %path.display(),
                        error = %e,
                        "epoch load failed, keeping prior state"
                    );
                }
            }
        }
        WatchEvent::Removed(path) => match multi.remove_by_config_path(&path) {
            Some(epoch) => info!(epoch, path = %path.display(), "epoch dropped with its config"),
            None => debug!(path = %path.display(), "removed file had no loaded epoch"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_reports_all_event_kinds() {
        let mut known = HashMap::new();
        known.insert(PathBuf::from("a.yaml"), SystemTime::UNIX_EPOCH);
        known.insert(PathBuf::from("b.yaml"), SystemTime::UNIX_EPOCH);

        let mut current = HashMap::new();
        current.insert(
            PathBuf::from("a.yaml"),
            SystemTime::UNIX_EPOCH + Duration::from_secs(5),
        );
        current.insert(PathBuf::from("c.yaml"), SystemTime::UNIX_EPOCH);

        let events = diff(&known, &current);
        assert!(events.contains(&WatchEvent::Modified(PathBuf::from("a.yaml"))));
        assert!(events.contains(&WatchEvent::Removed(PathBuf::from("b.yaml"))));
        assert!(events.contains(&WatchEvent::Created(PathBuf::from("c.yaml"))));
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn include_exclude_globs() {
        let dir = tempfile::tempdir().unwrap();
        let config = WatcherConfig {
            dirs: vec![dir.path().to_owned()],
            include: Some(glob::Pattern::new("*epoch-*").unwrap()),
            exclude: Some(glob::Pattern::new("*skip*").unwrap()),
            cache_dir: dir.path().join("cache"),
        };
        assert!(config.matches(Path::new("/x/epoch-1.yaml")));
        assert!(!config.matches(Path::new("/x/epoch-1-skip.yaml")));
        assert!(!config.matches(Path::new("/x/other.yaml")));
        assert!(!config.matches(Path::new("/x/epoch-1.car")));
    }

    #[test]
    fn scan_picks_up_config_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("epoch-0.yaml"), "epoch: 0").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        let config = WatcherConfig {
            dirs: vec![dir.path().to_owned()],
            include: None,
            exclude: None,
            cache_dir: dir.path().join("cache"),
        };
        let seen = config.scan();
        assert_eq!(seen.len(), 1);
        assert!(seen.keys().any(|p| p.ends_with("epoch-0.yaml")));
    }
}
