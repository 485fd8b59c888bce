// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Live reload: dropping an epoch config into a watched directory loads
//! the epoch; deleting the file drops it. Failures leave prior state.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use chronicle::cache::NodeCache;
use chronicle::multi_epoch::{MultiEpoch, ServeOptions};
use chronicle::watch::{self, WatcherConfig};

async fn wait_for<F: Fn() -> bool>(what: &str, cond: F) {
    for _ in 0..150 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test(flavor = "multi_thread")]
async fn config_create_and_remove_drive_the_directory() {
    let dir = tempfile::tempdir().unwrap();
    let watched = dir.path().join("configs");
    std::fs::create_dir_all(&watched).unwrap();

    // Fixture files live outside the watched directory.
    let staging = dir.path().join("staging");
    std::fs::create_dir_all(&staging).unwrap();
    let blocks = common::default_blocks(1_700_000_000);
    let (config_path, _root) = common::build_epoch_dir(&staging, 0, &blocks, None).await;

    let cache = Arc::new(NodeCache::default());
    let multi = Arc::new(MultiEpoch::new(ServeOptions::default(), None, cache.clone()));
    let ct = CancellationToken::new();
    {
        let multi = multi.clone();
        let cache = cache.clone();
        let ct = ct.clone();
        let watcher = WatcherConfig {
            dirs: vec![watched.clone()],
            include: None,
            exclude: None,
            cache_dir: dir.path().join("cache"),
        };
        tokio::spawn(async move {
            watch::run(multi, cache, watcher, 2, ct).await;
        });
    }
    assert_eq!(multi.count_epochs(), 0);

    // A broken config never installs anything.
    let broken = watched.join("broken.yaml");
    std::fs::write(&broken, "epoch: 9\ndata: {}\n").unwrap();
    tokio::time::sleep(watch::WATCH_INTERVAL * 2).await;
    assert_eq!(multi.count_epochs(), 0);

    // Dropping a valid config loads the epoch.
    let target = watched.join("epoch-0.yaml");
    std::fs::copy(&config_path, &target).unwrap();
    wait_for("epoch 0 to load", || multi.count_epochs() == 1).await;
    assert!(multi.get_epoch(0).is_some());
    assert!(multi.handler_for_slot(1).is_ok());

    // Deleting it drops the handler.
    std::fs::remove_file(&target).unwrap();
    wait_for("epoch 0 to unload", || multi.count_epochs() == 0).await;

    ct.cancel();
}
