// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cache::NodeCache;
use crate::epoch::{EpochConfig, EpochHandler};
use crate::index::SigToEpochReader;
use crate::multi_epoch::{MultiEpoch, ServeOptions};
use crate::rpc::{self, RpcState};
use crate::watch::{self, WatcherConfig};

pub const SIG_TO_EPOCH_FILE: &str = "sig-to-epoch.index";

#[derive(Args)]
pub struct RpcArgs {
    /// Epoch config files, or directories of them.
    #[arg(required = true)]
    configs: Vec<PathBuf>,

    /// JSON-RPC listen address.
    #[arg(long, default_value = "127.0.0.1:7999")]
    listen: SocketAddr,

    /// Streaming-service listen address.
    #[arg(long)]
    grpc_listen: Option<SocketAddr>,

    /// Watch config directories for changes.
    #[arg(long)]
    watch: bool,

    /// Glob that config paths must match.
    #[arg(long)]
    include: Option<String>,

    /// Glob that excludes config paths.
    #[arg(long)]
    exclude: Option<String>,

    /// Proxy unknown methods to this upstream: a URL, or a file holding one.
    #[arg(long)]
    proxy: Option<String>,

    #[arg(long)]
    epoch_search_concurrency: Option<usize>,

    #[arg(long)]
    epoch_load_concurrency: Option<usize>,

    /// Node cache budget in MiB.
    #[arg(long, default_value_t = 256)]
    max_cache: usize,

    /// Serve getSignaturesForAddress without meta enrichment.
    #[arg(long)]
    gsfa_only_signatures: bool,

    /// Directory holding the cross-epoch signature-to-epoch index.
    #[arg(long)]
    sig_to_epoch: Option<PathBuf>,

    /// Directory for downloaded remote indexes.
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

pub async fn run(args: RpcArgs) -> anyhow::Result<()> {
    let include = args
        .include
        .as_deref()
        .map(glob::Pattern::new)
        .transpose()
        .context("--include")?;
    let exclude = args
        .exclude
        .as_deref()
        .map(glob::Pattern::new)
        .transpose()
        .context("--exclude")?;

    let config_files = discover_configs(&args.configs, include.as_ref(), exclude.as_ref())?;
    anyhow::ensure!(!config_files.is_empty(), "no epoch configs found");
    info!(count = config_files.len(), "epoch configs discovered");

    let mut parsed = Vec::with_capacity(config_files.len());
    for path in &config_files {
        parsed.push((path.clone(), EpochConfig::load(path)?));
    }
    {
        let mut seen = std::collections::HashSet::new();
        for (path, config) in &parsed {
            anyhow::ensure!(
                seen.insert(config.epoch),
                "epoch {} configured more than once (at {})",
                config.epoch,
                path.display()
            );
        }
    }

    let options = ServeOptions {
        gsfa_only_signatures: args.gsfa_only_signatures,
        epoch_search_concurrency: args
            .epoch_search_concurrency
            .unwrap_or_else(num_cpus::get),
        epoch_load_concurrency: args.epoch_load_concurrency.unwrap_or_else(num_cpus::get),
    };
    let sig_to_epoch = match &args.sig_to_epoch {
        Some(dir) => Some(
            SigToEpochReader::open(dir.join(SIG_TO_EPOCH_FILE))
                .context("--sig-to-epoch index")?,
        ),
        None => None,
    };
    let cache = Arc::new(NodeCache::with_budget(args.max_cache << 20));
    let cache_dir = args
        .cache_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("chronicle"));
    let multi = Arc::new(MultiEpoch::new(options, sig_to_epoch, cache.clone()));

    // Startup load, bounded by the load concurrency.
    let load_concurrency = multi.options().epoch_load_concurrency.max(1);
    let loads: Vec<anyhow::Result<()>> = futures::stream::iter(parsed.into_iter().map(
        |(path, config)| {
            let multi = multi.clone();
            let cache = cache.clone();
            let cache_dir = cache_dir.clone();
            async move {
                let epoch = config.epoch;
                let handler =
                    EpochHandler::open(config, Some(path.clone()), cache, &cache_dir)
                        .await
                        .with_context(|| format!("loading epoch {epoch}"))?;
                multi.add_or_replace(Arc::new(handler));
                Ok(())
            }
        },
    ))
    .buffer_unordered(load_concurrency)
    .collect()
    .await;
    for load in loads {
        if let Err(e) = load {
            error!(error = %e, "epoch failed to load");
            return Err(e);
        }
    }
    info!(epochs = multi.count_epochs(), "all epochs loaded");

    let proxy = match &args.proxy {
        None => None,
        Some(target) if target.starts_with("http://") || target.starts_with("https://") => {
            Some(target.clone())
        }
        Some(file) => Some(
            std::fs::read_to_string(file)
                .with_context(|| format!("--proxy file {file}"))?
                .trim()
                .to_owned(),
        ),
    };

    let shutdown = CancellationToken::new();
    let state = Arc::new(RpcState {
        multi: multi.clone(),
        proxy,
        shutdown: shutdown.clone(),
    });

    let mut tasks = tokio::task::JoinSet::new();
    {
        let state = state.clone();
        let ct = shutdown.clone();
        let listen = args.listen;
        tasks.spawn(async move { rpc::serve(state, listen, ct).await });
    }
    if let Some(addr) = args.grpc_listen {
        let state = state.clone();
        let ct = shutdown.clone();
        tasks.spawn(async move { rpc::stream::serve(state, addr, ct).await });
    }
    if args.watch {
        let dirs: Vec<PathBuf> = args
            .configs
            .iter()
            .filter(|p| p.is_dir())
            .cloned()
            .collect();
        if dirs.is_empty() {
            warn!("--watch given but no config directories to watch");
        } else {
            let multi = multi.clone();
            let cache = cache.clone();
            let ct = shutdown.clone();
            let watcher = WatcherConfig {
                dirs,
                include,
                exclude,
                cache_dir: cache_dir.clone(),
            };
            tasks.spawn(async move {
                watch::run(multi, cache, watcher, load_concurrency, ct).await;
                Ok(())
            });
        }
    }

    // TTL janitor for entries no request touches again.
    {
        let cache = cache.clone();
        let ct = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = ct.cancelled() => return,
                    _ = ticker.tick() => cache.purge_expired(),
                }
            }
        });
    }

    shutdown_on_signal(shutdown.clone());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = %e, "listener failed");
                shutdown.cancel();
                return Err(e);
            }
            Err(e) => {
                shutdown.cancel();
                return Err(anyhow::anyhow!("task panicked: {e}"));
            }
        }
    }
    Ok(())
}

fn shutdown_on_signal(ct: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut term =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("sigterm handler");
            tokio::select! {
                _ = ctrl_c => info!("received SIGINT"),
                _ = term.recv() => info!("received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received ctrl-c");
        }
        ct.cancel();
    });
}

fn discover_configs(
    inputs: &[PathBuf],
    include: Option<&glob::Pattern>,
    exclude: Option<&glob::Pattern>,
) -> anyhow::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for input in inputs {
        if input.is_dir() {
            for entry in std::fs::read_dir(input)? {
                let path = entry?.path();
                if path.is_file() && EpochConfig::is_config_file(&path) {
                    out.push(path);
                }
            }
        } else {
            out.push(input.clone());
        }
    }
    out.retain(|path| {
        let name = path.to_string_lossy();
        include.is_none_or(|p| p.matches(&name)) && !exclude.is_some_and(|p| p.matches(&name))
    });
    out.sort();
    out.dedup();
    Ok(out)
}
