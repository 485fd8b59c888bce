// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Probe the storage backing each configured epoch: local pieces for
//! existence, HTTP pieces with a ranged HEAD, and deal providers against
//! the allowlist. `ipfs://`/`filecoin://` URIs need the external retrieval
//! client and are reported as unprobeable.

use std::collections::HashSet;
use std::path::PathBuf;

use clap::Args;
use tracing::{info, warn};

use crate::epoch::config::{DealList, EpochConfig, PieceList};
use crate::fetch;

#[derive(Args)]
pub struct CheckDealsArgs {
    /// Epoch config files, or directories of them.
    #[arg(required = true)]
    configs: Vec<PathBuf>,

    /// Comma-separated provider ids to probe; others are skipped.
    #[arg(long, value_delimiter = ',')]
    provider_allowlist: Vec<String>,
}

#[derive(Debug, Default)]
struct Report {
    reachable: u64,
    unreachable: u64,
    skipped: u64,
}

pub async fn run(args: CheckDealsArgs) -> anyhow::Result<()> {
    let allowlist: HashSet<&str> = args
        .provider_allowlist
        .iter()
        .map(String::as_str)
        .collect();
    let mut report = Report::default();

    let mut config_files = Vec::new();
    for input in &args.configs {
        if input.is_dir() {
            for entry in std::fs::read_dir(input)? {
                let path = entry?.path();
                if path.is_file() && EpochConfig::is_config_file(&path) {
                    config_files.push(path);
                }
            }
        } else {
            config_files.push(input.clone());
        }
    }
    config_files.sort();

    for path in &config_files {
        let config = match EpochConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config rejected");
                report.unreachable += 1;
                continue;
            }
        };
        let epoch = config.epoch;

        if let Some(uri) = &config.data.uri {
            probe_uri(epoch, "archive", uri, &mut report).await;
        }
        if let Some(pieces) = &config.data.pieces {
            if let Some(metadata_uri) = &pieces.metadata {
                match PieceList::load(metadata_uri) {
                    Ok(list) => {
                        for piece in &list.pieces {
                            probe_uri(epoch, "piece", piece, &mut report).await;
                        }
                    }
                    Err(e) => {
                        warn!(epoch, error = %e, "piece list unreadable");
                        report.unreachable += 1;
                    }
                }
            }
            if let Some(deals_uri) = &pieces.deals {
                match DealList::load(deals_uri) {
                    Ok(list) => {
                        for deal in &list.deals {
                            if !allowlist.is_empty()
                                && !allowlist.contains(deal.provider.as_str())
                            {
                                report.skipped += 1;
                                continue;
                            }
                            match &deal.url {
                                Some(url) => probe_uri(epoch, "deal", url, &mut report).await,
                                None => {
                                    info!(
                                        epoch,
                                        provider = %deal.provider,
                                        piece = %deal.piece_cid,
                                        "deal has no direct url; needs the retrieval client"
                                    );
                                    report.skipped += 1;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!(epoch, error = %e, "deal list unreadable");
                        report.unreachable += 1;
                    }
                }
            }
        }
    }

    info!(
        reachable = report.reachable,
        unreachable = report.unreachable,
        skipped = report.skipped,
        "check-deals finished"
    );
    anyhow::ensure!(
        report.unreachable == 0,
        "{} source(s) unreachable",
        report.unreachable
    );
    Ok(())
}

async fn probe_uri(epoch: u64, what: &str, uri: &str, report: &mut Report) {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        match fetch::http::probe(uri).await {
            Ok(len) => {
                info!(epoch, what, uri, len, "reachable");
                report.reachable += 1;
            }
            Err(e) => {
                warn!(epoch, what, uri, error = %e, "unreachable");
                report.unreachable += 1;
            }
        }
        return;
    }
    if uri.starts_with("ipfs://") || uri.starts_with("filecoin://") {
        info!(epoch, what, uri, "needs the external retrieval client; skipped");
        report.skipped += 1;
        return;
    }
    let path = uri.strip_prefix("file://").unwrap_or(uri);
    match std::fs::metadata(path) {
        Ok(meta) => {
            info!(epoch, what, uri, len = meta.len(), "reachable");
            report.reachable += 1;
        }
        Err(e) => {
            warn!(epoch, what, uri, error = %e, "unreachable");
            report.unreachable += 1;
        }
    }
}
