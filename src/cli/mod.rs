// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The `chronicle` command line: `rpc` serves, `index` builds the sealed
//! index family, `check-deals` probes archive sources.

mod check_deals_cmd;
mod index_cmd;
mod rpc_cmd;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chronicle", version, about = "Historical Solana ledger archive server")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the JSON-RPC and streaming listeners over a set of epochs.
    Rpc(rpc_cmd::RpcArgs),
    /// Build one of the sealed index files from an epoch archive.
    Index(index_cmd::IndexArgs),
    /// Probe the storage backing each configured epoch.
    CheckDeals(check_deals_cmd::CheckDealsArgs),
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Rpc(args) => rpc_cmd::run(args).await,
            Command::Index(args) => index_cmd::run(args).await,
            Command::CheckDeals(args) => check_deals_cmd::run(args).await,
        }
    }
}
