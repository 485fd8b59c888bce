// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::OnceLock;
use std::time::Instant;

/// Version string of the Solana node software whose RPC surface we mirror.
pub const SOLANA_CORE_VERSION: &str = "2.0.15";

/// Feature-set identifier reported by `getVersion`, matching the
/// [`SOLANA_CORE_VERSION`] release line.
pub const FEATURE_SET: u32 = 607245837;

pub const CHRONICLE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const GIT_COMMIT: &str = git_version::git_version!(
    args = ["--abbrev=40", "--dirty=-modified", "--always"],
    fallback = "unknown"
);

/// Process start stamp, fixed on first access.
pub fn start_time() -> Instant {
    static START: OnceLock<Instant> = OnceLock::new();
    *START.get_or_init(Instant::now)
}

pub fn uptime_seconds() -> u64 {
    start_time().elapsed().as_secs()
}
