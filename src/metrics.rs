// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::OnceLock;

use parking_lot::Mutex;
use prometheus_client::encoding::text;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EpochLabels {
    pub epoch: u64,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct MethodLabels {
    pub method: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StatusLabels {
    pub method: String,
    pub status: String,
}

pub struct Metrics {
    registry: Mutex<Registry>,
    pub epoch_available: Family<EpochLabels, Gauge>,
    pub rpc_requests: Family<MethodLabels, Counter>,
    pub rpc_responses: Family<StatusLabels, Counter>,
    pub cache_hits: Counter,
    pub cache_misses: Counter,
    pub prefetch_windows: Counter,
    pub watcher_events: Counter,
}

/// Process-wide metrics registry. The only global state besides the version
/// string and the start stamp.
pub fn metrics() -> &'static Metrics {
    static METRICS: OnceLock<Metrics> = OnceLock::new();
    METRICS.get_or_init(|| {
        let mut registry = Registry::with_prefix("chronicle");
        let epoch_available = Family::<EpochLabels, Gauge>::default();
        registry.register(
            "epoch_available",
            "Whether the epoch is currently loaded and serving",
            epoch_available.clone(),
        );
        let rpc_requests = Family::<MethodLabels, Counter>::default();
        registry.register("rpc_requests", "RPC requests received", rpc_requests.clone());
        let rpc_responses = Family::<StatusLabels, Counter>::default();
        registry.register(
            "rpc_responses",
            "RPC responses by status class",
            rpc_responses.clone(),
        );
        let cache_hits = Counter::default();
        registry.register("cache_hits", "Node cache hits", cache_hits.clone());
        let cache_misses = Counter::default();
        registry.register("cache_misses", "Node cache misses", cache_misses.clone());
        let prefetch_windows = Counter::default();
        registry.register(
            "prefetch_windows",
            "Parent-to-block prefetch windows read",
            prefetch_windows.clone(),
        );
        let watcher_events = Counter::default();
        registry.register(
            "watcher_events",
            "Config watcher events dispatched",
            watcher_events.clone(),
        );
        Metrics {
            registry: Mutex::new(registry),
            epoch_available,
            rpc_requests,
            rpc_responses,
            cache_hits,
            cache_misses,
            prefetch_windows,
            watcher_events,
        }
    })
}

/// Render the registry in the Prometheus text exposition format.
pub fn encode() -> String {
    let mut out = String::new();
    let registry = metrics().registry.lock();
    // Encoding into a String cannot fail.
    let _ = text::encode(&mut out, &registry);
    out
}
