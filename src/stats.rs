//! Per-shard diagnostic counters
//!
//! Counters add, server lists concatenate. Merged in lock-step with every
//! response aggregate.

use crate::errors::ZipperError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    pub servers: Vec<String>,
    pub failed_servers: Vec<String>,
    pub memory_usage: u64,
    pub zipper_requests: u64,
    pub total_metrics_count: u64,
    pub timeouts: u64,
    pub find_errors: u64,
    pub render_errors: u64,
    pub info_errors: u64,
    pub search_requests: u64,
    pub search_cache_hits: u64,
    pub search_cache_misses: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stats for a single contacted server
    pub fn for_server(server: impl Into<String>) -> Self {
        Stats {
            servers: vec![server.into()],
            zipper_requests: 1,
            ..Default::default()
        }
    }

    /// Count a shard that produced no usable reply.
    pub fn record_failure(&mut self, server: &str, err: &ZipperError) {
        self.failed_servers
            .push(err.server().unwrap_or(server).to_string());
        if matches!(err, ZipperError::Timeout { .. }) {
            self.timeouts += 1;
        }
    }

    pub fn merge(&mut self, other: &Stats) {
        self.servers.extend(other.servers.iter().cloned());
        self.failed_servers
            .extend(other.failed_servers.iter().cloned());

        self.memory_usage += other.memory_usage;
        self.zipper_requests += other.zipper_requests;
        self.total_metrics_count += other.total_metrics_count;
        self.timeouts += other.timeouts;
        self.find_errors += other.find_errors;
        self.render_errors += other.render_errors;
        self.info_errors += other.info_errors;
        self.search_requests += other.search_requests;
        self.search_cache_hits += other.search_cache_hits;
        self.search_cache_misses += other.search_cache_misses;
        self.cache_hits += other.cache_hits;
        self.cache_misses += other.cache_misses;
    }
}

/// Merge `other` into `first` when the shard reported stats at all.
pub(crate) fn merge_optional(first: &mut Option<Stats>, other: Option<&Stats>) {
    if let Some(other) = other {
        first.get_or_insert_with(Stats::new).merge(other);
    }
}
