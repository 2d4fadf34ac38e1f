//! Per-query-kind response aggregates
//!
//! The gatherer fans one query out to N shards and folds the replies,
//! pairwise and in arrival order, into a single aggregate of the matching
//! kind. Each aggregate is a pure reduction step: no I/O, no locking. At
//! most one `merge` may run against a given aggregate at a time.
//!
//! - `ServerTagResponse`: set union of tag names, first-seen order
//! - `ServerInfoResponse`: per-metric metadata, last write wins
//! - `ServerFindResponse`: two-level union by metric name then match path
//! - `ServerFetchResponse`: series union keyed by name and requested window,
//!   with gap-filling of series seen on more than one replica

mod fetch;
mod find;
mod info;
mod tag;

pub use fetch::{merge_fetch_responses, FetchCoordinates, ServerFetchResponse};
pub use find::{MatchKey, ServerFindResponse};
pub use info::ServerInfoResponse;
pub use tag::ServerTagResponse;

use crate::errors::Errors;
use crate::observer::{MergeObserver, TracingObserver};
use crate::stats::Stats;
use serde::{Deserialize, Serialize};

/// Query kinds served by the zipper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Tag,
    Info,
    Find,
    Fetch,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Tag => "tag",
            QueryKind::Info => "info",
            QueryKind::Find => "find",
            QueryKind::Fetch => "fetch",
        }
    }
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

static DEFAULT_OBSERVER: TracingObserver = TracingObserver::DEFAULT;

/// Per-query context threaded through every merge. Affects diagnostics only.
#[derive(Clone, Copy)]
pub struct MergeContext<'a> {
    pub uuid: &'a str,
    pub observer: &'a dyn MergeObserver,
}

impl<'a> MergeContext<'a> {
    pub fn new(uuid: &'a str, observer: &'a dyn MergeObserver) -> Self {
        MergeContext { uuid, observer }
    }

    /// Context that reports through `tracing`
    pub fn traced(uuid: &'a str) -> Self {
        MergeContext {
            uuid,
            observer: &DEFAULT_OBSERVER,
        }
    }
}

impl std::fmt::Debug for MergeContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeContext")
            .field("uuid", &self.uuid)
            .finish_non_exhaustive()
    }
}

/// Common capability of every response aggregate.
pub trait MergeResponse: Sized {
    const KIND: QueryKind;

    /// Shard the aggregate originated from (empty when unknown)
    fn server(&self) -> &str;

    fn errors(&self) -> &Errors;

    fn errors_mut(&mut self) -> &mut Errors;

    /// Diagnostic counters, for kinds that carry them
    fn stats_mut(&mut self) -> Option<&mut Stats> {
        None
    }

    /// Fold `other` into `self` and return the accumulated errors.
    fn merge(&mut self, other: Self, ctx: &MergeContext<'_>) -> &Errors;
}
