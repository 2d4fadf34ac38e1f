//! Time-series (fetch) results and the series reconciler
//!
//! Series are identified by name and the *requested* window, never by the
//! data window a shard happens to hold. When two replicas return the same
//! series, [`merge_fetch_responses`] reconciles them:
//!
//! - equal step: the longer record is the base, its NaN gaps are filled from
//!   the other, present samples are never overwritten;
//! - unequal step: the finer record is kept whole and the coarser one is
//!   dropped. No resampling.
//!
//! Fetch merging is not associative across unequal steps: which record wins
//! can depend on fold order once three replicas disagree.

use super::{MergeContext, MergeResponse, QueryKind};
use crate::errors::{Errors, ZipperError};
use crate::protocol::{FetchResponse, MultiFetchResponse};
use crate::stats::{self, Stats};
use ahash::AHashMap;

/// Identity of a logical series within one fetch aggregate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchCoordinates {
    pub name: String,
    pub from: i64,
    pub until: i64,
}

impl FetchCoordinates {
    pub fn of(r: &FetchResponse) -> Self {
        FetchCoordinates {
            name: r.name.clone(),
            from: r.request_start_time,
            until: r.request_stop_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerFetchResponse {
    pub server: String,
    pub response: Option<MultiFetchResponse>,
    pub stats: Option<Stats>,
    pub err: Errors,
}

impl Default for ServerFetchResponse {
    fn default() -> Self {
        ServerFetchResponse {
            server: String::new(),
            response: Some(MultiFetchResponse::default()),
            stats: Some(Stats::new()),
            err: Errors::new(),
        }
    }
}

impl ServerFetchResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_server(server: impl Into<String>, response: MultiFetchResponse) -> Self {
        let server = server.into();
        let mut stats = Stats::for_server(server.clone());
        stats.total_metrics_count = response.metrics.len() as u64;
        ServerFetchResponse {
            server,
            response: Some(response),
            stats: Some(stats),
            err: Errors::new(),
        }
    }

    /// Attach a degraded-but-usable condition.
    pub fn non_fatal_error(mut self, err: ZipperError) -> Self {
        self.err.add(err);
        self
    }

    pub fn series(&self) -> &[FetchResponse] {
        self.response
            .as_ref()
            .map(|r| r.metrics.as_slice())
            .unwrap_or_default()
    }

    /// Fold `second` into this aggregate.
    ///
    /// Series data is left untouched once the accumulated errors are fatal.
    /// A failed series pair is recorded and skipped; the remaining series of
    /// `second` are still merged.
    pub fn merge_fetch(&mut self, second: ServerFetchResponse, ctx: &MergeContext<'_>) -> &Errors {
        let ServerFetchResponse {
            server,
            response,
            stats,
            err,
        } = second;

        if self.server.is_empty() && !server.is_empty() {
            self.server = server;
        }

        stats::merge_optional(&mut self.stats, stats.as_ref());
        self.err.merge(&err);

        if self.err.have_fatal_errors() {
            return &self.err;
        }

        let Some(response) = response else {
            return &self.err;
        };

        let metrics = &mut self.response.get_or_insert_with(Default::default).metrics;
        let mut index: AHashMap<FetchCoordinates, usize> = metrics
            .iter()
            .enumerate()
            .map(|(i, m)| (FetchCoordinates::of(m), i))
            .collect();

        let mut failures = Errors::new();
        for mut series in response.metrics {
            let key = FetchCoordinates::of(&series);
            match index.get(&key) {
                Some(&j) => {
                    let errs = merge_fetch_responses(&mut metrics[j], &mut series, ctx);
                    failures.merge(&errs);
                }
                None => {
                    index.insert(key, metrics.len());
                    metrics.push(series);
                }
            }
        }

        self.err.merge(&failures);
        &self.err
    }
}

impl MergeResponse for ServerFetchResponse {
    const KIND: QueryKind = QueryKind::Fetch;

    fn server(&self) -> &str {
        &self.server
    }

    fn errors(&self) -> &Errors {
        &self.err
    }

    fn errors_mut(&mut self) -> &mut Errors {
        &mut self.err
    }

    fn stats_mut(&mut self) -> Option<&mut Stats> {
        Some(self.stats.get_or_insert_with(Stats::new))
    }

    fn merge(&mut self, other: Self, ctx: &MergeContext<'_>) -> &Errors {
        self.merge_fetch(other, ctx)
    }
}

/// Reconcile two records of the same series. `m1` receives the result;
/// `m2` may be left holding the losing record.
pub fn merge_fetch_responses(
    m1: &mut FetchResponse,
    m2: &mut FetchResponse,
    ctx: &MergeContext<'_>,
) -> Errors {
    let result = if m1.request_start_time != m2.request_start_time {
        Err(ZipperError::ResponseStartTimeMismatch {
            name: m1.name.clone(),
            first: m1.request_start_time,
            second: m2.request_start_time,
        })
    } else if m1.step_time == m2.step_time {
        merge_with_equal_step_times(m1, m2)
    } else {
        merge_with_unequal_step_times(m1, m2, ctx);
        Ok(())
    };

    if let Err(err) = &result {
        ctx.observer.merge_failed(err, m1, m2, ctx.uuid);
    }

    Errors::from_err(result.err())
}

fn merge_with_equal_step_times(
    m1: &mut FetchResponse,
    m2: &mut FetchResponse,
) -> Result<(), ZipperError> {
    // Same step but shifted data windows: indices would not line up
    if m1.start_time != m2.start_time {
        return Err(ZipperError::DataStartTimeMismatch {
            name: m1.name.clone(),
            first: m1.start_time,
            second: m2.start_time,
        });
    }

    if m1.values.len() < m2.values.len() {
        std::mem::swap(m1, m2);
    }

    for (base, other) in m1.values.iter_mut().zip(&m2.values) {
        if base.is_nan() {
            *base = *other;
        }
    }

    Ok(())
}

fn merge_with_unequal_step_times(
    m1: &mut FetchResponse,
    m2: &mut FetchResponse,
    ctx: &MergeContext<'_>,
) {
    if m1.step_time > m2.step_time {
        std::mem::swap(m1, m2);
    }

    ctx.observer.step_time_mismatch(m1, m2, ctx.uuid);
}
