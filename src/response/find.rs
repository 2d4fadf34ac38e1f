//! Glob (find) results
//!
//! Replicas routinely return overlapping matches for the same glob, and no
//! shard is assumed to return sorted or deduplicated results. The merge is a
//! two-level union: by metric name, then by match path within that name.

use super::{MergeContext, MergeResponse, QueryKind};
use crate::errors::Errors;
use crate::protocol::MultiGlobResponse;
use crate::stats::{self, Stats};
use ahash::{AHashMap, AHashSet};

/// Identity of one match within the aggregate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchKey {
    pub name: String,
    pub path: String,
}

impl MatchKey {
    pub fn new(name: &str, path: &str) -> Self {
        MatchKey {
            name: name.to_string(),
            path: path.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerFindResponse {
    pub server: String,
    pub response: Option<MultiGlobResponse>,
    pub stats: Option<Stats>,
    pub err: Errors,
}

impl Default for ServerFindResponse {
    fn default() -> Self {
        ServerFindResponse {
            server: String::new(),
            response: Some(MultiGlobResponse::default()),
            stats: Some(Stats::new()),
            err: Errors::new(),
        }
    }
}

impl ServerFindResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_server(server: impl Into<String>, response: MultiGlobResponse) -> Self {
        let server = server.into();
        ServerFindResponse {
            stats: Some(Stats::for_server(server.clone())),
            server,
            response: Some(response),
            err: Errors::new(),
        }
    }

    pub fn merge_find(&mut self, second: ServerFindResponse) -> &Errors {
        stats::merge_optional(&mut self.stats, second.stats.as_ref());
        self.err.merge(&second.err);

        let Some(second_response) = second.response else {
            return &self.err;
        };

        let metrics = &mut self.response.get_or_insert_with(Default::default).metrics;

        let mut seen_metrics: AHashMap<String, usize> = AHashMap::with_capacity(metrics.len());
        let mut seen_matches: AHashSet<MatchKey> = AHashSet::new();
        for (i, m) in metrics.iter().enumerate() {
            seen_metrics.insert(m.name.clone(), i);
            for mm in &m.matches {
                seen_matches.insert(MatchKey::new(&m.name, &mm.path));
            }
        }

        for mut m in second_response.metrics {
            let Some(&i) = seen_metrics.get(&m.name) else {
                seen_metrics.insert(m.name.clone(), metrics.len());
                m.matches
                    .retain(|mm| seen_matches.insert(MatchKey::new(&m.name, &mm.path)));
                metrics.push(m);
                continue;
            };

            let target = &mut metrics[i];
            for mm in m.matches {
                if seen_matches.insert(MatchKey::new(&target.name, &mm.path)) {
                    target.matches.push(mm);
                }
            }
        }

        &self.err
    }
}

impl MergeResponse for ServerFindResponse {
    const KIND: QueryKind = QueryKind::Find;

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

    fn merge(&mut self, other: Self, _ctx: &MergeContext<'_>) -> &Errors {
        self.merge_find(other)
    }
}
