//! Per-metric storage metadata

use super::{MergeContext, MergeResponse, QueryKind};
use crate::errors::Errors;
use crate::protocol::ZipperInfoResponse;
use crate::stats::{self, Stats};

#[derive(Debug, Clone, PartialEq)]
pub struct ServerInfoResponse {
    pub server: String,
    pub response: Option<ZipperInfoResponse>,
    pub stats: Option<Stats>,
    pub err: Errors,
}

impl Default for ServerInfoResponse {
    fn default() -> Self {
        ServerInfoResponse {
            server: String::new(),
            response: Some(ZipperInfoResponse::default()),
            stats: Some(Stats::new()),
            err: Errors::new(),
        }
    }
}

impl ServerInfoResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_server(server: impl Into<String>, response: ZipperInfoResponse) -> Self {
        let server = server.into();
        ServerInfoResponse {
            stats: Some(Stats::for_server(server.clone())),
            server,
            response: Some(response),
            err: Errors::new(),
        }
    }

    /// Last write wins per metric name. Metadata is never merged
    /// field-by-field: the later shard's view replaces the earlier one.
    pub fn merge_info(&mut self, second: ServerInfoResponse) -> &Errors {
        stats::merge_optional(&mut self.stats, second.stats.as_ref());
        self.err.merge(&second.err);

        let Some(second_response) = second.response else {
            return &self.err;
        };

        let info = &mut self.response.get_or_insert_with(Default::default).info;
        for (name, metadata) in second_response.info {
            info.insert(name, metadata);
        }

        &self.err
    }
}

impl MergeResponse for ServerInfoResponse {
    const KIND: QueryKind = QueryKind::Info;

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
        self.merge_info(other)
    }
}
