//! Tag name lists

use super::{MergeContext, MergeResponse, QueryKind};
use crate::errors::Errors;
use ahash::AHashSet;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerTagResponse {
    pub server: String,
    pub response: Vec<String>,
    pub err: Errors,
}

impl ServerTagResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_server(server: impl Into<String>, response: Vec<String>) -> Self {
        ServerTagResponse {
            server: server.into(),
            response,
            err: Errors::new(),
        }
    }

    /// Distinct names, first-seen order.
    pub fn merge_tags(&mut self, second: ServerTagResponse) -> &Errors {
        self.err.merge(&second.err);

        if second.response.is_empty() {
            return &self.err;
        }

        // Shard results are not assumed sorted or deduplicated
        let mut seen: AHashSet<String> = self.response.iter().cloned().collect();
        for name in second.response {
            if seen.insert(name.clone()) {
                self.response.push(name);
            }
        }

        &self.err
    }
}

impl MergeResponse for ServerTagResponse {
    const KIND: QueryKind = QueryKind::Tag;

    fn server(&self) -> &str {
        &self.server
    }

    fn errors(&self) -> &Errors {
        &self.err
    }

    fn errors_mut(&mut self) -> &mut Errors {
        &mut self.err
    }

    fn merge(&mut self, other: Self, _ctx: &MergeContext<'_>) -> &Errors {
        self.merge_tags(other)
    }
}
