//! Single-consumer fold of shard replies
//!
//! The gatherer issues N shard requests concurrently. Their replies are
//! pushed into a channel and folded here one at a time, so no aggregate ever
//! has two merges in flight. Every expected shard ends up either merged or
//! represented by an error entry; a shard is never silently omitted.

use crate::errors::ZipperError;
use crate::response::{MergeContext, MergeResponse};
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// How a shard that never replied is recorded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingShardPolicy {
    #[default]
    NonFatal,
    Fatal,
}

/// One completed shard request
#[derive(Debug)]
pub enum ShardReply<R> {
    Response(R),
    Failed {
        server: String,
        error: ZipperError,
        fatal: bool,
    },
}

impl<R> ShardReply<R> {
    pub fn failed(server: impl Into<String>, error: ZipperError) -> Self {
        ShardReply::Failed {
            server: server.into(),
            error,
            fatal: false,
        }
    }

    pub fn failed_fatal(server: impl Into<String>, error: ZipperError) -> Self {
        ShardReply::Failed {
            server: server.into(),
            error,
            fatal: true,
        }
    }
}

pub struct Reducer<R> {
    acc: R,
    expected: Vec<String>,
    answered: AHashSet<String>,
    policy: MissingShardPolicy,
}

impl<R> Reducer<R>
where
    R: MergeResponse + Default,
{
    pub fn new(expected: Vec<String>, policy: MissingShardPolicy) -> Self {
        Reducer {
            acc: R::default(),
            answered: AHashSet::with_capacity(expected.len()),
            expected,
            policy,
        }
    }

    /// Fold one reply into the running aggregate.
    pub fn apply(&mut self, reply: ShardReply<R>, ctx: &MergeContext<'_>) {
        match reply {
            ShardReply::Response(partial) => {
                self.answered.insert(partial.server().to_string());
                self.acc.merge(partial, ctx);
            }
            ShardReply::Failed {
                server,
                error,
                fatal,
            } => {
                debug!(
                    kind = %R::KIND,
                    server = %server,
                    error = %error,
                    fatal,
                    uuid = %ctx.uuid,
                    "shard request failed"
                );
                if let Some(stats) = self.acc.stats_mut() {
                    stats.record_failure(&server, &error);
                }
                if fatal {
                    self.acc.errors_mut().add_fatal(error);
                } else {
                    self.acc.errors_mut().add(error);
                }
                self.answered.insert(server);
            }
        }
    }

    /// Drain `rx` until every sender is dropped, then finish.
    pub async fn run(mut self, mut rx: mpsc::Receiver<ShardReply<R>>, ctx: &MergeContext<'_>) -> R {
        while let Some(reply) = rx.recv().await {
            self.apply(reply, ctx);
        }
        self.finish()
    }

    /// Record every expected shard that never replied and return the result.
    pub fn finish(mut self) -> R {
        for server in &self.expected {
            if self.answered.contains(server) {
                continue;
            }
            let err = ZipperError::NoResponse {
                server: server.clone(),
            };
            if let Some(stats) = self.acc.stats_mut() {
                stats.record_failure(server, &err);
            }
            match self.policy {
                MissingShardPolicy::NonFatal => self.acc.errors_mut().add(err),
                MissingShardPolicy::Fatal => self.acc.errors_mut().add_fatal(err),
            }
        }
        self.acc
    }

    pub fn aggregate(&self) -> &R {
        &self.acc
    }

    pub fn pending(&self) -> usize {
        self.expected
            .iter()
            .filter(|s| !self.answered.contains(*s))
            .count()
    }
}
