//! Fold a recorded set of shard replies and print the merged result
//!
//! ## Usage
//!
//! ```bash
//! merge-replay replies.json [zipper.toml]
//! ```
//!
//! The input is one JSON document:
//!
//! ```json
//! {
//!   "kind": "fetch",
//!   "uuid": "req-1",
//!   "expected_servers": ["s1", "s2", "s3"],
//!   "fetches": [
//!     {"server": "s1", "response": {"metrics": [...]}},
//!     {"server": "s2", "error": "connection refused"}
//!   ]
//! }
//! ```
//!
//! Replies are folded in file order. Environment overrides (`ZIPPER_*`)
//! apply on top of the optional config file.

use metric_zipper::config::ZipperConfig;
use metric_zipper::logging::init_logging;
use metric_zipper::protocol::{MultiFetchResponse, MultiGlobResponse, ZipperInfoResponse};
use metric_zipper::{
    Errors, MergeContext, MergeResponse, MissingShardPolicy, QueryKind, Reducer,
    ServerFetchResponse, ServerFindResponse, ServerInfoResponse, ServerTagResponse, ShardReply,
    Stats, ZipperError,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Deserialize)]
struct RecordedReply<T> {
    server: String,
    #[serde(default)]
    response: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplayFile {
    kind: QueryKind,
    #[serde(default)]
    uuid: String,
    #[serde(default)]
    expected_servers: Vec<String>,
    #[serde(default)]
    tags: Vec<RecordedReply<Vec<String>>>,
    #[serde(default)]
    infos: Vec<RecordedReply<ZipperInfoResponse>>,
    #[serde(default)]
    finds: Vec<RecordedReply<MultiGlobResponse>>,
    #[serde(default)]
    fetches: Vec<RecordedReply<MultiFetchResponse>>,
}

#[derive(Serialize)]
struct ReplayOutput<'a, T: Serialize> {
    kind: QueryKind,
    server: &'a str,
    response: &'a T,
    errors: Vec<String>,
    have_fatal_errors: bool,
}

async fn fold<R, T>(
    recorded: Vec<RecordedReply<T>>,
    expected: Vec<String>,
    policy: MissingShardPolicy,
    ctx: &MergeContext<'_>,
    into_response: fn(String, Option<T>) -> R,
) -> R
where
    R: MergeResponse + Default,
{
    let (tx, rx) = mpsc::channel(recorded.len().max(1));
    let reducer: Reducer<R> = Reducer::new(expected, policy);

    let sender = async move {
        for reply in recorded {
            let reply = match reply.error {
                Some(reason) => ShardReply::failed(
                    reply.server.clone(),
                    ZipperError::ShardUnreachable {
                        server: reply.server,
                        reason,
                    },
                ),
                None => ShardReply::Response(into_response(reply.server, reply.response)),
            };
            if tx.send(reply).await.is_err() {
                break;
            }
        }
    };

    let (_, merged) = tokio::join!(sender, reducer.run(rx, ctx));
    merged
}

fn print_result<T: Serialize>(
    kind: QueryKind,
    server: &str,
    response: &T,
    err: &Errors,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = ReplayOutput {
        kind,
        server,
        response,
        errors: err.iter().map(|e| e.to_string()).collect(),
        have_fatal_errors: err.have_fatal_errors(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let input = args
        .next()
        .ok_or("usage: merge-replay <replies.json> [zipper.toml]")?;

    let config = match args.next() {
        Some(path) => {
            let mut config = ZipperConfig::from_file(path)?;
            config.apply_env()?;
            config
        }
        None => ZipperConfig::from_env()?,
    };

    init_logging(&config.logging).map_err(|e| e.to_string())?;

    let replay: ReplayFile = serde_json::from_str(&std::fs::read_to_string(&input)?)?;
    let observer = config.merge.observer();
    let ctx = MergeContext::new(&replay.uuid, &observer);
    let policy = config.merge.missing_shard_policy;
    let expected = replay.expected_servers;

    info!(kind = %replay.kind, uuid = %replay.uuid, input = %input, "replaying shard replies");

    match replay.kind {
        QueryKind::Tag => {
            let merged = fold(replay.tags, expected, policy, &ctx, |server, response| {
                ServerTagResponse::from_server(server, response.unwrap_or_default())
            })
            .await;
            print_result(replay.kind, &merged.server, &merged.response, &merged.err)?;
        }
        QueryKind::Info => {
            let merged = fold(replay.infos, expected, policy, &ctx, |server, response| {
                ServerInfoResponse {
                    stats: Some(Stats::for_server(server.clone())),
                    server,
                    response,
                    err: Errors::new(),
                }
            })
            .await;
            print_result(replay.kind, &merged.server, &merged.response, &merged.err)?;
        }
        QueryKind::Find => {
            let merged = fold(replay.finds, expected, policy, &ctx, |server, response| {
                ServerFindResponse {
                    stats: Some(Stats::for_server(server.clone())),
                    server,
                    response,
                    err: Errors::new(),
                }
            })
            .await;
            print_result(replay.kind, &merged.server, &merged.response, &merged.err)?;
        }
        QueryKind::Fetch => {
            let merged = fold(replay.fetches, expected, policy, &ctx, |server, response| {
                ServerFetchResponse {
                    stats: Some(Stats::for_server(server.clone())),
                    server,
                    response,
                    err: Errors::new(),
                }
            })
            .await;
            print_result(replay.kind, &merged.server, &merged.response, &merged.err)?;
        }
    }

    Ok(())
}
