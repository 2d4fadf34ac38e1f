//! Response Merge Integration Tests
//!
//! Exercises the public merge API the way a gatherer drives it:
//! - Tag merge is a first-seen set union
//! - Find merge dedupes by (name, path) and is idempotent
//! - Info merge is last-write-wins per metric
//! - Fetch merge gap-fills equal-step replicas, keeps the finer record on
//!   unequal steps, and freezes on fatal errors
//! - Set-union merges reach the same result regardless of grouping

use metric_zipper::protocol::{
    FetchResponse, GlobMatch, GlobResponse, MetricsInfoResponse, MultiFetchResponse,
    MultiGlobResponse, MultiMetricsInfoResponse, ZipperInfoResponse,
};
use metric_zipper::{
    merge_fetch_responses, Errors, MergeContext, MergeResponse, RecordingObserver,
    ServerFetchResponse, ServerFindResponse, ServerInfoResponse, ServerTagResponse, Stats,
    ZipperError,
};
use std::collections::BTreeSet;

const NAN: f64 = f64::NAN;

fn tag_reply(server: &str, names: Vec<&str>) -> ServerTagResponse {
    ServerTagResponse::from_server(server, names.into_iter().map(String::from).collect())
}

fn find_reply(server: &str, globs: Vec<(&str, Vec<&str>)>) -> ServerFindResponse {
    let metrics = globs
        .into_iter()
        .map(|(name, paths)| GlobResponse {
            name: name.to_string(),
            matches: paths.iter().map(|p| GlobMatch::new(*p, true)).collect(),
        })
        .collect();
    ServerFindResponse::from_server(server, MultiGlobResponse { metrics })
}

fn info_reply(server: &str, entries: &[(&str, &str)]) -> ServerInfoResponse {
    let mut response = ZipperInfoResponse::default();
    for (name, cf) in entries {
        response.info.insert(
            name.to_string(),
            MultiMetricsInfoResponse {
                metrics: vec![MetricsInfoResponse {
                    name: name.to_string(),
                    consolidation_func: cf.to_string(),
                    x_files_factor: 0.0,
                    retentions: Vec::new(),
                }],
            },
        );
    }
    ServerInfoResponse::from_server(server, response)
}

fn fetch_reply(server: &str, series: Vec<FetchResponse>) -> ServerFetchResponse {
    ServerFetchResponse::from_server(server, MultiFetchResponse { metrics: series })
}

fn assert_values(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "length differs: {:?}", actual);
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a.is_nan() && e.is_nan()) || a == e,
            "index {}: got {}, expected {}",
            i,
            a,
            e
        );
    }
}

fn match_pairs(r: &ServerFindResponse) -> BTreeSet<(String, String)> {
    r.response
        .iter()
        .flat_map(|resp| resp.metrics.iter())
        .flat_map(|g| g.matches.iter().map(move |m| (g.name.clone(), m.path.clone())))
        .collect()
}

// ============================================================================
// Tag
// ============================================================================

#[test]
fn test_tag_union_preserves_first_order() {
    let ctx = MergeContext::traced("tags");
    let mut agg = ServerTagResponse::new();
    agg.merge(tag_reply("s1", vec!["a", "b"]), &ctx);
    agg.merge(tag_reply("s2", vec!["b", "c"]), &ctx);

    assert_eq!(agg.response, vec!["a", "b", "c"]);
    assert!(agg.err.is_empty());
}

#[test]
fn test_tag_grouping_does_not_change_set() {
    let ctx = MergeContext::traced("tags");
    let a = tag_reply("s1", vec!["x", "y"]);
    let b = tag_reply("s2", vec!["y", "z"]);
    let c = tag_reply("s3", vec!["w", "x"]);

    let mut left = ServerTagResponse::new();
    left.merge(a.clone(), &ctx);
    left.merge(b.clone(), &ctx);
    left.merge(c.clone(), &ctx);

    let mut bc = b;
    bc.merge(c, &ctx);
    let mut right = a;
    right.merge(bc, &ctx);

    let left: BTreeSet<_> = left.response.into_iter().collect();
    let right: BTreeSet<_> = right.response.into_iter().collect();
    assert_eq!(left, right);
}

// ============================================================================
// Find
// ============================================================================

#[test]
fn test_find_self_merge_is_idempotent() {
    let ctx = MergeContext::traced("find");
    let reply = find_reply("s1", vec![("a.*", vec!["a.b", "a.c"]), ("d.*", vec!["d.e"])]);
    let mut agg = reply.clone();
    agg.merge(reply.clone(), &ctx);

    assert_eq!(agg.response, reply.response);
}

#[test]
fn test_find_replicas_overlap() {
    let ctx = MergeContext::traced("find");
    let mut agg = ServerFindResponse::new();
    agg.merge(find_reply("s1", vec![("a.*", vec!["a.b", "a.c"])]), &ctx);
    agg.merge(find_reply("s2", vec![("a.*", vec!["a.c", "a.d"]), ("e.*", vec!["e.f"])]), &ctx);

    let metrics = &agg.response.as_ref().unwrap().metrics;
    assert_eq!(metrics.len(), 2);
    let paths: Vec<&str> = metrics[0].matches.iter().map(|m| m.path.as_str()).collect();
    assert_eq!(paths, vec!["a.b", "a.c", "a.d"]);
    assert_eq!(agg.stats.as_ref().unwrap().zipper_requests, 2);
}

#[test]
fn test_find_grouping_does_not_change_set() {
    let ctx = MergeContext::traced("find");
    let a = find_reply("s1", vec![("a.*", vec!["a.1"])]);
    let b = find_reply("s2", vec![("a.*", vec!["a.2"]), ("b.*", vec!["b.1"])]);
    let c = find_reply("s3", vec![("b.*", vec!["b.1", "b.2"])]);

    let mut left = ServerFindResponse::new();
    left.merge(a.clone(), &ctx);
    left.merge(b.clone(), &ctx);
    left.merge(c.clone(), &ctx);

    let mut bc = b;
    bc.merge(c, &ctx);
    let mut right = a;
    right.merge(bc, &ctx);

    assert_eq!(match_pairs(&left), match_pairs(&right));
}

// ============================================================================
// Info
// ============================================================================

#[test]
fn test_info_last_write_wins() {
    let ctx = MergeContext::traced("info");
    let mut agg = ServerInfoResponse::new();
    agg.merge(info_reply("s1", &[("m1", "X")]), &ctx);
    agg.merge(info_reply("s2", &[("m1", "Y")]), &ctx);

    let info = &agg.response.as_ref().unwrap().info;
    assert_eq!(info.len(), 1);
    assert_eq!(info["m1"].metrics[0].consolidation_func, "Y");
}

#[test]
fn test_info_grouping_does_not_change_keys() {
    let ctx = MergeContext::traced("info");
    let a = info_reply("s1", &[("m1", "X"), ("m2", "X")]);
    let b = info_reply("s2", &[("m2", "Y"), ("m3", "Y")]);
    let c = info_reply("s3", &[("m4", "Z")]);

    let mut left = ServerInfoResponse::new();
    left.merge(a.clone(), &ctx);
    left.merge(b.clone(), &ctx);
    left.merge(c.clone(), &ctx);

    let mut bc = b;
    bc.merge(c, &ctx);
    let mut right = a;
    right.merge(bc, &ctx);

    let keys = |r: &ServerInfoResponse| -> BTreeSet<String> {
        r.response
            .as_ref()
            .map(|resp| resp.info.keys().cloned().collect())
            .unwrap_or_default()
    };
    assert_eq!(keys(&left), keys(&right));
    assert_eq!(keys(&left).len(), 4);
}

// ============================================================================
// Fetch
// ============================================================================

#[test]
fn test_fetch_equal_step_gap_fill() {
    let observer = RecordingObserver::new();
    let ctx = MergeContext::new("fetch-1", &observer);

    let mut agg = fetch_reply("s1", vec![FetchResponse::new("a.b", 0, 60, vec![1.0, NAN, 3.0])]);
    let errs = agg.merge(
        fetch_reply("s2", vec![FetchResponse::new("a.b", 0, 60, vec![NAN, 2.0, NAN])]),
        &ctx,
    );

    assert!(errs.is_empty());
    assert_eq!(agg.series().len(), 1);
    assert_values(&agg.series()[0].values, &[1.0, 2.0, 3.0]);
    assert!(observer.events().is_empty());
}

#[test]
fn test_fetch_self_merge_is_idempotent() {
    let ctx = MergeContext::traced("fetch");
    let reply = fetch_reply("s1", vec![FetchResponse::new("a.b", 0, 60, vec![1.0, NAN, 3.0])]);
    let mut agg = reply.clone();
    agg.merge(reply.clone(), &ctx);

    assert_eq!(agg.response, reply.response);
}

#[test]
fn test_fetch_unequal_step_prefers_finer_resolution() {
    let observer = RecordingObserver::new();
    let ctx = MergeContext::new("fetch-2", &observer);

    // Same requested window, different retention on each replica
    let coarse = FetchResponse::new("a.b", 0, 60, vec![1.0, 2.0]).with_request_window(0, 120);
    let fine = FetchResponse::new("a.b", 0, 10, vec![5.0; 12]).with_request_window(0, 120);

    let mut agg = fetch_reply("s1", vec![coarse]);
    let errs = agg.merge(fetch_reply("s2", vec![fine.clone()]), &ctx);

    assert!(!errs.have_fatal_errors());
    assert!(errs.is_empty());
    assert_eq!(agg.series()[0], fine);
    assert_eq!(observer.step_mismatches(), 1);
}

#[test]
fn test_fetch_request_start_mismatch_is_fatal() {
    let observer = RecordingObserver::new();
    let ctx = MergeContext::new("fetch-3", &observer);

    let mut a = FetchResponse::new("a.b", 0, 60, vec![1.0, NAN]);
    let mut b = FetchResponse::new("a.b", 0, 60, vec![NAN, 2.0]).with_request_window(30, 120);

    let errs = merge_fetch_responses(&mut a, &mut b, &ctx);
    assert!(errs.have_fatal_errors());
    assert!(matches!(
        errs.as_slice()[0],
        ZipperError::ResponseStartTimeMismatch { first: 0, second: 30, .. }
    ));
    assert_values(&a.values, &[1.0, NAN]);
    assert_eq!(observer.failures(), 1);
}

#[test]
fn test_fetch_fatal_reply_stops_series_merging() {
    let ctx = MergeContext::traced("fetch");
    let mut agg = fetch_reply("s1", vec![FetchResponse::new("a", 0, 60, vec![1.0])]);

    let mut failed = ServerFetchResponse {
        server: "s2".to_string(),
        response: None,
        stats: Some(Stats::for_server("s2")),
        err: Errors::new(),
    };
    failed.err.add_fatal(ZipperError::ShardUnreachable {
        server: "s2".to_string(),
        reason: "connection refused".to_string(),
    });
    agg.merge(failed, &ctx);

    let errs = agg.merge(
        fetch_reply("s3", vec![FetchResponse::new("b", 0, 60, vec![2.0])]),
        &ctx,
    );
    assert!(errs.have_fatal_errors());
    assert_eq!(agg.series().len(), 1);
    assert_eq!(agg.stats.as_ref().unwrap().zipper_requests, 3);
}

#[test]
fn test_empty_body_keeps_data_merges_errors() {
    let ctx = MergeContext::traced("empty");
    let mut agg = fetch_reply("s1", vec![FetchResponse::new("a", 0, 60, vec![1.0])]);
    let before = agg.response.clone();

    let empty = ServerFetchResponse {
        server: "s2".to_string(),
        response: None,
        stats: Some(Stats::for_server("s2")),
        err: Errors::new(),
    }
    .non_fatal_error(ZipperError::Timeout {
        server: "s2".to_string(),
    });
    agg.merge(empty, &ctx);

    assert_eq!(agg.response, before);
    assert_eq!(agg.err.len(), 1);
    assert_eq!(agg.stats.as_ref().unwrap().servers, vec!["s1", "s2"]);
}

#[test]
fn test_fetch_shifted_data_window_keeps_later_shards() {
    let observer = RecordingObserver::new();
    let ctx = MergeContext::new("fetch-4", &observer);

    // Same step and requested window, data shifted by one step
    let mut agg = fetch_reply(
        "s1",
        vec![FetchResponse::new("a", 0, 60, vec![1.0, NAN]).with_request_window(0, 180)],
    );
    let errs = agg.merge(
        fetch_reply(
            "s2",
            vec![FetchResponse::new("a", 60, 60, vec![2.0, 3.0]).with_request_window(0, 180)],
        ),
        &ctx,
    );
    assert!(!errs.have_fatal_errors());
    assert!(matches!(
        errs.as_slice()[0],
        ZipperError::DataStartTimeMismatch { first: 0, second: 60, .. }
    ));

    agg.merge(
        fetch_reply("s3", vec![FetchResponse::new("b", 0, 60, vec![4.0])]),
        &ctx,
    );

    let names: Vec<&str> = agg.series().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_values(&agg.series()[0].values, &[1.0, NAN]);
    assert_eq!(observer.failures(), 1);
}
