//! Deterministic Simulation Testing for response merging
//!
//! Shard replies arrive in arbitrary order. This harness generates a ground
//! truth, splits it across replicas with random holes and duplicates, folds
//! the replies in many seeded permutations, and checks that every fold
//! reaches the same answer.
//!
//! ```text
//! for seed in 0..100 {
//!     let mut harness = MergeDSTHarness::new(MergeDSTConfig::calm(seed));
//!     harness.run();
//!     assert!(harness.result().is_success());  // replay with the seed on failure
//! }
//! ```
//!
//! Only equal-step fetch replicas are generated: unequal-step reconciliation
//! keeps one record whole and is order dependent by construction.

use crate::observer::RecordingObserver;
use crate::protocol::{
    FetchResponse, GlobMatch, GlobResponse, MetricsInfoResponse, MultiFetchResponse,
    MultiGlobResponse, MultiMetricsInfoResponse, Retention, ZipperInfoResponse,
};
use crate::response::{
    MatchKey, MergeContext, MergeResponse, ServerFetchResponse, ServerFindResponse,
    ServerInfoResponse, ServerTagResponse,
};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet};

const STEP: i64 = 60;

/// Seeded source for every random choice the harness makes
pub struct DeterministicRng(ChaCha8Rng);

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        DeterministicRng(ChaCha8Rng::seed_from_u64(seed))
    }

    /// Uniform in `[min, max)`; `min` when the range is empty.
    pub fn gen_range(&mut self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        self.0.gen_range(min..max)
    }

    pub fn gen_bool(&mut self, probability: f64) -> bool {
        self.0.gen_bool(probability.clamp(0.0, 1.0))
    }

    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        slice.shuffle(&mut self.0);
    }
}

/// Configuration for merge DST
#[derive(Debug, Clone)]
pub struct MergeDSTConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Number of replicas answering the query
    pub num_replicas: usize,
    /// Size of the ground truth per query kind
    pub num_series: usize,
    pub points_per_series: usize,
    /// Probability a replica is missing any given item or sample
    pub gap_prob: f64,
    /// Probability a replica repeats an item within its own reply
    pub duplicate_prob: f64,
    /// Arrival orders folded per run
    pub orders: usize,
}

impl Default for MergeDSTConfig {
    fn default() -> Self {
        MergeDSTConfig {
            seed: 0,
            num_replicas: 3,
            num_series: 20,
            points_per_series: 30,
            gap_prob: 0.2,
            duplicate_prob: 0.0,
            orders: 5,
        }
    }
}

impl MergeDSTConfig {
    /// Calm mode - few replicas, light gaps
    pub fn calm(seed: u64) -> Self {
        MergeDSTConfig {
            seed,
            ..Default::default()
        }
    }

    /// Chaos mode - many replicas, heavy gaps, duplicated items
    pub fn chaos(seed: u64) -> Self {
        MergeDSTConfig {
            seed,
            num_replicas: 7,
            num_series: 40,
            points_per_series: 60,
            gap_prob: 0.6,
            duplicate_prob: 0.2,
            orders: 10,
        }
    }
}

/// Result of a merge DST run
#[derive(Debug, Clone)]
pub struct MergeDSTResult {
    pub seed: u64,
    pub merges_performed: u64,
    pub orders_checked: u64,
    pub invariant_violations: Vec<String>,
    pub converged: bool,
}

impl MergeDSTResult {
    pub fn new(seed: u64) -> Self {
        MergeDSTResult {
            seed,
            merges_performed: 0,
            orders_checked: 0,
            invariant_violations: Vec::new(),
            converged: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty() && self.converged
    }

    pub fn summary(&self) -> String {
        format!(
            "Seed {}: {} merges, {} orders, converged={}, {} violations",
            self.seed,
            self.merges_performed,
            self.orders_checked,
            self.converged,
            self.invariant_violations.len()
        )
    }
}

/// Replica replies plus the answer any fold order must reach
pub struct MergeDSTHarness {
    config: MergeDSTConfig,
    rng: DeterministicRng,
    tags: Vec<ServerTagResponse>,
    finds: Vec<ServerFindResponse>,
    infos: Vec<ServerInfoResponse>,
    fetches: Vec<ServerFetchResponse>,
    expected_tags: BTreeSet<String>,
    expected_matches: BTreeSet<(String, String)>,
    expected_info_keys: BTreeSet<String>,
    /// Series name -> expected samples (NaN where no replica had data)
    expected_series: BTreeMap<String, Vec<f64>>,
    result: MergeDSTResult,
}

impl MergeDSTHarness {
    pub fn new(config: MergeDSTConfig) -> Self {
        let mut harness = MergeDSTHarness {
            rng: DeterministicRng::new(config.seed),
            result: MergeDSTResult::new(config.seed),
            config,
            tags: Vec::new(),
            finds: Vec::new(),
            infos: Vec::new(),
            fetches: Vec::new(),
            expected_tags: BTreeSet::new(),
            expected_matches: BTreeSet::new(),
            expected_info_keys: BTreeSet::new(),
            expected_series: BTreeMap::new(),
        };
        harness.generate();
        harness
    }

    fn keep(&mut self) -> bool {
        !self.rng.gen_bool(self.config.gap_prob)
    }

    fn duplicate(&mut self) -> bool {
        self.rng.gen_bool(self.config.duplicate_prob)
    }

    fn generate(&mut self) {
        let n = self.config.num_series;
        let points = self.config.points_per_series;

        let truth: Vec<Vec<f64>> = (0..n)
            .map(|_| {
                (0..points)
                    .map(|_| self.rng.gen_range(0, 10_000) as f64 / 100.0)
                    .collect()
            })
            .collect();

        for r in 0..self.config.num_replicas {
            let server = format!("replica-{}", r);

            let mut tags = Vec::new();
            for i in 0..n {
                if self.keep() {
                    let name = format!("tag_{}", i);
                    self.expected_tags.insert(name.clone());
                    if self.duplicate() {
                        tags.push(name.clone());
                    }
                    tags.push(name);
                }
            }
            self.tags.push(ServerTagResponse::from_server(&server, tags));

            let mut globs = Vec::new();
            for i in 0..n {
                let name = format!("glob_{}.*", i);
                let mut matches = Vec::new();
                for j in 0..4 {
                    if self.keep() {
                        let path = format!("glob_{}.leaf_{}", i, j);
                        self.expected_matches.insert((name.clone(), path.clone()));
                        if self.duplicate() {
                            matches.push(GlobMatch::new(path.clone(), true));
                        }
                        matches.push(GlobMatch::new(path, true));
                    }
                }
                if !matches.is_empty() {
                    globs.push(GlobResponse { name, matches });
                }
            }
            self.finds.push(ServerFindResponse::from_server(
                &server,
                MultiGlobResponse { metrics: globs },
            ));

            let mut info = ZipperInfoResponse::default();
            for i in 0..n {
                if self.keep() {
                    let name = format!("metric_{}", i);
                    self.expected_info_keys.insert(name.clone());
                    info.info.insert(
                        name.clone(),
                        MultiMetricsInfoResponse {
                            metrics: vec![MetricsInfoResponse {
                                name,
                                consolidation_func: "average".to_string(),
                                x_files_factor: 0.0,
                                retentions: vec![Retention {
                                    seconds_per_point: STEP,
                                    number_of_points: points as i64,
                                }],
                            }],
                        },
                    );
                }
            }
            self.infos.push(ServerInfoResponse::from_server(&server, info));

            let mut series = Vec::new();
            for (i, values) in truth.iter().enumerate() {
                if !self.keep() {
                    continue;
                }
                let name = format!("series.{}", i);
                let sampled: Vec<f64> = values
                    .iter()
                    .map(|v| if self.keep() { *v } else { f64::NAN })
                    .collect();

                let expected = self
                    .expected_series
                    .entry(name.clone())
                    .or_insert_with(|| vec![f64::NAN; points]);
                for (e, s) in expected.iter_mut().zip(&sampled) {
                    if !s.is_nan() {
                        *e = *s;
                    }
                }

                let record = FetchResponse::new(name, 0, STEP, sampled);
                if self.duplicate() {
                    series.push(record.clone());
                }
                series.push(record);
            }
            self.fetches.push(ServerFetchResponse::from_server(
                &server,
                MultiFetchResponse { metrics: series },
            ));
        }
    }

    /// Fold every query kind in `orders` random arrival orders.
    pub fn run(&mut self) {
        for order in 0..self.config.orders {
            let mut perm: Vec<usize> = (0..self.config.num_replicas).collect();
            self.rng.shuffle(&mut perm);
            self.check_order(order, &perm);
            self.result.orders_checked += 1;
        }
        self.result.converged = self.result.invariant_violations.is_empty();
    }

    fn fold<R>(&mut self, replies: &[R], perm: &[usize], ctx: &MergeContext<'_>) -> R
    where
        R: MergeResponse + Default + Clone,
    {
        let mut acc = R::default();
        for &i in perm {
            acc.merge(replies[i].clone(), ctx);
            self.result.merges_performed += 1;
        }
        acc
    }

    fn violation(&mut self, order: usize, msg: String) {
        self.result
            .invariant_violations
            .push(format!("seed {} order {}: {}", self.config.seed, order, msg));
    }

    fn check_order(&mut self, order: usize, perm: &[usize]) {
        let observer = RecordingObserver::new();
        let uuid = format!("dst-{}-{}", self.config.seed, order);
        let ctx = MergeContext::new(&uuid, &observer);

        let tags = self.tags.clone();
        let tag_result = self.fold(&tags, perm, &ctx);
        let tag_set: BTreeSet<String> = tag_result.response.iter().cloned().collect();
        if tag_set.len() != tag_result.response.len() {
            self.violation(order, "duplicate tag names".to_string());
        }
        if tag_set != self.expected_tags {
            self.violation(order, "tag set differs from union".to_string());
        }

        let finds = self.finds.clone();
        let find_result = self.fold(&finds, perm, &ctx);
        let globs = find_result
            .response
            .as_ref()
            .map(|r| r.metrics.clone())
            .unwrap_or_default();
        let names: BTreeSet<&str> = globs.iter().map(|g| g.name.as_str()).collect();
        if names.len() != globs.len() {
            self.violation(order, "duplicate glob names".to_string());
        }
        let keys: Vec<MatchKey> = globs
            .iter()
            .flat_map(|g| g.matches.iter().map(|m| MatchKey::new(&g.name, &m.path)))
            .collect();
        let pairs: BTreeSet<(String, String)> =
            keys.iter().map(|k| (k.name.clone(), k.path.clone())).collect();
        if pairs.len() != keys.len() {
            self.violation(order, "duplicate (name, path) matches".to_string());
        }
        if pairs != self.expected_matches {
            self.violation(order, "match set differs from union".to_string());
        }

        let infos = self.infos.clone();
        let info_result = self.fold(&infos, perm, &ctx);
        let info_keys: BTreeSet<String> = info_result
            .response
            .as_ref()
            .map(|r| r.info.keys().cloned().collect())
            .unwrap_or_default();
        if info_keys != self.expected_info_keys {
            self.violation(order, "info keys differ from union".to_string());
        }

        let fetches = self.fetches.clone();
        let fetch_result = self.fold(&fetches, perm, &ctx);
        self.check_fetch(order, &fetch_result);

        for (kind, errs) in [
            ("tag", tag_result.errors()),
            ("find", find_result.errors()),
            ("info", info_result.errors()),
            ("fetch", fetch_result.errors()),
        ] {
            if !errs.is_empty() {
                let msg = format!("{} merge recorded errors: {}", kind, errs);
                self.violation(order, msg);
            }
        }
        if !observer.events().is_empty() {
            self.violation(order, "unexpected reconciler diagnostics".to_string());
        }
    }

    fn check_fetch(&mut self, order: usize, fetch_result: &ServerFetchResponse) {
        let series = fetch_result.series();
        if series.len() != self.expected_series.len() {
            let msg = format!(
                "expected {} series, got {}",
                self.expected_series.len(),
                series.len()
            );
            self.violation(order, msg);
        }

        let mut mismatched = Vec::new();
        for s in series {
            let Some(expected) = self.expected_series.get(&s.name) else {
                mismatched.push(format!("unexpected series {}", s.name));
                continue;
            };
            let same = expected.len() == s.values.len()
                && expected
                    .iter()
                    .zip(&s.values)
                    .all(|(e, v)| (e.is_nan() && v.is_nan()) || e == v);
            if !same {
                mismatched.push(format!("series {} differs from ground truth", s.name));
            }
        }
        for msg in mismatched {
            self.violation(order, msg);
        }
    }

    pub fn result(&self) -> &MergeDSTResult {
        &self.result
    }
}

/// Run `count` consecutive seeds starting at `start_seed`
pub fn run_merge_batch(
    start_seed: u64,
    count: u64,
    make_config: fn(u64) -> MergeDSTConfig,
) -> Vec<MergeDSTResult> {
    (start_seed..start_seed + count)
        .map(|seed| {
            let mut harness = MergeDSTHarness::new(make_config(seed));
            harness.run();
            harness.result().clone()
        })
        .collect()
}

pub fn summarize_batch(results: &[MergeDSTResult]) -> String {
    let passed = results.iter().filter(|r| r.is_success()).count();
    let merges: u64 = results.iter().map(|r| r.merges_performed).sum();
    let mut summary = format!(
        "{}/{} seeds passed, {} merges total",
        passed,
        results.len(),
        merges
    );
    for r in results.iter().filter(|r| !r.is_success()).take(5) {
        summary.push_str("\n  ");
        summary.push_str(&r.summary());
        if let Some(first) = r.invariant_violations.first() {
            summary.push_str(": ");
            summary.push_str(first);
        }
    }
    summary
}
