//! Wire types exchanged with backend shards
//!
//! Only the fields the merge layer reads or writes are modelled. Times are
//! integer seconds; every shard uses the same unit.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// One path matched by a glob expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobMatch {
    pub path: String,
    pub is_leaf: bool,
    #[serde(default)]
    pub allowed_consolidation_funcs: Vec<String>,
}

impl GlobMatch {
    pub fn new(path: impl Into<String>, is_leaf: bool) -> Self {
        GlobMatch {
            path: path.into(),
            is_leaf,
            allowed_consolidation_funcs: Vec::new(),
        }
    }
}

/// Matches for a single requested glob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobResponse {
    pub name: String,
    #[serde(default)]
    pub matches: Vec<GlobMatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiGlobResponse {
    #[serde(default)]
    pub metrics: Vec<GlobResponse>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retention {
    pub seconds_per_point: i64,
    pub number_of_points: i64,
}

/// Storage metadata for one metric as reported by one shard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsInfoResponse {
    pub name: String,
    pub consolidation_func: String,
    pub x_files_factor: f32,
    #[serde(default)]
    pub retentions: Vec<Retention>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiMetricsInfoResponse {
    #[serde(default)]
    pub metrics: Vec<MetricsInfoResponse>,
}

/// Info replies keyed by metric name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZipperInfoResponse {
    #[serde(default)]
    pub info: AHashMap<String, MultiMetricsInfoResponse>,
}

/// One series as returned by one shard.
///
/// `request_start_time`/`request_stop_time` are the window the client asked
/// for and identify the logical series. `start_time`/`stop_time`/`step_time`
/// describe the data this shard actually holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchResponse {
    pub name: String,
    #[serde(default)]
    pub path_expression: String,
    #[serde(default)]
    pub consolidation_func: String,
    pub start_time: i64,
    pub stop_time: i64,
    pub step_time: i64,
    #[serde(default)]
    pub x_files_factor: f32,
    #[serde(default)]
    pub high_precision_timestamps: bool,
    #[serde(with = "nan_as_null")]
    pub values: Vec<f64>,
    #[serde(default)]
    pub applied_functions: Vec<String>,
    pub request_start_time: i64,
    pub request_stop_time: i64,
}

impl FetchResponse {
    /// Series whose data window equals the requested window.
    pub fn new(name: impl Into<String>, start_time: i64, step_time: i64, values: Vec<f64>) -> Self {
        let stop_time = start_time + step_time * values.len() as i64;
        let name = name.into();
        FetchResponse {
            path_expression: name.clone(),
            name,
            consolidation_func: "average".to_string(),
            start_time,
            stop_time,
            step_time,
            values,
            request_start_time: start_time,
            request_stop_time: stop_time,
            ..Default::default()
        }
    }

    /// Override the requested window, keeping the data window.
    pub fn with_request_window(mut self, from: i64, until: i64) -> Self {
        self.request_start_time = from;
        self.request_stop_time = until;
        self
    }
}

// NaN != NaN, so derived equality would make every gappy series unequal to
// itself. Missing samples compare equal to each other here.
impl PartialEq for FetchResponse {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.path_expression == other.path_expression
            && self.consolidation_func == other.consolidation_func
            && self.start_time == other.start_time
            && self.stop_time == other.stop_time
            && self.step_time == other.step_time
            && self.x_files_factor == other.x_files_factor
            && self.high_precision_timestamps == other.high_precision_timestamps
            && self.applied_functions == other.applied_functions
            && self.request_start_time == other.request_start_time
            && self.request_stop_time == other.request_stop_time
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| (a.is_nan() && b.is_nan()) || a == b)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiFetchResponse {
    #[serde(default)]
    pub metrics: Vec<FetchResponse>,
}

/// JSON has no NaN: missing samples travel as `null`.
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        values
            .iter()
            .map(|v| if v.is_nan() { None } else { Some(*v) })
            .collect::<Vec<Option<f64>>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let values = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}
