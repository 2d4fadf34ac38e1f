//! Error aggregation for shard replies
//!
//! Every merge step returns or updates an [`Errors`] instead of aborting the
//! caller. Only the fatal flag changes caller behavior, and only on the fetch
//! path: once an aggregate has seen a fatal error its series are frozen.

/// A single condition recorded while contacting shards or merging replies.
#[derive(Debug, Clone, PartialEq)]
pub enum ZipperError {
    /// Two series paired for merge disagree on the requested start
    ResponseStartTimeMismatch {
        name: String,
        first: i64,
        second: i64,
    },
    /// Same step and requested window, but the data windows are shifted.
    /// Only the affected series is skipped.
    DataStartTimeMismatch {
        name: String,
        first: i64,
        second: i64,
    },
    /// The gatherer gave up waiting for a shard
    Timeout { server: String },
    /// Transport-level failure talking to a shard
    ShardUnreachable { server: String, reason: String },
    /// Shard replied but the body could not be decoded
    Decode { server: String, reason: String },
    /// Shard was expected but never replied before the fold finished
    NoResponse { server: String },
    /// Free-form condition supplied by a collaborator
    Other(String),
}

impl ZipperError {
    /// Fixed classification used by [`Errors::from_err`].
    pub fn is_fatal(&self) -> bool {
        matches!(self, ZipperError::ResponseStartTimeMismatch { .. })
    }

    /// Server the error is attributed to, if any
    pub fn server(&self) -> Option<&str> {
        match self {
            ZipperError::Timeout { server }
            | ZipperError::ShardUnreachable { server, .. }
            | ZipperError::Decode { server, .. }
            | ZipperError::NoResponse { server } => Some(server),
            ZipperError::ResponseStartTimeMismatch { .. }
            | ZipperError::DataStartTimeMismatch { .. }
            | ZipperError::Other(_) => None,
        }
    }
}

impl std::fmt::Display for ZipperError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZipperError::ResponseStartTimeMismatch {
                name,
                first,
                second,
            } => write!(
                f,
                "response start time mismatch for {}: {} != {}",
                name, first, second
            ),
            ZipperError::DataStartTimeMismatch {
                name,
                first,
                second,
            } => write!(
                f,
                "data start time mismatch for {}: {} != {}",
                name, first, second
            ),
            ZipperError::Timeout { server } => write!(f, "timeout waiting for {}", server),
            ZipperError::ShardUnreachable { server, reason } => {
                write!(f, "shard {} unreachable: {}", server, reason)
            }
            ZipperError::Decode { server, reason } => {
                write!(f, "failed to decode reply from {}: {}", server, reason)
            }
            ZipperError::NoResponse { server } => write!(f, "no response from {}", server),
            ZipperError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ZipperError {}

/// Ordered list of recorded errors plus a sticky fatal flag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Errors {
    errors: Vec<ZipperError>,
    have_fatal_errors: bool,
}

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a single merge outcome. `None` yields an empty aggregate.
    pub fn from_err(err: Option<ZipperError>) -> Self {
        match err {
            None => Errors::new(),
            Some(err) => Errors {
                have_fatal_errors: err.is_fatal(),
                errors: vec![err],
            },
        }
    }

    /// Append without touching the fatal flag.
    pub fn add(&mut self, err: ZipperError) {
        self.errors.push(err);
    }

    /// Append and mark the aggregate fatal.
    pub fn add_fatal(&mut self, err: ZipperError) {
        self.errors.push(err);
        self.have_fatal_errors = true;
    }

    /// Append `other`'s errors after ours and OR the fatal flags.
    pub fn merge(&mut self, other: &Errors) {
        self.errors.extend(other.errors.iter().cloned());
        self.have_fatal_errors |= other.have_fatal_errors;
    }

    pub fn have_fatal_errors(&self) -> bool {
        self.have_fatal_errors
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ZipperError> {
        self.errors.iter()
    }

    pub fn as_slice(&self) -> &[ZipperError] {
        &self.errors
    }
}

impl std::fmt::Display for Errors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}
