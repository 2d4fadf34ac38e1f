pub mod config;
pub mod dst;
pub mod errors;
pub mod gather;
pub mod logging;
pub mod observer;
pub mod protocol;
pub mod response;
pub mod stats;

pub use errors::{Errors, ZipperError};
pub use gather::{MissingShardPolicy, Reducer, ShardReply};
pub use observer::{MergeObserver, RecordingObserver, TracingObserver};
pub use response::{
    merge_fetch_responses, FetchCoordinates, MergeContext, MergeResponse, QueryKind,
    ServerFetchResponse, ServerFindResponse, ServerInfoResponse, ServerTagResponse,
};
pub use stats::Stats;
