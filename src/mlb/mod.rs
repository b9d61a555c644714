//! MLB Stats API access: throttled client, response envelopes and the
//! parsers that turn raw records into storage models.

pub mod http;
pub mod parse;
pub mod rate_limit;
pub mod statcast;
pub mod types;

pub use http::MlbClient;
pub use rate_limit::{Attempt, Clock, RateLimiter, RetryPolicy, TokioClock};
pub use statcast::StatcastColumns;
