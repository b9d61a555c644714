//! Process-wide plumbing shared by the pipeline
//!
//! - `config`: settings read once from the environment
//! - `http`: default request headers
//! - `logging`: tracing subscriber setup
//! - `paths`: default database and backup locations

pub mod config;
pub mod http;
pub mod logging;
pub mod paths;

pub use config::Settings;
pub use logging::init_logging;
