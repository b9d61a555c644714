//! Storage layer for the pitcher database
//!
//! This module wraps the SQLite database, organized into:
//! - `models`: Data structures
//! - `schema`: Connection, schema creation and migrations
//! - `queries`: Upserts, bulk event inserts and record lookups
//! - `analysis`: Pitch-mix aggregation over Statcast events
//! - `sync_log`: History of collection runs

pub mod analysis;
pub mod models;
pub mod queries;
pub mod schema;
pub mod sync_log;


pub use models::*;
pub use queries::{Records, StatcastWriter};
pub use schema::{PitcherDatabase, SCHEMA_VERSION};
pub use sync_log::SYNC_HISTORY_LIMIT;
