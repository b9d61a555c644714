//! Type-safe wrappers for MLB identifiers and time windows.

pub mod ids;
pub mod time;

pub use ids::{GameId, PlayerId, TeamId};
pub use time::{Days, Season};
