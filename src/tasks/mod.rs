//! Background Tasks Module
//!
//! Contains the work that runs outside of `get` calls.
//!
//! # Tasks
//! - Refresh: recomputes stale entries, coupled to access or on a timer

mod refresh;

pub use refresh::{refresh_stale, SweepReport};
pub(crate) use refresh::{spawn_coupled_refresh, spawn_independent_refresh};
