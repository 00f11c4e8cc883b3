//! Omoide - A memoizing cache for expensive computations
//!
//! Serves repeated calls with equal arguments from memory, bounded by a
//! maximum entry count and optional computed/access age limits, with
//! optional background refresh of stale results.

pub mod cache;
pub mod config;
pub mod error;
pub mod memo;
pub mod registry;
pub mod tasks;

pub use cache::{derive_key, Arg, CacheKey, CacheStats, CallArgs, EntryInfo};
pub use config::{CacheConfig, RefreshMode, SizeEvictionPolicy};
pub use error::{CacheError, CallError};
pub use memo::{ComputeFuture, MemoCache};
pub use registry::CacheRegistry;
