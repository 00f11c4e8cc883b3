//! Cache Module
//!
//! Key derivation, per-key entry state, the entry store and the eviction
//! engine.

mod entry;
pub mod eviction;
mod key;
mod stats;
mod store;


// Re-export public types
pub use entry::{CacheEntry, EntryInfo};
pub use eviction::Evictor;
pub use key::{derive_key, Arg, CacheKey, CallArgs};
pub(crate) use key::into_key;
pub use stats::CacheStats;
pub use store::EntryStore;

// == Public Constants ==
/// Removal attempts a size eviction pass makes before clearing the store
pub const MAX_EVICTION_ATTEMPTS: usize = 10;
