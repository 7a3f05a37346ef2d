//! Serializable records the cache hands to its host
//!
//! Change events published after every mutation, and point-in-time
//! snapshots of the whole cache.

pub mod change;
pub mod snapshot;

// Re-export commonly used types
pub use change::{CacheChange, ChangeKind};
pub use snapshot::{CacheSnapshot, SlotSnapshot};
