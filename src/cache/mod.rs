// Response cache module
// Author: kelexine (https://github.com/kelexine)

pub mod models;
pub mod ttl;

pub use models::{CacheEntry, CacheStats, EntryStats};
pub use ttl::TtlCache;
