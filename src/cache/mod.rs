mod keys;
mod memory;

pub use keys::{CacheKeys, hash_credential};
pub use memory::{DEFAULT_TTL, TtlCache};
