//! Configuration resolution with per-key TTL caching.
//!
//! Settings come from three sources: a dynamic key/value store, the secret
//! store, and the static environment settings bound at startup. The
//! [`ConfigCache`] routes misses to the right backend and keeps one entry
//! per key.

mod cache;
mod store;

pub use cache::{CACHE_DURATION_KEY, ConfigCache, SECRET_TTL};
pub use store::{ConfigStore, ConsulConfigStore};

use std::fmt;

/// Backend a setting is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSource {
    /// Runtime-tunable key/value store
    Dynamic,
    /// Secret store; values are credentials
    Secret,
    /// Environment settings fixed at startup
    Static,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Dynamic => "dynamic",
            Self::Secret => "secret",
            Self::Static => "static",
        };
        f.write_str(name)
    }
}
