//! Configuration for opening the on-device store.

use serde::{Deserialize, Serialize};

/// Default LMDB map size: 10 MiB is plenty for rosters and attendance history.
pub const DEFAULT_MAP_SIZE: usize = 10 * 1024 * 1024;

/// Settings used by [`LmdbStore::open`](crate::lmdb_store::LmdbStore::open).
///
/// The store is created as a directory named `{name}.lmdb`. The host usually
/// passes an absolute path inside its documents directory as `name`.
///
/// ```rust
/// use attendance_core::store_config::StoreConfig;
///
/// let config: StoreConfig = serde_json::from_str(r#"{"name":"attendance"}"#)?;
/// assert_eq!(config.lmdb_dir(), "attendance.lmdb");
/// assert_eq!(config.map_size, attendance_core::store_config::DEFAULT_MAP_SIZE);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    pub name: String,
    #[serde(default = "default_map_size")]
    pub map_size: usize,
}

fn default_map_size() -> usize {
    DEFAULT_MAP_SIZE
}

impl StoreConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            map_size: DEFAULT_MAP_SIZE,
        }
    }

    pub fn with_map_size(mut self, map_size: usize) -> Self {
        self.map_size = map_size;
        self
    }

    pub fn lmdb_dir(&self) -> String {
        format!("{}.lmdb", self.name)
    }
}
