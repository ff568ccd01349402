//! Durable on-device [`KvStore`] backed by LMDB.
//!
//! LMDB stays consistent across app crashes and hot restarts, and every
//! [`KvStore::set`] is a single write transaction, so a collection is either
//! fully replaced or left untouched.

use std::path::Path;

use lmdb::{Database, DatabaseFlags, Environment, Transaction, WriteFlags};
use log::{info, warn};

use crate::kv_store::KvStore;
use crate::store_config::StoreConfig;
use crate::store_error::StoreError;

const KV_DB_NAME: &str = "kv";

pub struct LmdbStore {
    env: Environment,
    db: Database,
    config: StoreConfig,
}

impl LmdbStore {
    /// Opens (or creates) the `{name}.lmdb` environment described by `config`.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let lmdb_dir = config.lmdb_dir();
        let path = Path::new(&lmdb_dir);

        if path.exists() {
            info!("Opening existing store at: {}", lmdb_dir);
        } else {
            info!("Creating new store at: {}", lmdb_dir);
            std::fs::create_dir_all(path)?;
        }

        let env = Environment::new()
            .set_max_dbs(1)
            .set_map_size(config.map_size)
            .open(path)?;
        let db = env.create_db(Some(KV_DB_NAME), DatabaseFlags::empty())?;

        Ok(Self {
            env,
            db,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Removes every key while keeping the environment open.
    pub fn clear_all(&self) -> Result<(), StoreError> {
        let mut txn = self.env.begin_rw_txn()?;
        txn.clear_db(self.db)?;
        txn.commit()?;
        Ok(())
    }

    /// Flushes pending writes and releases the environment.
    pub fn close(self) -> Result<(), StoreError> {
        if let Err(e) = self.env.sync(true) {
            warn!("Failed to sync store before closing: {e}");
            return Err(e.into());
        }
        info!("Store '{}' closed", self.config.name);
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let txn = self.env.begin_ro_txn()?;
        let value = match txn.get(self.db, &key) {
            Ok(bytes) => Some(
                String::from_utf8(bytes.to_vec()).map_err(|_| StoreError::Encoding(key.to_string()))?,
            ),
            Err(lmdb::Error::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        txn.commit()?;
        Ok(value)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut txn = self.env.begin_rw_txn()?;
        txn.put(self.db, &key, &value, WriteFlags::empty())?;
        txn.commit()?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut txn = self.env.begin_rw_txn()?;
        match txn.del(self.db, &key, None) {
            Ok(()) | Err(lmdb::Error::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
        txn.commit()?;
        Ok(())
    }
}

impl KvStore for LmdbStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.read(key)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.write(key, &value)
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.delete(key)
    }
}
