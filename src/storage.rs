//! Typed accessors for the three persisted collections.
//!
//! | Key | Value |
//! |-----|-------|
//! | `batches` | `[Batch]` |
//! | `students_{batchId}` | `[Student]` |
//! | `attendance_{batchId}` | `[AttendanceRecord]` |
//!
//! Every collection is one JSON array under one key, so every mutation is a
//! read-modify-write of the whole collection. Two writers racing on the same
//! key will lose one update; the app serializes user actions, so this is
//! accepted.
//!
//! Reads never fail: a missing key, a malformed value or a store error all
//! yield an empty collection (the latter two are logged). Writes propagate
//! failures so the caller can tell the user their change was not saved.

use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::attendance_model::{AttendanceRecord, Batch, Student};
use crate::kv_store::KvStore;
use crate::store_error::StoreError;

pub const BATCHES_KEY: &str = "batches";

pub fn students_key(batch_id: &str) -> String {
    format!("students_{batch_id}")
}

pub fn attendance_key(batch_id: &str) -> String {
    format!("attendance_{batch_id}")
}

pub struct AttendanceStorage<S> {
    store: S,
}

impl<S: KvStore> AttendanceStorage<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub async fn get_batches(&self) -> Vec<Batch> {
        self.read_collection(BATCHES_KEY).await
    }

    pub async fn set_batches(&self, batches: &[Batch]) -> Result<(), StoreError> {
        self.write_collection(BATCHES_KEY, batches).await
    }

    pub async fn get_students(&self, batch_id: &str) -> Vec<Student> {
        self.read_collection(&students_key(batch_id)).await
    }

    pub async fn set_students(&self, batch_id: &str, students: &[Student]) -> Result<(), StoreError> {
        self.write_collection(&students_key(batch_id), students).await
    }

    pub async fn get_attendance(&self, batch_id: &str) -> Vec<AttendanceRecord> {
        self.read_collection(&attendance_key(batch_id)).await
    }

    pub async fn set_attendance(&self, batch_id: &str, records: &[AttendanceRecord]) -> Result<(), StoreError> {
        self.write_collection(&attendance_key(batch_id), records).await
    }

    /// Drops the student and attendance collections of a batch.
    pub async fn remove_batch_data(&self, batch_id: &str) -> Result<(), StoreError> {
        self.store.remove(&students_key(batch_id)).await?;
        self.store.remove(&attendance_key(batch_id)).await?;
        Ok(())
    }

    /// Reads a collection without committing to a record shape.
    ///
    /// A malformed value reads as empty, like the typed getters, but a store
    /// failure is returned so the migration can skip the batch and leave its
    /// data alone.
    pub async fn read_raw(&self, key: &str) -> Result<Vec<JsonValue>, StoreError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str(&raw) {
            Ok(items) => Ok(items),
            Err(e) => {
                warn!("Malformed value under '{key}', treating as empty: {e}");
                Ok(Vec::new())
            }
        }
    }

    pub async fn write_raw(&self, key: &str, values: &[JsonValue]) -> Result<(), StoreError> {
        self.write_collection(key, values).await
    }

    async fn read_collection<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Failed to read '{key}', treating as empty: {e}");
                return Vec::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(items) => items,
            Err(e) => {
                warn!("Malformed value under '{key}', treating as empty: {e}");
                Vec::new()
            }
        }
    }

    async fn write_collection<T: Serialize>(&self, key: &str, items: &[T]) -> Result<(), StoreError> {
        let json = serde_json::to_string(items)?;
        self.store.set(key, json).await.map_err(|e| {
            warn!("Failed to write '{key}': {e}");
            e
        })
    }
}
