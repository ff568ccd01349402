//! State owned by an FFI handle.

use std::future::Future;

use log::info;
use tokio::runtime::{Builder, Runtime};

use crate::attendance_book::AttendanceBook;
use crate::id_generator::UuidGenerator;
use crate::lmdb_store::LmdbStore;
use crate::migration::MigrationReport;
use crate::storage::AttendanceStorage;
use crate::store_config::StoreConfig;
use crate::store_error::StoreError;
use crate::version_gate;

/// An opened store plus the runtime used to drive it.
///
/// The host calls in from a single thread and expects each call to finish
/// before it returns, so every async operation is driven to completion on a
/// private current-thread runtime.
pub struct AppState {
    runtime: Runtime,
    book: AttendanceBook<LmdbStore, UuidGenerator>,
}

impl AppState {
    pub fn init(config: &StoreConfig) -> Result<Self, StoreError> {
        let runtime = Builder::new_current_thread().build()?;
        let store = LmdbStore::open(config)?;
        let book = AttendanceBook::new(AttendanceStorage::new(store), UuidGenerator);

        Ok(Self { runtime, book })
    }

    pub fn book(&self) -> &AttendanceBook<LmdbStore, UuidGenerator> {
        &self.book
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    pub fn run_migrations(&self) -> Result<MigrationReport, StoreError> {
        self.block_on(version_gate::run_migrations(self.book.storage(), self.book.ids()))
    }

    pub fn close(self) -> Result<(), StoreError> {
        let Self { runtime, book } = self;
        drop(runtime);
        let (storage, _) = book.into_parts();
        storage.into_store().close()?;
        info!("App state closed");
        Ok(())
    }
}
