//! Persisted schema version and the startup migration entry point.
//!
//! The version lives under [`STORAGE_VERSION_KEY`] as a decimal string. A
//! store that has never been migrated has no version key at all, which reads
//! as version 1 (the original schema), not 0.

use log::{info, warn};

use crate::id_generator::IdGenerator;
use crate::kv_store::KvStore;
use crate::migration::{migrate_v1_to_v2, MigrationReport};
use crate::storage::AttendanceStorage;
use crate::store_error::StoreError;

pub const STORAGE_VERSION_KEY: &str = "__storage_version";

/// Version assumed when nothing has been persisted yet.
pub const BASELINE_VERSION: u32 = 1;

/// Schema version produced by the newest migration.
pub const LATEST_VERSION: u32 = 2;

/// Reads the persisted schema version.
///
/// Missing, unreadable and unparsable values all read as [`BASELINE_VERSION`];
/// the worst outcome is re-running a migration that is safe to repeat.
pub async fn get_version<S: KvStore>(store: &S) -> u32 {
    match store.get(STORAGE_VERSION_KEY).await {
        Ok(Some(raw)) => match raw.trim().parse::<u32>() {
            Ok(version) => version,
            Err(e) => {
                warn!("Unparsable storage version '{raw}', assuming {BASELINE_VERSION}: {e}");
                BASELINE_VERSION
            }
        },
        Ok(None) => BASELINE_VERSION,
        Err(e) => {
            warn!("getStorageVersion error, assuming {BASELINE_VERSION}: {e}");
            BASELINE_VERSION
        }
    }
}

pub async fn set_version<S: KvStore>(store: &S, version: u32) -> Result<(), StoreError> {
    store
        .set(STORAGE_VERSION_KEY, version.to_string())
        .await
        .map_err(|e| {
            warn!("setStorageVersion error: {e}");
            e
        })
}

/// Brings the store up to [`LATEST_VERSION`]. Call once at startup, before
/// any screen reads students or attendance.
///
/// Safe to call on every launch: once the version is current this returns a
/// no-op report without touching any collection. Per-batch failures are
/// reported, not returned. If the batch list itself cannot be read, nothing is
/// migrated and the version is left as is. The only error is failing to
/// persist the new version, in which case the migration simply runs again
/// next launch.
pub async fn run_migrations<S, G>(storage: &AttendanceStorage<S>, ids: &G) -> Result<MigrationReport, StoreError>
where
    S: KvStore,
    G: IdGenerator,
{
    let version = get_version(storage.store()).await;
    info!("current storage version {version}");

    if version >= LATEST_VERSION {
        return Ok(MigrationReport::noop(version));
    }

    let batches = match migrate_v1_to_v2(storage, ids).await {
        Ok(batches) => batches,
        Err(e) => {
            warn!("Could not read batches, leaving storage at v{version}: {e}");
            return Ok(MigrationReport::noop(version));
        }
    };
    set_version(storage.store(), LATEST_VERSION).await?;

    let report = MigrationReport {
        from_version: version,
        to_version: LATEST_VERSION,
        batches,
    };
    let skipped = report.skipped().count();
    if skipped > 0 {
        warn!("Storage migrated to v{LATEST_VERSION} with {skipped} batch(es) skipped");
    } else {
        info!("Storage migrated to v{LATEST_VERSION}");
    }
    Ok(report)
}
