//! Schema migration from v1 to v2.
//!
//! v1 identified students by the `id` the user typed, which could be edited
//! and could collide. v2 gives every student an immutable generated `uid`,
//! keeps the old `id` as the display-only `rollNo`, and rewrites every
//! attendance entry from `studentId` to `uid`.
//!
//! The rewrite works on raw JSON rather than on [`Student`] records because
//! the input is, by definition, not in the current shape. Fields the
//! migration does not touch are carried through as-is.
//!
//! Collections are loaded like the typed getters load them: a missing or
//! malformed value is an empty collection, so a batch with a corrupt roster
//! still gets placeholders for every student its history refers to. Each
//! batch is migrated independently. A batch whose data cannot be read or
//! written is logged and reported as skipped; the others still run.
//!
//! Every step is safe to repeat: students that already have a `uid` are kept
//! verbatim, and entries that already carry a `uid` without a legacy
//! `studentId` are left alone, so a second pass over a partially migrated
//! store only finishes the remainder.
//!
//! [`Student`]: crate::attendance_model::Student

use std::collections::HashMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};

use crate::attendance_model::now_timestamp;
use crate::id_generator::IdGenerator;
use crate::kv_store::KvStore;
use crate::storage::{attendance_key, students_key, AttendanceStorage, BATCHES_KEY};
use crate::store_error::StoreError;

/// Name given to students the migration had to invent or could not name.
pub const UNKNOWN_STUDENT_NAME: &str = "Unknown";

/// What happened to one batch's data during a migration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    /// v1 students given a fresh `uid`.
    pub students_converted: usize,
    /// Students that already had a `uid` and were kept unchanged.
    pub students_kept: usize,
    /// Students synthesized for attendance entries whose `studentId` matched nobody.
    pub placeholders_created: usize,
    /// Entries rewritten from `studentId` to `uid`.
    pub entries_relinked: usize,
    /// Entries with no student identity at all, given a `uid` with no roster entry.
    pub orphan_entries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum BatchStatus {
    Migrated(BatchStats),
    /// Nothing left to convert; no writes were issued.
    Unchanged,
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub batch_id: String,
    #[serde(flatten)]
    pub status: BatchStatus,
}

/// Summary of a [`run_migrations`](crate::version_gate::run_migrations) call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    pub batches: Vec<BatchOutcome>,
}

impl MigrationReport {
    pub fn noop(version: u32) -> Self {
        Self {
            from_version: version,
            to_version: version,
            batches: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.from_version == self.to_version
    }

    pub fn skipped(&self) -> impl Iterator<Item = &BatchOutcome> {
        self.batches
            .iter()
            .filter(|outcome| matches!(outcome.status, BatchStatus::Skipped { .. }))
    }

    pub fn migrated(&self) -> impl Iterator<Item = (&str, &BatchStats)> {
        self.batches.iter().filter_map(|outcome| match &outcome.status {
            BatchStatus::Migrated(stats) => Some((outcome.batch_id.as_str(), stats)),
            _ => None,
        })
    }
}

/// Runs the v1 to v2 rewrite over every batch, in batch order.
///
/// Batches are read as raw JSON and only their `id` is used, so one batch in
/// an unexpected shape does not hide the others. Per-batch errors end up in
/// the returned outcomes. The only error returned is a store failure while
/// reading the batch list itself. Advancing the schema version is left to the
/// caller.
pub async fn migrate_v1_to_v2<S, G>(storage: &AttendanceStorage<S>, ids: &G) -> Result<Vec<BatchOutcome>, StoreError>
where
    S: KvStore,
    G: IdGenerator,
{
    info!("Starting migrate_v1_to_v2");
    let batches = storage.read_raw(BATCHES_KEY).await?;
    let mut outcomes = Vec::with_capacity(batches.len());

    for batch in batches {
        let Some(batch_id) = batch.get("id").and_then(scalar_label) else {
            warn!("Skipping batch without an id: {batch}");
            continue;
        };

        let status = match migrate_batch(storage, ids, &batch_id).await {
            Ok(Some(stats)) => {
                info!("Migrated batch {batch_id}: {stats:?}");
                BatchStatus::Migrated(stats)
            }
            Ok(None) => BatchStatus::Unchanged,
            Err(e) => {
                warn!("Migration error for batch {batch_id}, skipping: {e}");
                BatchStatus::Skipped { reason: e.to_string() }
            }
        };
        outcomes.push(BatchOutcome { batch_id, status });
    }

    info!("migrate_v1_to_v2 completed for {} batches", outcomes.len());
    Ok(outcomes)
}

/// Migrates one batch. Returns `None` when the batch was already in v2 shape.
async fn migrate_batch<S, G>(storage: &AttendanceStorage<S>, ids: &G, batch_id: &str) -> Result<Option<BatchStats>, StoreError>
where
    S: KvStore,
    G: IdGenerator,
{
    let roster_key = students_key(batch_id);
    let history_key = attendance_key(batch_id);

    let students = storage.read_raw(&roster_key).await?;
    let mut records = storage.read_raw(&history_key).await?;

    let mut pass = BatchPass::new(ids);
    pass.convert_students(students);
    for record in &mut records {
        pass.relink_record(record);
    }

    if !pass.changed {
        return Ok(None);
    }

    storage.write_raw(&roster_key, &pass.students).await?;
    storage.write_raw(&history_key, &records).await?;
    Ok(Some(pass.stats))
}

struct BatchPass<'a, G> {
    ids: &'a G,
    now: String,
    /// Old student identity (v1 `id`, later `rollNo`) to `uid`.
    uids_by_identity: HashMap<String, String>,
    students: Vec<JsonValue>,
    stats: BatchStats,
    changed: bool,
}

impl<'a, G: IdGenerator> BatchPass<'a, G> {
    fn new(ids: &'a G) -> Self {
        Self {
            ids,
            now: now_timestamp(),
            uids_by_identity: HashMap::new(),
            students: Vec::new(),
            stats: BatchStats::default(),
            changed: false,
        }
    }

    fn convert_students(&mut self, students: Vec<JsonValue>) {
        self.students.reserve(students.len());

        for student in students {
            if let Some(uid) = non_empty_str(student.get("uid")) {
                let identity = student
                    .get("rollNo")
                    .and_then(scalar_label)
                    .or_else(|| student.get("id").and_then(scalar_label));
                if let Some(identity) = identity {
                    self.uids_by_identity.insert(identity, uid.to_string());
                }
                self.stats.students_kept += 1;
                self.students.push(student);
                continue;
            }

            let old_id = student.get("id").and_then(scalar_label);
            let uid = self.ids.new_id();
            let name = non_empty_str(student.get("name")).unwrap_or(UNKNOWN_STUDENT_NAME);
            let created_at = student
                .get("createdAt")
                .and_then(scalar_label)
                .unwrap_or_else(|| self.now.clone());

            let migrated = json!({
                "uid": uid,
                "rollNo": old_id.clone().unwrap_or_default(),
                "name": name,
                "createdAt": created_at,
                "updatedAt": self.now,
            });

            if let Some(old_id) = old_id {
                self.uids_by_identity.insert(old_id, uid);
            }
            self.students.push(migrated);
            self.stats.students_converted += 1;
            self.changed = true;
        }
    }

    fn relink_record(&mut self, record: &mut JsonValue) {
        let Some(entries) = record.get_mut("attendance").and_then(JsonValue::as_array_mut) else {
            return;
        };

        for entry in entries.iter_mut() {
            if !entry.is_object() {
                warn!("Skipping attendance entry that is not an object: {entry}");
                continue;
            }
            if let Some(entry) = entry.as_object_mut() {
                self.relink_entry(entry);
            }
        }
    }

    fn relink_entry(&mut self, entry: &mut Map<String, JsonValue>) {
        let legacy = entry.remove("studentId");
        if legacy.is_some() {
            self.changed = true;
        }

        match legacy.as_ref().and_then(scalar_label) {
            Some(old_id) => {
                let uid = self.uid_for(old_id);
                entry.insert("uid".to_string(), JsonValue::String(uid));
                self.stats.entries_relinked += 1;
            }
            None if non_empty_str(entry.get("uid")).is_some() => {}
            None => {
                entry.insert("uid".to_string(), JsonValue::String(self.ids.new_id()));
                self.stats.orphan_entries += 1;
                self.changed = true;
            }
        }
    }

    /// Resolves an old identity, creating a placeholder student when nobody on
    /// the roster carries it.
    fn uid_for(&mut self, old_id: String) -> String {
        if let Some(uid) = self.uids_by_identity.get(&old_id) {
            return uid.clone();
        }

        let uid = self.ids.new_id();
        self.students.push(json!({
            "uid": uid,
            "rollNo": old_id,
            "name": UNKNOWN_STUDENT_NAME,
            "createdAt": self.now,
            "updatedAt": self.now,
        }));
        self.stats.placeholders_created += 1;
        self.uids_by_identity.insert(old_id, uid.clone());
        uid
    }
}

fn non_empty_str(value: Option<&JsonValue>) -> Option<&str> {
    value.and_then(JsonValue::as_str).filter(|s| !s.is_empty())
}

/// Renders a legacy scalar as a string. Old rosters sometimes stored numeric
/// ids and epoch-millisecond timestamps.
fn scalar_label(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
