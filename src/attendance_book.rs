//! User-facing operations on batches, rosters and attendance.
//!
//! These are the actions the app's screens perform, expressed once on top of
//! [`AttendanceStorage`]. Each one is a read-modify-write of a whole
//! collection and assumes the store has already been brought to the current
//! schema by [`run_migrations`](crate::version_gate::run_migrations).

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};
use log::info;
use serde::{Deserialize, Serialize};

use crate::attendance_model::{now_timestamp, AttendanceEntry, AttendanceRecord, Batch, Student};
use crate::id_generator::IdGenerator;
use crate::kv_store::KvStore;
use crate::storage::AttendanceStorage;
use crate::store_error::StoreError;

pub const UNKNOWN_BATCH_NAME: &str = "Unknown Batch";
pub const UNKNOWN_STUDENT_LABEL: &str = "Unknown Student";

/// An attendance entry joined with the roster, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedEntry {
    pub uid: String,
    pub roll_no: Option<String>,
    pub name: String,
    pub present: bool,
}

pub struct AttendanceBook<S, G> {
    storage: AttendanceStorage<S>,
    ids: G,
}

impl<S: KvStore, G: IdGenerator> AttendanceBook<S, G> {
    pub fn new(storage: AttendanceStorage<S>, ids: G) -> Self {
        Self { storage, ids }
    }

    pub fn storage(&self) -> &AttendanceStorage<S> {
        &self.storage
    }

    pub fn ids(&self) -> &G {
        &self.ids
    }

    pub fn into_parts(self) -> (AttendanceStorage<S>, G) {
        (self.storage, self.ids)
    }

    // Batches

    /// Appends a new batch and starts it with an empty roster and history.
    pub async fn create_batch(&self, name: &str, description: &str) -> Result<Batch, StoreError> {
        let name = required(name, "Batch name is required")?;
        let batch = Batch {
            id: self.ids.new_id(),
            name,
            description: description.trim().to_string(),
            created_at: now_timestamp(),
        };

        let mut batches = self.storage.get_batches().await;
        batches.push(batch.clone());
        self.storage.set_batches(&batches).await?;
        self.storage.set_students(&batch.id, &[]).await?;
        self.storage.set_attendance(&batch.id, &[]).await?;
        info!("Created batch {}", batch.id);
        Ok(batch)
    }

    pub async fn find_batch(&self, batch_id: &str) -> Option<Batch> {
        self.storage
            .get_batches()
            .await
            .into_iter()
            .find(|batch| batch.id == batch_id)
    }

    pub async fn update_batch(&self, batch_id: &str, name: &str, description: &str) -> Result<Batch, StoreError> {
        let name = required(name, "Batch name is required")?;
        let mut batches = self.storage.get_batches().await;
        let batch = batches
            .iter_mut()
            .find(|batch| batch.id == batch_id)
            .ok_or_else(|| StoreError::not_found(format!("No batch found with id: {batch_id}")))?;

        batch.name = name;
        batch.description = description.trim().to_string();
        let updated = batch.clone();

        self.storage.set_batches(&batches).await?;
        Ok(updated)
    }

    /// Removes a batch together with its roster and attendance history.
    /// Returns `false` when no batch had that id.
    pub async fn delete_batch(&self, batch_id: &str) -> Result<bool, StoreError> {
        let mut batches = self.storage.get_batches().await;
        let before = batches.len();
        batches.retain(|batch| batch.id != batch_id);
        let existed = batches.len() != before;

        if existed {
            self.storage.set_batches(&batches).await?;
        }
        self.storage.remove_batch_data(batch_id).await?;

        if existed {
            info!("Deleted batch {batch_id}");
        }
        Ok(existed)
    }

    // Students

    pub async fn add_student(&self, batch_id: &str, roll_no: &str, name: &str) -> Result<Student, StoreError> {
        let name = required(name, "Student name is required")?;
        let roll_no = required(roll_no, "Roll number is required")?;
        let now = now_timestamp();
        let student = Student {
            uid: self.ids.new_id(),
            roll_no,
            name,
            created_at: now.clone(),
            updated_at: now,
        };

        let mut students = self.storage.get_students(batch_id).await;
        students.push(student.clone());
        self.storage.set_students(batch_id, &students).await?;
        Ok(student)
    }

    /// Renames or relabels a student. The `uid` never changes, so attendance
    /// history keeps pointing at the same person.
    pub async fn update_student(&self, batch_id: &str, uid: &str, roll_no: &str, name: &str) -> Result<Student, StoreError> {
        let name = required(name, "Student name is required")?;
        let roll_no = required(roll_no, "Roll number is required")?;

        let mut students = self.storage.get_students(batch_id).await;
        let student = students
            .iter_mut()
            .find(|student| student.uid == uid)
            .ok_or_else(|| StoreError::not_found(format!("No student found with uid: {uid}")))?;

        student.roll_no = roll_no;
        student.name = name;
        student.updated_at = now_timestamp();
        let updated = student.clone();

        self.storage.set_students(batch_id, &students).await?;
        Ok(updated)
    }

    pub async fn delete_student(&self, batch_id: &str, uid: &str) -> Result<bool, StoreError> {
        let mut students = self.storage.get_students(batch_id).await;
        let before = students.len();
        students.retain(|student| student.uid != uid);

        if students.len() == before {
            return Ok(false);
        }
        self.storage.set_students(batch_id, &students).await?;
        Ok(true)
    }

    // Attendance

    /// Records one session for the whole roster. Students missing from
    /// `marks` are counted present.
    pub async fn take_attendance(&self, batch_id: &str, marks: &HashMap<String, bool>) -> Result<AttendanceRecord, StoreError> {
        let batch_name = self
            .find_batch(batch_id)
            .await
            .map(|batch| batch.name)
            .unwrap_or_else(|| UNKNOWN_BATCH_NAME.to_string());

        let attendance = self
            .storage
            .get_students(batch_id)
            .await
            .into_iter()
            .map(|student| AttendanceEntry {
                present: marks.get(&student.uid).copied().unwrap_or(true),
                uid: student.uid,
            })
            .collect();

        let record = AttendanceRecord {
            id: self.ids.new_id(),
            batch_id: batch_id.to_string(),
            batch_name,
            date: now_timestamp(),
            attendance,
        };

        let mut records = self.storage.get_attendance(batch_id).await;
        records.push(record.clone());
        self.storage.set_attendance(batch_id, &records).await?;
        Ok(record)
    }

    pub async fn find_record(&self, record_id: &str) -> Option<AttendanceRecord> {
        for batch in self.storage.get_batches().await {
            let found = self
                .storage
                .get_attendance(&batch.id)
                .await
                .into_iter()
                .find(|record| record.id == record_id);
            if found.is_some() {
                return found;
            }
        }
        None
    }

    /// Every record of every batch, newest first.
    pub async fn history(&self) -> Vec<AttendanceRecord> {
        let mut records = Vec::new();
        for batch in self.storage.get_batches().await {
            records.extend(self.storage.get_attendance(&batch.id).await);
        }
        records.sort_by(|a, b| newest_first(&a.date, &b.date));
        records
    }

    pub async fn resolve_entries(&self, record: &AttendanceRecord) -> Vec<ResolvedEntry> {
        let students: HashMap<String, Student> = self
            .storage
            .get_students(&record.batch_id)
            .await
            .into_iter()
            .map(|student| (student.uid.clone(), student))
            .collect();

        record
            .attendance
            .iter()
            .map(|entry| match students.get(&entry.uid) {
                Some(student) => ResolvedEntry {
                    uid: entry.uid.clone(),
                    roll_no: Some(student.roll_no.clone()),
                    name: student.name.clone(),
                    present: entry.present,
                },
                None => ResolvedEntry {
                    uid: entry.uid.clone(),
                    roll_no: None,
                    name: UNKNOWN_STUDENT_LABEL.to_string(),
                    present: entry.present,
                },
            })
            .collect()
    }
}

fn required(value: &str, message: &str) -> Result<String, StoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::validation(message));
    }
    Ok(trimmed.to_string())
}

// Unparsable dates sort after every parsable one.
fn newest_first(a: &str, b: &str) -> Ordering {
    let parse = |date: &str| DateTime::<FixedOffset>::parse_from_rfc3339(date).ok();
    match (parse(a), parse(b)) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => b.cmp(a),
    }
}
