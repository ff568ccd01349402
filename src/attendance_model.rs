//! Record types persisted by the accessor layer.
//!
//! All records serialize with camelCase field names so data written by earlier
//! releases of the app reads back unchanged. Timestamps are kept as the
//! RFC 3339 strings they were stored as; [`now_timestamp`] produces new ones.
//! Descriptive fields also accept numbers and `null`, which older releases
//! sometimes wrote, so one odd record does not hide a whole collection.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

/// A named group of students sharing attendance tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub created_at: String,
}

/// A roster entry in the current (v2) shape.
///
/// `uid` is system generated and never reassigned. `roll_no` is the display
/// label the user typed, and may repeat within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub uid: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub roll_no: String,
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub created_at: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub updated_at: String,
}

/// One student's mark inside an [`AttendanceRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    pub uid: String,
    pub present: bool,
}

/// The result of one "take attendance" action. Never rewritten after creation
/// except by the schema migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub batch_id: String,
    /// Batch name at the time the record was taken.
    pub batch_name: String,
    pub date: String,
    pub attendance: Vec<AttendanceEntry>,
}

/// Present/total counts for a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceSummary {
    pub present: usize,
    pub total: usize,
    /// Rounded to the nearest whole percent; 0 for an empty record.
    pub percentage: u32,
}

impl AttendanceSummary {
    pub fn of(record: &AttendanceRecord) -> Self {
        let total = record.attendance.len();
        let present = record.attendance.iter().filter(|entry| entry.present).count();
        let percentage = if total == 0 {
            0
        } else {
            (present as f64 / total as f64 * 100.0).round() as u32
        };

        Self { present, total, percentage }
    }
}

// Numbers keep their textual form; anything else non-string reads as "".
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) => s,
        JsonValue::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// Current UTC time as an RFC 3339 string with millisecond precision.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
