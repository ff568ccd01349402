use uuid::Uuid;

/// Source of opaque, statistically unique identifiers for batches, students
/// and attendance records.
pub trait IdGenerator: Send + Sync {
    fn new_id(&self) -> String;
}

/// Random (v4) UUIDs in their hyphenated form.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn new_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
