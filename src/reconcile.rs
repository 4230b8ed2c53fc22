//! Decides what to do with one freshly extracted application record given the
//! rows already stored. Pure: the caller performs every write.

use crate::error::TrackerError;
use crate::models::{ApplicationStatus, JobApplicationRecord, RowId, StoredRecord};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    company: String,
    job_title: String,
    sender_email: String,
}

impl IdentityKey {
    pub fn of(record: &JobApplicationRecord) -> Self {
        Self {
            company: normalize(&record.company),
            job_title: normalize(&record.job_title),
            sender_email: normalize(&record.sender_email),
        }
    }
}

fn normalize(field: &str) -> String {
    field.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Insert(JobApplicationRecord),
    UpdateStatus { row: RowId, status: ApplicationStatus },
    NoOp,
}

pub fn reconcile(
    new_record: &JobApplicationRecord,
    existing: &[StoredRecord],
) -> Result<Action, TrackerError> {
    if new_record.company.trim().is_empty() {
        return Err(TrackerError::InvalidRecord("missing company".to_string()));
    }
    if new_record.job_title.trim().is_empty() {
        return Err(TrackerError::InvalidRecord("missing job title".to_string()));
    }

    let key = IdentityKey::of(new_record);

    let action = match existing.iter().find(|stored| IdentityKey::of(&stored.record) == key) {
        None => Action::Insert(new_record.clone()),
        Some(stored) if stored.record.status == new_record.status => Action::NoOp,
        Some(stored) => Action::UpdateStatus {
            row: stored.row,
            status: new_record.status,
        },
    };

    Ok(action)
}
