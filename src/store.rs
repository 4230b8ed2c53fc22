use anyhow::Result;

use crate::error::TrackerError;
use crate::models::{ApplicationStatus, JobApplicationRecord, RowId, StoredRecord};
use crate::reconcile::Action;

/// First data row; row 1 is the header.
pub const FIRST_DATA_ROW: u32 = 2;

pub trait RecordStore {
    fn list_all(&mut self) -> Result<Vec<StoredRecord>>;
    fn append(&mut self, record: &JobApplicationRecord) -> Result<RowId>;
    fn update_status(&mut self, row: RowId, status: ApplicationStatus) -> Result<()>;

    /// Performs the write a reconcile decision asks for. Returns the touched
    /// row, or `None` for a no-op.
    fn apply_action(&mut self, action: Action) -> Result<Option<RowId>> {
        match action {
            Action::Insert(record) => self.append(&record).map(Some),
            Action::UpdateStatus { row, status } => {
                self.update_status(row, status)?;
                Ok(Some(row))
            }
            Action::NoOp => Ok(None),
        }
    }
}

pub trait Presentation {
    fn highlight_rejected(&mut self, row: RowId) -> Result<()>;
    fn clear_highlight(&mut self, row: RowId) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Vec<StoredRecord>,
    highlighted: Vec<RowId>,
}

impl MemoryStore {
    pub fn from_rows(rows: Vec<StoredRecord>) -> Self {
        Self {
            rows,
            highlighted: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn highlighted(&self) -> &[RowId] {
        &self.highlighted
    }

    fn next_row(&self) -> RowId {
        let last = self.rows.iter().map(|r| r.row.0).max().unwrap_or(FIRST_DATA_ROW - 1);
        RowId(last + 1)
    }
}

impl RecordStore for MemoryStore {
    fn list_all(&mut self) -> Result<Vec<StoredRecord>> {
        Ok(self.rows.clone())
    }

    fn append(&mut self, record: &JobApplicationRecord) -> Result<RowId> {
        let row = self.next_row();
        self.rows.push(StoredRecord {
            row,
            record: record.clone(),
        });
        Ok(row)
    }

    fn update_status(&mut self, row: RowId, status: ApplicationStatus) -> Result<()> {
        let stored = self
            .rows
            .iter_mut()
            .find(|r| r.row == row)
            .ok_or_else(|| TrackerError::StoreUnavailable(format!("row {} does not exist", row)))?;
        stored.record.status = status;
        Ok(())
    }
}

impl Presentation for MemoryStore {
    fn highlight_rejected(&mut self, row: RowId) -> Result<()> {
        if !self.highlighted.contains(&row) {
            self.highlighted.push(row);
        }
        Ok(())
    }

    fn clear_highlight(&mut self, row: RowId) -> Result<()> {
        self.highlighted.retain(|r| *r != row);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(company: &str) -> JobApplicationRecord {
        JobApplicationRecord {
            company: company.to_string(),
            job_title: "Engineer".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            sender_email: "jobs@example.com".to_string(),
            status: ApplicationStatus::Submitted,
        }
    }

    #[test]
    fn test_memory_store_rows_start_after_header() {
        let mut store = MemoryStore::default();
        assert_eq!(store.append(&record("Acme")).unwrap(), RowId(2));
        assert_eq!(store.append(&record("Globex")).unwrap(), RowId(3));
    }

    #[test]
    fn test_memory_store_continues_after_seeded_rows() {
        let mut store = MemoryStore::from_rows(vec![StoredRecord {
            row: RowId(7),
            record: record("Acme"),
        }]);
        assert_eq!(store.append(&record("Globex")).unwrap(), RowId(8));
    }

    #[test]
    fn test_update_status_touches_only_status() {
        let mut store = MemoryStore::default();
        let row = store.append(&record("Acme")).unwrap();
        store.update_status(row, ApplicationStatus::Offer).unwrap();

        let rows = store.list_all().unwrap();
        assert_eq!(rows[0].record.status, ApplicationStatus::Offer);
        assert_eq!(rows[0].record.company, "Acme");
        assert_eq!(rows[0].record.date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn test_update_missing_row_fails() {
        let mut store = MemoryStore::default();
        let err = store.update_status(RowId(5), ApplicationStatus::Offer).unwrap_err();
        assert!(err.to_string().contains("row 5"));
    }

    #[test]
    fn test_apply_noop_writes_nothing() {
        let mut store = MemoryStore::default();
        assert_eq!(store.apply_action(Action::NoOp).unwrap(), None);
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_highlight_is_recorded_once() {
        let mut store = MemoryStore::default();
        store.highlight_rejected(RowId(2)).unwrap();
        store.highlight_rejected(RowId(2)).unwrap();
        assert_eq!(store.highlighted(), &[RowId(2)]);
    }

    #[test]
    fn test_clear_highlight_removes_only_that_row() {
        let mut store = MemoryStore::default();
        store.highlight_rejected(RowId(2)).unwrap();
        store.highlight_rejected(RowId(3)).unwrap();
        store.clear_highlight(RowId(2)).unwrap();
        store.clear_highlight(RowId(9)).unwrap();
        assert_eq!(store.highlighted(), &[RowId(3)]);
    }
}
