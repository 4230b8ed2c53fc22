use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationStatus {
    Submitted,
    Interview,
    Rejected,
    Offer,
    Unknown,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Submitted => "Submitted",
            ApplicationStatus::Interview => "Interview",
            ApplicationStatus::Rejected => "Rejected",
            ApplicationStatus::Offer => "Offer",
            ApplicationStatus::Unknown => "Unknown",
        }
    }

    /// Lenient parse of free text coming from the LLM or a sheet cell.
    /// Keywords are matched anywhere in the text, strongest outcome first:
    /// rejected, offer, interview, submitted. Anything unrecognised maps to
    /// `Unknown`.
    pub fn parse_lenient(text: &str) -> Self {
        let lower = text.trim().to_lowercase();

        if lower.is_empty() {
            return ApplicationStatus::Unknown;
        }

        if lower.contains("reject") || lower.contains("declined") || lower.contains("not selected") {
            ApplicationStatus::Rejected
        } else if lower.contains("offer") {
            ApplicationStatus::Offer
        } else if lower.contains("interview") {
            ApplicationStatus::Interview
        } else if lower.contains("submit") || lower.contains("applied") || lower.contains("received") {
            ApplicationStatus::Submitted
        } else {
            ApplicationStatus::Unknown
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse_lenient(s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobApplicationRecord {
    pub company: String,
    pub job_title: String,
    pub date: NaiveDate,
    pub sender_email: String,
    pub status: ApplicationStatus,
}

/// 1-based spreadsheet row number. Row 1 holds the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId(pub u32);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub row: RowId,
    pub record: JobApplicationRecord,
}
