use anyhow::Result;
use std::thread;
use std::time::Duration;

use crate::ai::AIProvider;
use crate::config::ScanConfig;
use crate::email::{is_job_related, InboundEmail};
use crate::error::{is_retryable_error, TrackerError};
use crate::extract::extract_record;
use crate::models::{ApplicationStatus, RowId};
use crate::reconcile::{reconcile, Action};
use crate::store::{Presentation, RecordStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Subject did not look job related
    Ignored,
    Skipped(String),
    Inserted(RowId),
    Updated(RowId),
    Unchanged,
}

#[derive(Debug, Default)]
pub struct RunStats {
    pub emails_found: usize,
    pub ignored: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub errors: usize,
}

pub struct Tracker<'a, S> {
    provider: &'a dyn AIProvider,
    store: &'a mut S,
    settings: ScanConfig,
    max_tokens: u32,
}

impl<'a, S: RecordStore + Presentation> Tracker<'a, S> {
    pub fn new(provider: &'a dyn AIProvider, store: &'a mut S, settings: ScanConfig, max_tokens: u32) -> Self {
        Self {
            provider,
            store,
            settings,
            max_tokens,
        }
    }

    pub fn run(&mut self, emails: &[InboundEmail]) -> RunStats {
        let mut stats = RunStats {
            emails_found: emails.len(),
            ..Default::default()
        };

        for (i, email) in emails.iter().enumerate() {
            let outcome = self.process_email(email);

            match outcome {
                Ok(Outcome::Ignored) => {
                    stats.ignored += 1;
                    continue;
                }
                Ok(Outcome::Skipped(reason)) => {
                    tracing::warn!(subject = %email.subject, "Skipping email: {}", reason);
                    stats.skipped += 1;
                }
                Ok(Outcome::Inserted(row)) => {
                    tracing::info!("Added row {} from {}", row, email.sender_email);
                    stats.inserted += 1;
                }
                Ok(Outcome::Updated(row)) => {
                    tracing::info!("Updated status in row {} from {}", row, email.sender_email);
                    stats.updated += 1;
                }
                Ok(Outcome::Unchanged) => {
                    tracing::info!(subject = %email.subject, "Already recorded, nothing to change");
                    stats.unchanged += 1;
                }
                Err(e) => {
                    tracing::error!(subject = %email.subject, "Error processing email: {:#}", e);
                    stats.errors += 1;
                }
            }

            if self.settings.delay_secs > 0 && i + 1 < emails.len() {
                tracing::debug!("Sleeping {}s before next email", self.settings.delay_secs);
                thread::sleep(Duration::from_secs(self.settings.delay_secs));
            }
        }

        stats
    }

    pub fn process_email(&mut self, email: &InboundEmail) -> Result<Outcome> {
        if !is_job_related(&email.subject, &self.settings.keywords) {
            return Ok(Outcome::Ignored);
        }

        if email.body.trim().is_empty() {
            return Ok(Outcome::Skipped("empty body".to_string()));
        }

        tracing::info!(from = %email.sender_email, subject = %email.subject, "Processing email");

        let (max_retries, delay) = (self.settings.max_retries, self.settings.retry_delay_secs);
        let provider = self.provider;
        let max_tokens = self.max_tokens;

        let record = match with_retry(max_retries, delay, || extract_record(provider, email, max_tokens)) {
            Ok(record) => record,
            Err(e) => return Ok(Outcome::Skipped(format!("{:#}", e))),
        };

        let existing = with_retry(max_retries, delay, || self.store.list_all())
            .map_err(|e| TrackerError::StoreUnavailable(format!("{:#}", e)))?;

        let action = match reconcile(&record, &existing) {
            Ok(action) => action,
            Err(TrackerError::InvalidRecord(reason)) => return Ok(Outcome::Skipped(reason)),
            Err(e) => return Err(e.into()),
        };

        let (outcome, previous) = match &action {
            Action::Insert(_) => (None, None),
            Action::UpdateStatus { row, .. } => {
                let previous = existing.iter().find(|s| s.row == *row).map(|s| s.record.status);
                (Some(Outcome::Updated(*row)), previous)
            }
            Action::NoOp => return Ok(Outcome::Unchanged),
        };

        let row = with_retry(max_retries, delay, || self.store.apply_action(action.clone()))
            .map_err(|e| TrackerError::StoreUnavailable(format!("{:#}", e)))?
            .ok_or_else(|| TrackerError::StoreUnavailable("write returned no row".to_string()))?;

        if record.status == ApplicationStatus::Rejected {
            if let Err(e) = self.store.highlight_rejected(row) {
                tracing::warn!("Failed to highlight row {}: {:#}", row, e);
            }
        } else if previous == Some(ApplicationStatus::Rejected) {
            if let Err(e) = self.store.clear_highlight(row) {
                tracing::warn!("Failed to clear highlight on row {}: {:#}", row, e);
            }
        }

        Ok(outcome.unwrap_or(Outcome::Inserted(row)))
    }
}

/// Runs `op` up to `max_attempts` times, backing off exponentially while the
/// error is transient.
pub fn with_retry<T>(max_attempts: u32, base_delay_secs: f64, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= max_attempts || !is_retryable_error(&err) {
                    return Err(err);
                }
                let backoff = base_delay_secs * 2_f64.powf((attempt - 1) as f64);
                tracing::warn!("Attempt {} failed ({:#}), retrying in {:.1}s", attempt, err, backoff);
                thread::sleep(Duration::from_secs_f64(backoff.max(0.0)));
            }
        }
    }
}
