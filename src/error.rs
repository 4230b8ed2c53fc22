use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("Record store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Extraction failed: {0}")]
    ExtractionFailure(String),
    #[error("Google API request failed with status {status}: {body}")]
    GoogleApi { status: u16, body: String },
    #[error("LLM API request failed with status {status}: {body}")]
    LlmApi { status: u16, body: String },
}

impl TrackerError {
    pub fn is_retryable(&self) -> bool {
        match self {
            TrackerError::GoogleApi { status, .. } | TrackerError::LlmApi { status, .. } => {
                *status == 429 || *status >= 500
            }
            _ => false,
        }
    }
}

pub fn is_retryable_error(error: &anyhow::Error) -> bool {
    if let Some(tracker_error) = error.downcast_ref::<TrackerError>() {
        return tracker_error.is_retryable();
    }

    if let Some(reqwest_error) = error.downcast_ref::<reqwest::Error>() {
        if reqwest_error.is_timeout() || reqwest_error.is_connect() {
            return true;
        }

        if let Some(status) = reqwest_error.status() {
            let code = status.as_u16();
            return code == 429 || code >= 500;
        }
    }

    false
}
