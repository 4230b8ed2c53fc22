use anyhow::Result;
use std::collections::HashMap;

use crate::ai::AIProvider;
use crate::email::InboundEmail;
use crate::error::TrackerError;
use crate::models::{ApplicationStatus, JobApplicationRecord};

pub fn extraction_prompt(email_body: &str) -> String {
    format!(
        "You are an intelligent assistant reading an email about a job application.\n\
        Extract the following details:\n\
        - Job Title\n\
        - Company Name\n\
        - Application Status (one of: Submitted, Interview, Offer, Rejected, Other)\n\n\
        Respond only with the following format:\n\
        Job Title: [The Job Title]\n\
        Company Name: [The Company Name]\n\
        Application Status: [The Application Status]\n\n\
        EMAIL BODY:\n{}",
        email_body
    )
}

/// Turns `Key: value` lines into a map keyed by snake_case names
/// (`Job Title` becomes `job_title`).
pub fn parse_reply(output: &str) -> HashMap<String, String> {
    let mut data = HashMap::new();

    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };

        let key = clean(key).to_lowercase().replace(' ', "_");
        if key.is_empty() {
            continue;
        }
        data.insert(key, clean(value));
    }

    data
}

fn clean(text: &str) -> String {
    text.trim()
        .trim_start_matches(['-', '*'])
        .trim_end_matches('*')
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim()
        .to_string()
}

pub fn extract_record(
    provider: &dyn AIProvider,
    email: &InboundEmail,
    max_tokens: u32,
) -> Result<JobApplicationRecord> {
    let reply = provider.complete(&extraction_prompt(&email.body), max_tokens)?;
    let reply = reply.trim();
    if reply.is_empty() {
        return Err(TrackerError::ExtractionFailure(format!(
            "{} returned an empty reply",
            provider.model_name()
        ))
        .into());
    }

    tracing::debug!(model = provider.model_name(), "LLM reply:\n{}", reply);
    Ok(record_from_reply(reply, email))
}

pub fn record_from_reply(reply: &str, email: &InboundEmail) -> JobApplicationRecord {
    let fields = parse_reply(reply);
    let field = |name: &str| fields.get(name).cloned().unwrap_or_default();

    JobApplicationRecord {
        company: field("company_name"),
        job_title: field("job_title"),
        date: email.received,
        sender_email: email.sender_email.clone(),
        status: ApplicationStatus::parse_lenient(&field("application_status")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::cell::RefCell;

    struct CannedProvider {
        reply: String,
        prompts: RefCell<Vec<String>>,
    }

    impl CannedProvider {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl AIProvider for CannedProvider {
        fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String> {
            self.prompts.borrow_mut().push(prompt.to_string());
            Ok(self.reply.clone())
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    fn email(body: &str) -> InboundEmail {
        InboundEmail {
            sender_email: "careers@acme.com".to_string(),
            subject: "Your application".to_string(),
            body: body.to_string(),
            received: NaiveDate::from_ymd_opt(2024, 5, 14).unwrap(),
        }
    }

    #[test]
    fn test_parse_reply_normalizes_keys() {
        let data = parse_reply("Job Title: Data Intern\nCompany Name: Acme Corp\nApplication Status: Interview");
        assert_eq!(data["job_title"], "Data Intern");
        assert_eq!(data["company_name"], "Acme Corp");
        assert_eq!(data["application_status"], "Interview");
    }

    #[test]
    fn test_parse_reply_keeps_colons_in_value() {
        let data = parse_reply("Job Title: Engineer: Platform");
        assert_eq!(data["job_title"], "Engineer: Platform");
    }

    #[test]
    fn test_parse_reply_strips_markdown_and_brackets() {
        let data = parse_reply("**Job Title:** [Backend Engineer]\n- Company Name: Globex\n\nnoise without separator");
        assert_eq!(data["job_title"], "Backend Engineer");
        assert_eq!(data["company_name"], "Globex");
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn test_record_from_reply_defaults_status_to_unknown() {
        let record = record_from_reply("Job Title: Intern\nCompany Name: Acme", &email("..."));
        assert_eq!(record.status, ApplicationStatus::Unknown);
        assert_eq!(record.sender_email, "careers@acme.com");
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 5, 14).unwrap());
    }

    #[test]
    fn test_extract_record_sends_body_in_prompt() {
        let provider = CannedProvider::new("Job Title: Intern\nCompany Name: Acme\nApplication Status: Rejected\n");
        let record = extract_record(&provider, &email("We regret to inform you"), 256).unwrap();

        assert_eq!(record.company, "Acme");
        assert_eq!(record.job_title, "Intern");
        assert_eq!(record.status, ApplicationStatus::Rejected);
        assert!(provider.prompts.borrow()[0].ends_with("We regret to inform you"));
    }

    #[test]
    fn test_extract_record_empty_reply_is_failure() {
        let provider = CannedProvider::new("   \n");
        let err = extract_record(&provider, &email("body"), 256).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::ExtractionFailure(_))
        ));
    }
}
