use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use mailparse::{parse_mail, MailHeaderMap, ParsedMail};
use regex::Regex;
use scraper::Html;
use std::net::TcpStream;
use std::time::Duration;

use crate::config::Config;

pub struct EmailConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub mailbox: String,
}

impl EmailConfig {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            server: config.gmail.imap_server.clone(),
            port: config.gmail.port,
            username: config.gmail.address.clone(),
            password: config.app_password()?,
            mailbox: config.gmail.mailbox.clone(),
        })
    }
}

/// One unread message, reduced to what extraction needs.
#[derive(Debug, Clone)]
pub struct InboundEmail {
    pub sender_email: String,
    pub subject: String,
    pub body: String,
    pub received: NaiveDate,
}

pub struct Mailbox {
    session: imap::Session<native_tls::TlsStream<TcpStream>>,
}

impl Mailbox {
    pub fn connect(config: &EmailConfig) -> Result<Self> {
        let tls = native_tls::TlsConnector::builder().build()?;

        let addr = (config.server.as_str(), config.port);
        let tcp = TcpStream::connect(addr).context("Failed to connect to IMAP server")?;
        tcp.set_read_timeout(Some(Duration::from_secs(30)))?;
        tcp.set_write_timeout(Some(Duration::from_secs(30)))?;
        let tls_stream = tls
            .connect(&config.server, tcp)
            .context("TLS handshake failed")?;

        let client = imap::Client::new(tls_stream);
        let mut session = client
            .login(&config.username, &config.password)
            .map_err(|e| anyhow!("Login failed: {}", e.0))?;

        session
            .select(&config.mailbox)
            .with_context(|| format!("Failed to select mailbox {}", config.mailbox))?;

        tracing::debug!(server = %config.server, user = %config.username, "IMAP session open");
        Ok(Self { session })
    }

    /// Fetches unread messages from the last `days` days without marking them
    /// as read.
    pub fn fetch_unseen(&mut self, days: u32) -> Result<Vec<InboundEmail>> {
        let query = build_unseen_query(days, Local::now().date_naive());
        let mut ids: Vec<u32> = self
            .session
            .search(&query)
            .with_context(|| format!("IMAP search failed: {}", query))?
            .into_iter()
            .collect();
        ids.sort_unstable();

        tracing::info!("Found {} unread emails from the last {} days", ids.len(), days);

        let mut emails = Vec::with_capacity(ids.len());
        for id in ids {
            let messages = match self.session.fetch(id.to_string(), "BODY.PEEK[]") {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::warn!("Failed to fetch message {}: {}", id, e);
                    continue;
                }
            };

            for message in messages.iter() {
                let Some(raw) = message.body() else {
                    continue;
                };
                match parse_message(raw) {
                    Ok(email) => emails.push(email),
                    Err(e) => tracing::warn!("Failed to parse message {}: {}", id, e),
                }
            }
        }

        Ok(emails)
    }

    pub fn logout(mut self) -> Result<()> {
        self.session.logout().context("Failed to logout")?;
        Ok(())
    }
}

/// Calendar date in the sender's own offset. Headers chrono rejects
/// (trailing comments, obsolete zones) fall back to mailparse, read as UTC.
fn received_date(header: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc2822(header.trim())
        .map(|dt| dt.date_naive())
        .ok()
        .or_else(|| {
            mailparse::dateparse(header)
                .ok()
                .and_then(|ts| DateTime::from_timestamp(ts, 0))
                .map(|dt| dt.date_naive())
        })
}

pub fn build_unseen_query(days: u32, today: NaiveDate) -> String {
    let since = today - chrono::Duration::days(days as i64);
    format!("UNSEEN SINCE {}", since.format("%d-%b-%Y"))
}

pub fn parse_message(raw: &[u8]) -> Result<InboundEmail> {
    let parsed = parse_mail(raw)?;

    let subject = parsed
        .headers
        .get_first_value("Subject")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "No Subject".to_string());

    let from = parsed.headers.get_first_value("From").unwrap_or_default();
    let sender_email = extract_sender_address(&from).unwrap_or_default();

    let received = parsed
        .headers
        .get_first_value("Date")
        .and_then(|d| received_date(&d))
        .unwrap_or_else(|| Local::now().date_naive());

    let body = get_email_body(&parsed)?;

    Ok(InboundEmail {
        sender_email,
        subject,
        body,
        received,
    })
}

pub fn extract_sender_address(from: &str) -> Option<String> {
    let re = Regex::new(r"[\w.+-]+@[\w.-]+").ok()?;
    re.find(from).map(|m| m.as_str().to_string())
}

pub fn is_job_related(subject: &str, keywords: &[String]) -> bool {
    let subject = subject.to_lowercase();
    keywords
        .iter()
        .any(|keyword| subject.contains(&keyword.to_lowercase()))
}

fn get_email_body(parsed: &ParsedMail) -> Result<String> {
    if let Some(text) = find_part(parsed, "text/plain") {
        return Ok(text);
    }

    // HTML-only mail: keep the visible text
    if let Some(html) = find_part(parsed, "text/html") {
        return Ok(html_to_text(&html));
    }

    if parsed.subparts.is_empty() {
        return Ok(parsed.get_body()?);
    }

    Err(anyhow!("No email body found"))
}

fn find_part(part: &ParsedMail, mimetype: &str) -> Option<String> {
    if part.subparts.is_empty() {
        if part.ctype.mimetype.eq_ignore_ascii_case(mimetype) {
            return part.get_body().ok();
        }
        return None;
    }

    part.subparts.iter().find_map(|sub| find_part(sub, mimetype))
}

fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
