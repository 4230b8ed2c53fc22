use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

pub const APP_PASSWORD_ENV: &str = "JOBTRACK_GMAIL_APP_PASSWORD";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub gmail: GmailConfig,
    pub sheets: SheetsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    /// Gmail address to log in as
    pub address: String,

    /// File holding the app password; falls back to $JOBTRACK_GMAIL_APP_PASSWORD
    #[serde(default)]
    pub password_file: Option<String>,

    #[serde(default = "default_imap_server")]
    pub imap_server: String,

    #[serde(default = "default_imap_port")]
    pub port: u16,

    #[serde(default = "default_mailbox")]
    pub mailbox: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,

    /// Service-account key file downloaded from the Google Cloud console
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,

    #[serde(default = "default_worksheet")]
    pub worksheet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// How many days back to look for unread mail
    #[serde(default = "default_days")]
    pub days: u32,

    /// Pause between processed emails, for API rate limits
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: f64,

    /// Subject keywords marking an email as job related
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            days: default_days(),
            delay_secs: default_delay_secs(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            keywords: default_keywords(),
        }
    }
}

fn default_imap_server() -> String {
    "imap.gmail.com".to_string()
}

fn default_imap_port() -> u16 {
    993
}

fn default_mailbox() -> String {
    "INBOX".to_string()
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_worksheet() -> String {
    "Sheet1".to_string()
}

fn default_model() -> String {
    "gemini-flash".to_string()
}

fn default_max_tokens() -> u32 {
    512
}

fn default_days() -> u32 {
    3
}

fn default_delay_secs() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_secs() -> f64 {
    2.0
}

fn default_keywords() -> Vec<String> {
    ["job", "application", "career", "hiring", "interview", "position", "offer"]
        .iter()
        .map(|k| k.to_string())
        .collect()
}

impl Config {
    pub fn default_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobtrack") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            PathBuf::from("jobtrack.toml")
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read config file {}. Run 'jobtrack config init' to create one.",
                path.display()
            )
        })?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.gmail.address.trim().is_empty() {
            bail!("gmail.address must be set");
        }
        if self.sheets.spreadsheet_id.trim().is_empty() {
            bail!("sheets.spreadsheet_id must be set");
        }
        if self.scan.max_retries == 0 {
            bail!("scan.max_retries must be at least 1");
        }
        Ok(())
    }

    pub fn example() -> Self {
        Config {
            gmail: GmailConfig {
                address: "you@gmail.com".to_string(),
                password_file: Some("~/.gmail.app_password.txt".to_string()),
                imap_server: default_imap_server(),
                port: default_imap_port(),
                mailbox: default_mailbox(),
            },
            sheets: SheetsConfig {
                spreadsheet_id: "your-spreadsheet-id".to_string(),
                credentials_path: default_credentials_path(),
                worksheet: default_worksheet(),
            },
            llm: LlmConfig::default(),
            scan: ScanConfig::default(),
        }
    }

    pub fn write_example(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            bail!("{} already exists (use --force to overwrite)", path.display());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(&Self::example())?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Resolves the Gmail app password from the configured file, or the
    /// environment when no file is configured.
    pub fn app_password(&self) -> Result<String> {
        if let Some(file) = &self.gmail.password_file {
            let path = expand_home(file);
            let password = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read password file: {}", path.display()))?;
            return Ok(password.trim().to_string());
        }

        env::var(APP_PASSWORD_ENV)
            .map(|p| p.trim().to_string())
            .with_context(|| {
                format!("No gmail.password_file configured and {} is not set", APP_PASSWORD_ENV)
            })
    }
}

pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}
