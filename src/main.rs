mod ai;
mod auth;
mod config;
mod email;
mod error;
mod extract;
mod models;
mod reconcile;
mod sheets;
mod store;
mod tracker;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::Config;
use email::{EmailConfig, Mailbox};
use models::{ApplicationStatus, StoredRecord};
use sheets::SheetStore;
use std::path::PathBuf;
use store::{MemoryStore, RecordStore};
use tracker::{RunStats, Tracker};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jobtrack")]
#[command(about = "Track job applications from Gmail into a Google Sheet")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan unread email and update the sheet
    Scan {
        /// Number of days to look back
        #[arg(short, long)]
        days: Option<u32>,

        /// Dry run - show what would change without writing to the sheet
        #[arg(long)]
        dry_run: bool,

        /// Model to extract with (gemini-flash, claude-haiku, gpt-4o-mini, ...)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// List tracked applications
    List {
        /// Filter by status (submitted, interview, rejected, offer, unknown)
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by company (substring, case-insensitive)
        #[arg(short = 'C', long)]
        company: Option<String>,
    },

    /// Manage the config file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write an example config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the config file location
    Path,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "jobtrack=debug" } else { "jobtrack=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    match cli.command {
        Commands::Scan { days, dry_run, model } => {
            let config = Config::load(&config_path)?;
            scan(&config, days, dry_run, model.as_deref())?;
        }

        Commands::List { status, company } => {
            let config = Config::load(&config_path)?;
            list(&config, status.as_deref(), company.as_deref())?;
        }

        Commands::Config { command } => match command {
            ConfigCommands::Init { force } => {
                Config::write_example(&config_path, force)?;
                println!("Wrote example config to {}", config_path.display());
                println!("Edit it, then put your Gmail app password in the configured password_file.");
            }
            ConfigCommands::Path => {
                println!("{}", config_path.display());
            }
        },
    }

    Ok(())
}

fn scan(config: &Config, days: Option<u32>, dry_run: bool, model: Option<&str>) -> Result<()> {
    let days = days.unwrap_or(config.scan.days);
    let spec = ai::resolve_model(model.unwrap_or(&config.llm.model))?;
    let provider = ai::create_provider(&spec)?;

    tracing::info!("Connecting to Gmail as {}", config.gmail.address);
    let mut mailbox = Mailbox::connect(&EmailConfig::from_config(config)?)?;
    let emails = mailbox.fetch_unseen(days)?;
    if let Err(e) = mailbox.logout() {
        tracing::warn!("IMAP logout failed: {:#}", e);
    }

    if emails.is_empty() {
        println!("No new unread emails found in the last {} days.", days);
        return Ok(());
    }

    println!(
        "Processing {} unread emails from the last {} days with {}...",
        emails.len(),
        days,
        spec.short_name
    );

    let stats = if dry_run {
        let mut store = dry_run_store(config);
        let before = store.list_all()?;
        let stats = Tracker::new(provider.as_ref(), &mut store, config.scan.clone(), config.llm.max_tokens)
            .run(&emails);

        for line in dry_run_changes(&before, &store.list_all()?) {
            println!("{}", line);
        }
        stats
    } else {
        let mut store = SheetStore::open(&config.sheets)?;
        store.ensure_header()?;
        Tracker::new(provider.as_ref(), &mut store, config.scan.clone(), config.llm.max_tokens)
            .run(&emails)
    };

    print_stats(&stats);
    if dry_run {
        println!("\n(Dry run - the sheet was not modified)");
    }
    Ok(())
}

/// In-memory copy of the sheet so a dry run reconciles against real rows.
fn dry_run_store(config: &Config) -> MemoryStore {
    let rows = SheetStore::open(&config.sheets).and_then(|mut sheet| sheet.list_all());
    match rows {
        Ok(rows) => MemoryStore::from_rows(rows),
        Err(e) => {
            tracing::warn!("Could not read sheet, dry run starts empty: {:#}", e);
            MemoryStore::default()
        }
    }
}

/// Describes the writes a dry run made against its in-memory copy.
fn dry_run_changes(before: &[StoredRecord], after: &[StoredRecord]) -> Vec<String> {
    after
        .iter()
        .filter_map(|stored| {
            let r = &stored.record;
            match before.iter().find(|b| b.row == stored.row) {
                None => Some(format!(
                    "[DRY RUN] Would add: {} at {} ({})",
                    r.job_title, r.company, r.status
                )),
                Some(old) if old.record.status != r.status => Some(format!(
                    "[DRY RUN] Would update row {} to {} ({} at {}, was {})",
                    stored.row, r.status, r.job_title, r.company, old.record.status
                )),
                Some(_) => None,
            }
        })
        .collect()
}

fn print_stats(stats: &RunStats) {
    println!("\nResults:");
    println!("  Emails found:  {}", stats.emails_found);
    println!("  Not job mail:  {}", stats.ignored);
    println!("  Rows added:    {}", stats.inserted);
    println!("  Rows updated:  {}", stats.updated);
    println!("  Unchanged:     {}", stats.unchanged);
    if stats.skipped > 0 {
        println!("  Skipped:       {}", stats.skipped);
    }
    if stats.errors > 0 {
        println!("  Errors:        {}", stats.errors);
    }
}

fn list(config: &Config, status: Option<&str>, company: Option<&str>) -> Result<()> {
    let status = status.map(ApplicationStatus::parse_lenient);
    let company = company.map(str::to_lowercase);

    let mut store = SheetStore::open(&config.sheets)?;
    let rows: Vec<_> = store
        .list_all()?
        .into_iter()
        .filter(|r| status.is_none_or(|s| r.record.status == s))
        .filter(|r| {
            company
                .as_deref()
                .is_none_or(|c| r.record.company.to_lowercase().contains(c))
        })
        .collect();

    if rows.is_empty() {
        println!("No applications found.");
        return Ok(());
    }

    println!(
        "{:<5} {:<10} {:<11} {:<24} {:<28} {:<24}",
        "ROW", "STATUS", "DATE", "COMPANY", "TITLE", "SENDER"
    );
    println!("{}", "-".repeat(107));
    for stored in rows {
        let r = &stored.record;
        println!(
            "{:<5} {:<10} {:<11} {:<24} {:<28} {:<24}",
            stored.row,
            r.status,
            r.date.format("%Y-%m-%d"),
            truncate(&r.company, 22),
            truncate(&r.job_title, 26),
            truncate(&r.sender_email, 22)
        );
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Acme", 10), "Acme");
        assert_eq!(truncate("Very Long Company Name", 10), "Very Lo...");
        assert_eq!(truncate("Société Générale", 8), "Socié...");
    }

    fn stored(row: u32, company: &str, status: ApplicationStatus) -> StoredRecord {
        StoredRecord {
            row: models::RowId(row),
            record: models::JobApplicationRecord {
                company: company.to_string(),
                job_title: "Intern".to_string(),
                date: chrono::NaiveDate::from_ymd_opt(2024, 5, 14).unwrap(),
                sender_email: "a@x.com".to_string(),
                status,
            },
        }
    }

    #[test]
    fn test_dry_run_changes_reports_adds_and_updates() {
        let before = vec![
            stored(2, "Acme", ApplicationStatus::Submitted),
            stored(3, "Globex", ApplicationStatus::Interview),
        ];
        let after = vec![
            stored(2, "Acme", ApplicationStatus::Rejected),
            stored(3, "Globex", ApplicationStatus::Interview),
            stored(4, "Initech", ApplicationStatus::Submitted),
        ];

        let lines = dry_run_changes(&before, &after);
        assert_eq!(
            lines,
            vec![
                "[DRY RUN] Would update row 2 to Rejected (Intern at Acme, was Submitted)".to_string(),
                "[DRY RUN] Would add: Intern at Initech (Submitted)".to_string(),
            ]
        );
    }

    #[test]
    fn test_dry_run_changes_empty_when_nothing_written() {
        let rows = vec![stored(2, "Acme", ApplicationStatus::Offer)];
        assert!(dry_run_changes(&rows, &rows).is_empty());
    }

    #[test]
    fn test_cli_parses_scan_flags() {
        let cli = Cli::try_parse_from(["jobtrack", "scan", "--days", "7", "--dry-run", "-m", "haiku"]).unwrap();
        match cli.command {
            Commands::Scan { days, dry_run, model } => {
                assert_eq!(days, Some(7));
                assert!(dry_run);
                assert_eq!(model.as_deref(), Some("haiku"));
            }
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn test_cli_global_config_flag() {
        let cli = Cli::try_parse_from(["jobtrack", "list", "--config", "/tmp/x.toml", "-s", "offer"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/x.toml")));
        assert!(matches!(cli.command, Commands::List { status: Some(_), company: None }));
    }
}
