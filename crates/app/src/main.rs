use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use perkledger_core::LinkedAccountId;
use perkledger_match::BenefitCatalog;

#[derive(Parser)]
#[command(name = "perkledger", about = "Card benefit matching and usage ledger")]
struct Cli {
    /// Database path. Defaults to the platform data directory.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// TOML file with fallback catalog rules.
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan historical transactions and match them against card benefits.
    Scan {
        /// Owner of the accounts to scan.
        #[arg(long)]
        user: i64,
        /// Restrict the scan to these account ids (repeatable).
        #[arg(long = "account")]
        accounts: Vec<i64>,
        /// Per-run bound on the candidate set.
        #[arg(long, default_value_t = perkledger_engine::DEFAULT_SCAN_CAP)]
        cap: u32,
    },
    /// Show per-benefit usage for the period covering a date.
    Usage {
        #[arg(long)]
        account: i64,
        /// As-of date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let db_path = match cli.db {
        Some(path) => path,
        None => default_db_path()?,
    };
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let db = perkledger_storage::create_db(&db_path)
        .await
        .with_context(|| format!("opening database {}", db_path.display()))?;
    tracing::info!("database ready: {}", db_path.display());

    let catalog = match cli.catalog {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading catalog {}", path.display()))?;
            Some(BenefitCatalog::from_toml(&text).map_err(anyhow::Error::msg)?)
        }
        None => None,
    };

    match cli.command {
        Command::Scan { user, accounts, cap } => {
            let accounts: Option<Vec<LinkedAccountId>> = if accounts.is_empty() {
                None
            } else {
                Some(accounts.into_iter().map(LinkedAccountId).collect())
            };
            let summary = perkledger_engine::scan_and_match_benefits(
                &db,
                catalog.as_ref(),
                user,
                accounts.as_deref(),
                cap,
            )
            .await?;
            println!(
                "matched {} of {} scanned transactions",
                summary.matched, summary.checked
            );
        }
        Command::Usage { account, date } => {
            let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());
            let rows = perkledger_storage::usage_for_account(&db, LinkedAccountId(account), date)
                .await?;
            if rows.is_empty() {
                println!("no benefit usage recorded for account {account} as of {date}");
            } else {
                for row in rows {
                    let remaining = row
                        .remaining
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "uncapped".to_string());
                    println!(
                        "{:<32} {}  used {}  remaining {}",
                        row.benefit_name, row.period, row.used, remaining
                    );
                }
            }
        }
    }

    Ok(())
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("com", "perkledger", "Perkledger")
        .context("no home directory for the default database path")?;
    Ok(dirs.data_dir().join("perks.db"))
}
