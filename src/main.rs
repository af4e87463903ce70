//! PostgreSQL Backup/Restore Tool
//!
//! Provides CLI interface for database backup, restore and listing operations

// pgmanager/src/main.rs
mod backup;
mod config;
mod database;
mod errors;
mod list;
mod restore;
mod storage;
#[cfg(test)]
mod testing;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use config::AppConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Action {
    /// List stored backups, newest first
    List,
    /// List databases on the destination server
    #[value(name = "list_dbs")]
    ListDbs,
    /// Dump, compress and store the source database
    Backup,
    /// Restore a stored backup over the destination database
    Restore,
}

#[derive(Debug, Parser)]
#[command(name = "pgmanager", version, about = "PostgreSQL backup and restore")]
struct Cli {
    #[arg(long, value_enum)]
    action: Action,

    /// Path to the JSON configuration file
    #[arg(long)]
    configfile: PathBuf,

    /// Backup selector for restore; the newest key containing it wins
    #[arg(long)]
    date: Option<String>,

    /// Restore into this database instead of dest.db
    #[arg(long = "dest-db")]
    dest_db: Option<String>,

    #[arg(long)]
    verbose: bool,
}

/// Main entry point for the backup/restore tool
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run_app(cli).await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_app(cli: Cli) -> Result<()> {
    let app_config = AppConfig::load_from_json(&cli.configfile).context(format!(
        "Failed to load application configuration from {}",
        cli.configfile.display()
    ))?;

    match cli.action {
        Action::List => {
            let keys = list::run_list_flow(&app_config).await?;
            if keys.is_empty() {
                println!("No backups found.");
            }
            for key in keys {
                println!("{}", key);
            }
        }
        Action::ListDbs => {
            for name in list::run_list_dbs_flow(&app_config).await? {
                println!("{}", name);
            }
        }
        Action::Backup => {
            println!("🚀 Starting Backup Process...");
            let report = backup::run_backup_flow(&app_config, cli.verbose)
                .await
                .context("Backup process failed")?;
            info!("Backup stored as {}", report.remote_key);
        }
        Action::Restore => {
            println!("🔄 Starting Restore Process...");
            let selector = cli.date.as_deref().unwrap_or_default();
            let report = restore::run_restore_flow(
                &app_config,
                selector,
                cli.dest_db.as_deref(),
                cli.verbose,
            )
            .await
            .context("Restore process failed")?;
            info!(
                "Restored {} into {}",
                report.resolved_key, report.target_database
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_accepts_every_action() {
        for (flag, action) in [
            ("list", Action::List),
            ("list_dbs", Action::ListDbs),
            ("backup", Action::Backup),
            ("restore", Action::Restore),
        ] {
            let args = ["pgmanager", "--action", flag, "--configfile", "c.json"];
            let cli = Cli::try_parse_from(args).unwrap();
            assert_eq!(cli.action, action);
        }
    }

    #[test]
    fn restore_flags_are_parsed() {
        let cli = Cli::try_parse_from([
            "pgmanager",
            "--action",
            "restore",
            "--configfile",
            "c.json",
            "--date",
            "2023",
            "--dest-db",
            "app_copy",
            "--verbose",
        ])
        .unwrap();
        assert_eq!(cli.date.as_deref(), Some("2023"));
        assert_eq!(cli.dest_db.as_deref(), Some("app_copy"));
        assert!(cli.verbose);
    }

    #[test]
    fn configfile_is_required() {
        assert!(Cli::try_parse_from(["pgmanager", "--action", "list"]).is_err());
        assert!(
            Cli::try_parse_from(["pgmanager", "--action", "sync", "--configfile", "c.json"])
                .is_err()
        );
    }
}
