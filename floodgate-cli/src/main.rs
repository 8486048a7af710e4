//! Floodgate Migration CLI
//!
//! Command-line front end for the Floodgate migration engine. Supports
//! interactive use and CI/CD pipelines; result codes distinguish
//! validation failures, partial failures, and lock timeouts so callers
//! can react without parsing output.

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use floodgate::migration::{ExecutionReport, MigrationError, Migrator, RunOutcome};
use floodgate::{connect, MayPostgresExecutor, MigrationConfig, SqlExecutor};
use std::path::PathBuf;
use std::process;

/// Result codes for the invoking collaborator
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_VALIDATION_FAILURE: i32 = 2;
const EXIT_PARTIAL_FAILURE: i32 = 3;
const EXIT_LOCK_FAILURE: i32 = 4;

#[derive(Parser)]
#[command(name = "floodgate")]
#[command(about = "Schema migration tool for PostgreSQL")]
#[command(version)]
struct Cli {
    /// Database connection URL
    #[arg(long)]
    database_url: Option<String>,

    /// Migration source directories (repeatable, ordered)
    #[arg(long = "location")]
    locations: Vec<PathBuf>,

    /// History table name
    #[arg(long)]
    history_table: Option<String>,

    /// Maximum seconds to wait for the migration lock
    #[arg(long)]
    lock_timeout: Option<u64>,

    /// Accept migrations below the highest applied version
    #[arg(long)]
    out_of_order: bool,

    /// Keep applying later migrations after one fails
    #[arg(long)]
    continue_on_error: bool,

    /// Use a session advisory lock instead of the history-table lock
    #[arg(long)]
    advisory_lock: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations
    Migrate {
        /// Show what would be applied without running anything
        #[arg(long)]
        dry_run: bool,

        /// Output format for the execution report
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Show migration status (applied vs pending)
    Status {
        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Validate recorded history against the sources on disk
    Validate,

    /// Create a new migration file in the first configured location
    New {
        /// Migration description (e.g. "add_accounts_table")
        description: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            exit_code_for(&err)
        }
    };
    process::exit(code);
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = build_config(&cli);
    log::debug!(
        "history table {}, locations {:?}",
        config.history_table,
        config.locations
    );

    if let Commands::New { description } = &cli.command {
        return handle_new(&config, description);
    }

    let client = connect(&config.url)?;
    let executor = MayPostgresExecutor::new(client);
    let migrator = Migrator::new(config);

    match cli.command {
        Commands::Migrate { dry_run, format } => {
            if dry_run {
                handle_dry_run(&migrator, &executor)
            } else {
                handle_migrate(&migrator, &executor, format)
            }
        }
        Commands::Status { format } => handle_status(&migrator, &executor, format),
        Commands::Validate => handle_validate(&migrator, &executor),
        Commands::New { .. } => unreachable!("handled above"),
    }
}

fn build_config(cli: &Cli) -> MigrationConfig {
    // Config file and environment first, flags override
    let mut config = MigrationConfig::load().unwrap_or_default();

    if let Some(url) = cli
        .database_url
        .clone()
        .or_else(|| std::env::var("FLOODGATE_DATABASE_URL").ok())
        .or_else(|| std::env::var("DATABASE_URL").ok())
    {
        config.url = url;
    }
    if !cli.locations.is_empty() {
        config.locations = cli.locations.clone();
    }
    if let Some(table) = &cli.history_table {
        config.history_table = table.clone();
    }
    if let Some(timeout) = cli.lock_timeout {
        config.lock_timeout_seconds = timeout;
    }
    if cli.out_of_order {
        config.out_of_order = true;
    }
    if cli.continue_on_error {
        config.continue_on_error = true;
    }
    if cli.advisory_lock {
        config.lock_strategy = floodgate::LockStrategyKind::Advisory;
    }

    config
}

fn handle_migrate(
    migrator: &Migrator,
    executor: &dyn SqlExecutor,
    format: Format,
) -> anyhow::Result<i32> {
    let report = migrator.migrate(executor)?;

    match format {
        Format::Json => println!("{}", report.to_json()?),
        Format::Text => print_report(&report),
    }

    Ok(match report.outcome {
        RunOutcome::Success => EXIT_SUCCESS,
        RunOutcome::ValidationFailure => EXIT_VALIDATION_FAILURE,
        RunOutcome::PartialFailure => EXIT_PARTIAL_FAILURE,
    })
}

fn print_report(report: &ExecutionReport) {
    for warning in &report.warnings {
        println!("{} {}", "warning:".yellow().bold(), warning);
    }

    for anomaly in &report.anomalies {
        println!("{} {}", "anomaly:".red().bold(), anomaly);
    }

    match report.outcome {
        RunOutcome::Success if report.applied_versions.is_empty() => {
            println!("{} schema is up to date", "✓".green());
        }
        RunOutcome::Success => {
            for version in &report.applied_versions {
                println!("  {} V{}", "✓".green(), version);
            }
            println!(
                "{} applied {} migration(s) in {}ms",
                "✓".green(),
                report.applied_versions.len(),
                report.total_execution_time_ms
            );
        }
        RunOutcome::ValidationFailure => {
            println!(
                "{} validation failed, nothing applied",
                "✗".red()
            );
        }
        RunOutcome::PartialFailure => {
            for version in &report.applied_versions {
                println!("  {} V{}", "✓".green(), version);
            }
            if let Some(version) = &report.failed_version {
                println!("  {} V{}", "✗".red(), version);
            }
            if let Some(cause) = &report.failure_cause {
                println!("{} {}", "✗".red(), cause);
            }
        }
    }
}

fn handle_dry_run(migrator: &Migrator, executor: &dyn SqlExecutor) -> anyhow::Result<i32> {
    let status = migrator.status(executor)?;

    if !status.anomalies.is_empty() {
        for anomaly in &status.anomalies {
            println!("{} {}", "anomaly:".red().bold(), anomaly);
        }
        return Ok(EXIT_VALIDATION_FAILURE);
    }

    if status.pending.is_empty() {
        println!("No pending migrations to apply");
        return Ok(EXIT_SUCCESS);
    }

    println!("Would apply {} migration(s):", status.pending.len());
    for (i, pending) in status.pending.iter().enumerate() {
        println!("  {}. V{}__{}", i + 1, pending.version, pending.description);
    }
    Ok(EXIT_SUCCESS)
}

fn handle_status(
    migrator: &Migrator,
    executor: &dyn SqlExecutor,
    format: Format,
) -> anyhow::Result<i32> {
    let status = migrator.status(executor)?;

    if format == Format::Json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("\nMigration status\n");

    if status.applied.is_empty() {
        println!("{}", "Applied: none".dimmed());
    } else {
        println!("Applied ({}):", status.applied_count);
        for record in &status.applied {
            let time = record
                .execution_time_ms
                .map_or("N/A".to_string(), |ms| format!("{ms}ms"));
            println!(
                "  {} V{} {} ({}, {})",
                "✓".green(),
                record.version,
                record.description,
                record.applied_at.format("%Y-%m-%d %H:%M:%S"),
                time
            );
        }
    }

    println!();

    if status.pending.is_empty() {
        println!("{}", "Pending: none".dimmed());
    } else {
        println!("Pending ({}):", status.pending_count);
        for pending in &status.pending {
            println!(
                "  {} V{} {}",
                "…".yellow(),
                pending.version,
                pending.description
            );
        }
    }

    for anomaly in &status.anomalies {
        println!("\n{} {}", "anomaly:".red().bold(), anomaly);
    }

    println!(
        "\nSummary: {} applied, {} pending",
        status.applied_count, status.pending_count
    );

    Ok(if status.anomalies.is_empty() {
        EXIT_SUCCESS
    } else {
        EXIT_VALIDATION_FAILURE
    })
}

fn handle_validate(migrator: &Migrator, executor: &dyn SqlExecutor) -> anyhow::Result<i32> {
    println!("Validating recorded history against sources...");
    migrator.validate(executor)?;
    println!("{} history matches the sources on disk", "✓".green());
    Ok(EXIT_SUCCESS)
}

fn handle_new(config: &MigrationConfig, description: &str) -> anyhow::Result<i32> {
    use std::fs;

    let location = config
        .locations
        .first()
        .ok_or_else(|| anyhow::anyhow!("no migration location configured"))?;
    fs::create_dir_all(location)?;

    // Next whole version above everything currently discovered
    let migrator = Migrator::new(config.clone());
    let next = migrator
        .discover()?
        .iter()
        .map(|s| s.version.to_string())
        .filter_map(|v| {
            v.split('.')
                .next()
                .and_then(|major| major.parse::<u64>().ok())
        })
        .max()
        .unwrap_or(0)
        + 1;

    let filename = format!("V{next}__{description}.sql");
    let path = location.join(&filename);
    fs::write(&path, "-- Write your migration here\n")?;

    println!("{} created {}", "✓".green(), path.display());
    Ok(EXIT_SUCCESS)
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<MigrationError>() {
        Some(MigrationError::LockTimeout(_)) => EXIT_LOCK_FAILURE,
        Some(
            MigrationError::ChecksumMismatch { .. }
            | MigrationError::OutOfOrder { .. }
            | MigrationError::MissingFile { .. }
            | MigrationError::FailedAttempt { .. }
            | MigrationError::DuplicateVersion { .. }
            | MigrationError::InvalidDescriptor(_)
            | MigrationError::InvalidVersion(_),
        ) => EXIT_VALIDATION_FAILURE,
        _ => EXIT_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_mapping() {
        let lock: anyhow::Error =
            MigrationError::LockTimeout("held elsewhere".to_string()).into();
        assert_eq!(exit_code_for(&lock), EXIT_LOCK_FAILURE);

        let drift: anyhow::Error = MigrationError::ChecksumMismatch {
            version: "1".to_string(),
            description: "init".to_string(),
            stored: "a".to_string(),
            current: "b".to_string(),
        }
        .into();
        assert_eq!(exit_code_for(&drift), EXIT_VALIDATION_FAILURE);

        let other: anyhow::Error =
            MigrationError::MetadataUnavailable("connection reset".to_string()).into();
        assert_eq!(exit_code_for(&other), EXIT_ERROR);
    }
}
