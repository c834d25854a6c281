//! finvault CLI - set up and inspect the encrypted finance database
//!
//! Usage:
//!   finvault init      - Create (or reuse) the database and its keychain password
//!   finvault status    - Show where everything lives, without touching it
//!   finvault console   - Ad-hoc SQL prompt against the open database

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use dialoguer::Confirm;
use finvault::{
    config::default_config_path, console, Bootstrapper, Config, Credential, CredentialOrigin,
    DatabaseOutcome, KeyringStore, Secret,
};
use std::path::PathBuf;

/// Environment variable holding an operator-supplied database password.
const SECRET_ENV: &str = "FINVAULT_DB_SECRET";

/// finvault - encrypted local store for the finance app
#[derive(Parser)]
#[command(name = "finvault")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.config/finvault/finvault.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database on first run, reuse it afterwards
    Init,

    /// Show install paths, database and credential state
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive SQL prompt (exit, quit or .q to leave)
    Console,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("finvault={}", log_level).parse()?),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = Config::load_or_default(&config_path)?;

    match cli.command {
        Commands::Init => cmd_init(&config),
        Commands::Status { json } => cmd_status(&config, json),
        Commands::Console => cmd_console(&config),
    }
}

fn bootstrapper(config: &Config) -> Result<Bootstrapper> {
    let mut bootstrapper = Bootstrapper::from_config(config, Box::new(KeyringStore::new()))
        .context("Cannot prepare bootstrap")?;

    if let Some(secret) = std::env::var(SECRET_ENV).ok().filter(|s| !s.is_empty()) {
        bootstrapper = bootstrapper.with_secret(Secret::new(secret));
    }

    Ok(bootstrapper)
}

/// Tell the operator where the password lives; print it when only we have it.
fn report_credential(credential: &Credential) {
    match &credential.origin {
        CredentialOrigin::Stored => {
            println!("  {} Password loaded from keychain", "✓".green());
        }
        CredentialOrigin::Generated => {
            println!("  {} New password generated and saved to keychain", "✓".green());
        }
        CredentialOrigin::Supplied => {
            println!("  {} Password taken from {}", "✓".green(), SECRET_ENV.cyan());
        }
        CredentialOrigin::Unpersisted { reason } => {
            println!();
            println!("{}", "⚠ Keychain unavailable, password NOT saved".yellow().bold());
            println!("  Reason: {}", reason.dimmed());
            println!("  Database password:");
            println!("    {}", credential.secret.expose().yellow().bold());
            println!("  Store it somewhere safe. Without it the database cannot be opened.");
            println!("  On later runs, provide it via {}.", SECRET_ENV.cyan());
            println!();
        }
    }
}

// ============ INIT COMMAND ============

fn cmd_init(config: &Config) -> Result<()> {
    println!("{}", "🔐 finvault setup".bold().cyan());
    println!();

    let mut bootstrapper = bootstrapper(config)?;
    let boot = bootstrapper.run().context("Bootstrap failed")?;

    println!(
        "  {} App folder: {}",
        "✓".green(),
        boot.store
            .path()
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    );
    report_credential(&boot.credential);

    match boot.outcome {
        DatabaseOutcome::Created => println!(
            "  {} Database created: {}",
            "✓".green(),
            boot.store.path().display()
        ),
        DatabaseOutcome::Reused => println!(
            "  {} Existing database opened: {}",
            "✓".green(),
            boot.store.path().display()
        ),
    }

    let tables = boot.store.table_names()?;
    println!("  {} {} tables", "✓".green(), tables.len());

    bootstrapper.close(boot.store)?;
    Ok(())
}

// ============ STATUS COMMAND ============

fn cmd_status(config: &Config, json: bool) -> Result<()> {
    let status = bootstrapper(config)?.inspect();

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "📊 finvault status".bold().cyan());
    println!();
    println!("  Platform:   {}", status.platform);
    println!("  App folder: {}", status.app_folder.display());
    println!("  Database:   {}", status.db_path.display());

    if status.db_exists {
        println!(
            "  File:       {} ({} bytes)",
            "present".green(),
            status.db_size.unwrap_or(0)
        );
        if let Some(modified) = status.db_modified {
            println!(
                "  Modified:   {}",
                modified
                    .with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
            );
        }
    } else {
        println!("  File:       {}", "not created yet".yellow());
    }

    match status.credential_present {
        Some(true) => println!("  Password:   {}", "in keychain".green()),
        Some(false) => println!("  Password:   {}", "not set".yellow()),
        None => println!("  Password:   {}", "keychain unavailable".red()),
    }

    Ok(())
}

// ============ CONSOLE COMMAND ============

fn cmd_console(config: &Config) -> Result<()> {
    let mut bootstrapper = bootstrapper(config)?;
    let boot = bootstrapper.run().context("Bootstrap failed")?;
    report_credential(&boot.credential);

    println!(
        "Connected to {}. Type {} to leave.",
        boot.store.path().display().to_string().cyan(),
        console::EXIT_COMMANDS.join(", ").cyan()
    );

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let summary = match console::run_session(&boot.store, stdin.lock(), &mut stdout) {
        Ok(summary) => summary,
        Err(e) => {
            bootstrapper.close(boot.store)?;
            return Err(e);
        }
    };

    println!(
        "{} statement(s) executed, {} failed",
        summary.executed, summary.failed
    );

    if boot.store.in_transaction() {
        let commit = Confirm::new()
            .with_prompt("Commit changes?")
            .default(false)
            .interact()?;
        if commit {
            boot.store.commit()?;
            println!("{}", "✓ Changes committed".green());
        } else {
            boot.store.rollback()?;
            println!("{}", "Changes discarded".yellow());
        }
    }

    bootstrapper.close(boot.store)?;
    Ok(())
}
