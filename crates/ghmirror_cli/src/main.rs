//! ghmirror CLI - mirror GitHub repository metadata into a local store.

mod commands;
mod config;
mod progress;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;

use crate::commands::limits::OutputFormat;
use crate::commands::sync::SyncArgs;
use crate::progress::BARS_VERBOSITY;

#[derive(Parser)]
#[command(name = "ghmirror")]
#[command(version)]
#[command(about = "Incrementally mirror GitHub repository metadata")]
#[command(
    long_about = "ghmirror downloads a repository's info, statistics, issues, issue comments, \
issue events, commits, commit comments and contributors from the GitHub API and keeps a \
local copy up to date. Repeated runs only fetch what is new, and the API rate limit is \
respected by pausing until the quota resets."
)]
#[command(after_long_help = r#"EXAMPLES
    Mirror one repository into ./data:
        $ ghmirror sync rust-lang/rust

    Mirror every repository listed in a file, with progress bars:
        $ ghmirror sync -vv repos.txt

    Mirror into SQLite, skipping issue events, and clone the source code:
        $ ghmirror sync --database-url sqlite://mirror.db?mode=rwc --no-issue-events --source-code tokio-rs/tokio

    Show the remaining API quota:
        $ ghmirror limits --output json

CONFIGURATION
    ghmirror reads configuration from:
      1. ~/.config/ghmirror/config.toml (or $XDG_CONFIG_HOME/ghmirror/config.toml)
      2. ./ghmirror.toml
      3. Environment variables (GHMIRROR_* prefix, sections separated by __)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    GHMIRROR_GITHUB__TOKEN          GitHub personal access token (required)
    GHMIRROR_GITHUB__API_URL        API root (default: https://api.github.com)
    GHMIRROR_STORAGE__BACKEND       files or database (default: files)
    GHMIRROR_STORAGE__DATA_DIR      File store root (default: data)
    GHMIRROR_STORAGE__DATABASE_URL  Database connection string (default: ~/.local/state/ghmirror/ghmirror.db)
    GHMIRROR_SYNC__VERBOSE          0 quiet, 1 phase lines, 2 progress bars (default: 1)
    RUST_LOG                        Overrides the log filter derived from verbosity
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror repositories into the configured store
    Sync(SyncArgs),
    /// Show current rate limit status
    Limits {
        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        output: OutputFormat,
    },
}

/// Log level for a verbosity level.
///
/// Progress bars replace the per-phase log lines, so they only show warnings.
fn log_level(verbose: u8, bars: bool) -> &'static str {
    match verbose {
        0 => "warn",
        _ if bars => "warn",
        1 | 2 => "info",
        _ => "debug",
    }
}

fn init_tracing(verbose: u8) {
    let bars = verbose == BARS_VERBOSITY && Term::stdout().is_term();
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let level = log_level(verbose, bars);
            EnvFilter::new(format!("ghmirror={level},ghmirror_cli={level}"))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Load configuration (config file -> env vars -> defaults)
    let mut config = config::Config::load();

    match cli.command {
        Commands::Sync(args) => {
            args.apply(&mut config);
            init_tracing(config.sync.verbose);

            let report = commands::sync::handle_sync(&args, &config).await?;
            if report.failed > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Limits { output } => {
            init_tracing(config.sync.verbose);

            let client = commands::build_client(&config).await?;
            commands::limits::handle_limits(&client, output).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
