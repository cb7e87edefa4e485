//! Ferry CLI - Command-line downloader
//!
//! Downloads files through the Ferry engine with retries, progress bars
//! and optional SHA-256 verification.

mod commands;
mod output;
mod progress;
mod settings;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Ferry - reliable downloads
#[derive(Parser)]
#[command(name = "ferry")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Settings file (JSON)
    #[arg(long, env = "FERRY_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "human")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

/// Engine options shared by the download commands
#[derive(clap::Args, Debug, Default)]
struct EngineArgs {
    /// Retries after the first failed attempt
    #[arg(short, long)]
    retries: Option<u32>,

    /// Initial delay between attempts in milliseconds (doubles each retry)
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Minimum milliseconds between progress updates
    #[arg(long)]
    progress_interval_ms: Option<u64>,

    /// Verify SHA-256 digests after download
    #[arg(long)]
    verify: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a single file
    Get {
        /// URL to download
        url: String,

        /// Output file path (defaults to the last URL segment)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Expected SHA-256 of the file; implies --verify
        #[arg(long)]
        sha256: Option<String>,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Download every request listed in a JSON file, concurrently
    Batch {
        /// JSON array of {"url", "destination", "expected_digest"?}
        file: PathBuf,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Print the SHA-256 digest of a local file
    Hash {
        path: PathBuf,
    },

    /// Show settings
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective settings
    Show,

    /// Get a single setting
    Get {
        /// Setting key, e.g. engine.retry_limit
        key: String,
    },

    /// Print where the settings file is looked up
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let (loaded, config_path) = settings::resolve(cli.config)?;

    match cli.command {
        Commands::Get {
            url,
            output,
            sha256,
            engine,
        } => commands::get(&loaded, &engine, &url, output, sha256, cli.output).await?,

        Commands::Batch { file, engine } => {
            commands::batch(&loaded, &engine, &file, cli.output).await?
        }

        Commands::Hash { path } => commands::hash(&path, cli.output).await?,

        Commands::Config { action } => {
            commands::config_action(&loaded, config_path.as_deref(), action, cli.output)?
        }

        Commands::Completions { shell } => {
            use clap::CommandFactory;
            clap_complete::generate(shell, &mut Cli::command(), "ferry", &mut std::io::stdout());
        }
    }

    Ok(())
}
