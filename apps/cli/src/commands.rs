//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use ranopress_acquire::{ApiClient, acquire_book};
use ranopress_epub::EpubBuilder;
use ranopress_shared::{
    AppConfig, FetchPolicy, ProgressReporter, init_config, load_config,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// RanoPress — turn a web novel into an EPUB.
#[derive(Parser)]
#[command(
    name = "ranopress",
    version,
    about = "Download a web novel and package it as a single EPUB.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Download a book and build its EPUB in one run.
    Convert {
        /// Book URL or id (e.g. https://ranobelib.me/ru/book/1234--title).
        reference: String,

        /// Output directory (defaults to the configured output dir).
        #[arg(short, long)]
        out: Option<String>,
    },

    /// Download a book into the intermediate record only.
    Fetch {
        /// Book URL or id.
        reference: String,

        /// Output directory (defaults to the configured output dir).
        #[arg(short, long)]
        out: Option<String>,
    },

    /// Build an EPUB from an existing record.
    Build {
        /// Path to a ranobe.json record.
        record: PathBuf,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "ranopress=info",
        1 => "ranopress=debug",
        _ => "ranopress=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Convert { reference, out } => cmd_convert(&reference, out.as_deref()).await,
        Command::Fetch { reference, out } => cmd_fetch(&reference, out.as_deref()).await,
        Command::Build { record } => cmd_build(&record).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

fn output_dir(config: &AppConfig, out: Option<&str>) -> PathBuf {
    PathBuf::from(out.unwrap_or(&config.defaults.output_dir))
}

async fn cmd_convert(reference: &str, out: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let output = output_dir(&config, out);

    info!(reference, output = %output.display(), "converting");

    let progress = CliProgress::new();
    let epub_path = ranopress_core::run(reference, &output, &config, &progress).await?;
    progress.finish();

    println!();
    println!("  EPUB created: {}", epub_path.display());
    println!();

    Ok(())
}

async fn cmd_fetch(reference: &str, out: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let output = output_dir(&config, out);

    info!(reference, output = %output.display(), "fetching");

    let client = ApiClient::new(&config.network)?;
    let policy = FetchPolicy::from(&config);

    let progress = CliProgress::new();
    let record_path = acquire_book(reference, &output, &client, &policy, &progress).await?;
    progress.finish();

    println!();
    println!("  Record saved: {}", record_path.display());
    println!();

    Ok(())
}

async fn cmd_build(record: &PathBuf) -> Result<()> {
    let config = load_config()?;

    info!(record = %record.display(), "building EPUB");

    let epub_path = EpubBuilder::load(record, config.defaults.image_quality)?.assemble()?;

    println!();
    println!("  EPUB created: {}", epub_path.display());
    println!();

    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Percentage bar driven by the pipeline's fraction callbacks.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{bar:40.cyan/blue} {percent:>3}% {msg}")
                .expect("valid progress template"),
        );
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn report(&self, fraction: f64, message: &str) {
        self.bar
            .set_position((fraction.clamp(0.0, 1.0) * 100.0).round() as u64);
        self.bar.set_message(message.to_string());
    }
}
