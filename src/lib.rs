pub mod config;
pub mod logs;
pub mod remote;

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::FetchConfig;
use logs::FetchError;

/// Exit code for a batch rejected by the skew gate.
pub const EXIT_POLICY_REJECTED: u8 = 2;

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "logfetch",
    version,
    about = "Fetch a consistent set of categorized logs from a remote machine"
)]
pub struct Cli {
    /// Path to a TOML config file (defaults to the platform config dir)
    #[arg(long, global = true, env = "LOGFETCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover, validate and download the logs for a lookup key
    Fetch {
        /// Identifier searched for in the content-matched logs (e.g. an SRN)
        lookup_key: String,

        /// Local directory receiving the logs (created if missing)
        dest: PathBuf,

        /// Print the fetch report as JSON instead of one name per line
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the resolved configuration (password redacted)
    Config,
    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        target = option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown"),
        built = option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown"),
        "logfetch starting"
    );

    match cli.command {
        Commands::Fetch {
            lookup_key,
            dest,
            json,
        } => run_fetch(cli.config, &lookup_key, dest, json),
        Commands::Config => run_show_config(cli.config),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "logfetch", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn run_fetch(
    config_path: Option<PathBuf>,
    lookup_key: &str,
    dest: PathBuf,
    json: bool,
) -> Result<()> {
    let config = FetchConfig::load(config_path.as_deref()).context("loading configuration")?;
    let report = logs::fetch(&config, lookup_key, &dest)?;

    let mut out = std::io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &report)?;
        writeln!(out)?;
    } else {
        for name in report.file_names() {
            writeln!(out, "{name}")?;
        }
    }
    Ok(())
}

fn run_show_config(config_path: Option<PathBuf>) -> Result<()> {
    let mut config = match config_path.as_deref() {
        Some(path) => FetchConfig::from_file(path)?,
        None => match config::default_config_path() {
            Some(path) if path.exists() => FetchConfig::from_file(&path)?,
            _ => FetchConfig::default(),
        },
    };
    config.apply_env()?;

    let rendered = toml::to_string_pretty(&config.redacted()).context("rendering configuration")?;
    print!("{rendered}");
    if let Err(e) = config.validate() {
        eprintln!("warning: {e}");
    }
    Ok(())
}

/// Install the stderr fmt subscriber.
///
/// `RUST_LOG` wins over `-v` when set.
pub fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "logfetch=info,warn",
        _ => "logfetch=debug,info",
    }
}

/// Process exit code for a failed run.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<FetchError>() {
        Some(e) if e.is_policy_rejection() => EXIT_POLICY_REJECTED,
        _ => 1,
    }
}
