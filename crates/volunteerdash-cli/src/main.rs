//! Volunteerdash - volunteer engagement analytics for Galaxy Digital.
//!
//! Pulls volunteers, hours and opportunities from the Galaxy Digital API,
//! geocodes addresses into a GeoJSON snapshot and prints engagement and
//! participation reports as JSON.

mod commands;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use volunteerdash_core::Config;

#[derive(Debug, Parser)]
#[command(name = "volunteerdash", version, about = "Volunteer engagement analytics for Galaxy Digital")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// GeoJSON snapshot to read and write
    #[arg(long, global = true, value_name = "PATH")]
    snapshot: Option<PathBuf>,

    /// Directory for cached responses, geocodes and the session
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Bypass the API response cache
    #[arg(long, global = true)]
    no_cache: bool,

    /// Fetch only a handful of volunteers
    #[arg(long, global = true)]
    test_mode: bool,

    /// Volunteers fetched in test mode
    #[arg(long, global = true, value_name = "N")]
    test_limit: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch everything from the API and write the snapshot
    Load(LoadArgs),
    /// Geocode snapshot volunteers that have no coordinates yet
    Geocode(GeocodeArgs),
    /// Print metrics for the loaded volunteers
    Report(ReportArgs),
    /// Distance from a point to every located volunteer
    Distances(DistanceArgs),
    /// Inspect or clear the API response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Save the Galaxy password in the OS keychain
    StorePassword {
        /// Account email, defaults to GALAXY_EMAIL
        #[arg(long)]
        email: Option<String>,
    },
    /// Remove the saved API session
    Logout {
        /// Account email, defaults to GALAXY_EMAIL
        #[arg(long)]
        email: Option<String>,

        /// Also remove the password from the OS keychain
        #[arg(long)]
        forget_password: bool,
    },
    /// Show or save the effective configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Clone, Args)]
struct DateArgs {
    /// First day of hours to include (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    start_date: Option<NaiveDate>,

    /// Last day of hours to include (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    end_date: Option<NaiveDate>,
}

#[derive(Debug, Args)]
struct LoadArgs {
    #[command(flatten)]
    dates: DateArgs,

    /// Geocode addresses before writing the snapshot
    #[arg(long)]
    geocode: bool,

    /// Leave ZIP-only addresses off the map
    #[arg(long)]
    exclude_zip_only: bool,
}

#[derive(Debug, Args)]
struct GeocodeArgs {
    /// Leave ZIP-only addresses off the map
    #[arg(long)]
    exclude_zip_only: bool,

    /// Concurrent geocoding requests
    #[arg(long, value_name = "N")]
    workers: Option<usize>,
}

#[derive(Debug, Args)]
struct ReportArgs {
    /// Load from the API instead of the snapshot
    #[arg(long)]
    live: bool,

    #[command(flatten)]
    dates: DateArgs,

    /// Include one row per volunteer
    #[arg(long)]
    volunteers: bool,

    /// Include one row per hour entry
    #[arg(long)]
    hours: bool,
}

#[derive(Debug, Args)]
struct DistanceArgs {
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    #[arg(long, allow_hyphen_values = true)]
    lon: f64,

    /// Only the nearest N volunteers
    #[arg(long, value_name = "N")]
    limit: Option<usize>,
}

#[derive(Debug, Subcommand)]
enum CacheAction {
    /// Entry count, size and age of the response cache
    Stats,
    /// Remove cached responses
    Clear {
        /// Only entries older than this many days
        #[arg(long, value_name = "DAYS")]
        older_than: Option<i64>,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Print settings from the config file, environment and flags
    Show,
    /// Write those settings to the config file
    Save,
}

/// Initialize the tracing subscriber for logging.
///
/// `-v` flags win over `RUST_LOG`, which wins over the `warn` default.
fn init_tracing(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .init();
    Ok(guard)
}

/// Config from file and environment, with command-line overrides on top.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load()?;
    if let Some(ref path) = cli.snapshot {
        config.snapshot_path = path.clone();
    }
    if let Some(ref dir) = cli.cache_dir {
        config.cache_dir = Some(dir.clone());
    }
    if cli.no_cache {
        config.use_cache = false;
    }
    if cli.test_mode {
        config.test_mode = true;
    }
    if let Some(limit) = cli.test_limit {
        config.test_limit = limit;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose, cli.log_file.as_deref())?;
    info!("volunteerdash starting");

    let config = load_config(&cli)?;

    match cli.command {
        Command::Load(args) => commands::load(&config, &args.dates.into(), args.geocode, args.exclude_zip_only).await,
        Command::Geocode(args) => commands::geocode(&config, args.exclude_zip_only, args.workers).await,
        Command::Report(args) => {
            let source = if args.live {
                commands::Source::Api(args.dates.into())
            } else {
                commands::Source::Snapshot
            };
            commands::report(&config, source, args.volunteers, args.hours).await
        }
        Command::Distances(args) => commands::distances(&config, args.lat, args.lon, args.limit),
        Command::Cache { action } => match action {
            CacheAction::Stats => commands::cache_stats(&config),
            CacheAction::Clear { older_than } => commands::cache_clear(&config, older_than),
        },
        Command::StorePassword { email } => commands::store_password(&config, email),
        Command::Logout { email, forget_password } => commands::logout(&config, email, forget_password),
        Command::Config { action } => match action {
            ConfigAction::Show => commands::config_show(&config),
            ConfigAction::Save => commands::config_save(&config),
        },
    }
}

impl From<DateArgs> for volunteerdash_core::DateRange {
    fn from(args: DateArgs) -> Self {
        Self::new(args.start_date, args.end_date)
    }
}
