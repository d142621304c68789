//! whoami - Spotify listening-profile comparison
//!
//! Fetches the user's recently played tracks, normalizes their audio
//! features and plots them against the average of a regional playlist.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use whoami_cli::{ChartRenderer, JsonExport, ProfileBuilder, SpotifyClient, StripChart};
use whoami_common::config::{
    resolve_access_token, resolve_config_path, resolve_recent_limit, resolve_regional_playlist,
    LoggingConfig, TomlConfig, DEFAULT_API_BASE_URL,
};
use whoami_common::FeatureNormalizer;

/// Output format for the comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Terminal strip chart
    Text,
    /// JSON document for external plotting
    Json,
}

/// Command-line arguments for whoami
#[derive(Parser, Debug)]
#[command(name = "whoami")]
#[command(about = "Compare your recently played Spotify tracks against a regional average")]
#[command(version)]
struct Args {
    /// TOML config file (default: <config dir>/whoami/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Spotify access token with the user-read-recently-played scope
    #[arg(long)]
    access_token: Option<String>,

    /// Number of recently played tracks to analyze (1-50)
    #[arg(short, long)]
    limit: Option<u32>,

    /// Playlist id used as the regional baseline
    #[arg(long)]
    regional_playlist: Option<String>,

    /// Skip the regional baseline
    #[arg(long)]
    no_regional: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Strip chart lane width in columns
    #[arg(short, long, default_value_t = 50)]
    width: usize,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let (config, config_source) = TomlConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    // The log level lives in the config, so the load outcome is reported
    // only once the subscriber exists
    init_tracing(&config.logging)?;

    info!("Starting whoami v{}", env!("CARGO_PKG_VERSION"));
    config_source.log();

    let access_token =
        resolve_access_token(args.access_token.as_deref(), &config, prompt_access_token)?;
    let limit = resolve_recent_limit(args.limit, &config)?;
    let regional_playlist = if args.no_regional {
        None
    } else {
        Some(resolve_regional_playlist(
            args.regional_playlist.as_deref(),
            &config,
        ))
    };
    let feature_range = config.feature_range()?;
    let base_url = config
        .api_base_url
        .clone()
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

    info!(
        limit,
        regional = regional_playlist.as_deref().unwrap_or("none"),
        features = feature_range.len(),
        "Resolved settings"
    );

    let client = SpotifyClient::with_base_url(access_token, base_url)
        .context("Failed to create Spotify client")?;
    let builder = ProfileBuilder::new(client, FeatureNormalizer::new(feature_range));

    let comparison = builder
        .compare(limit, regional_playlist.as_deref())
        .await
        .context("Failed to build listening profile")?;

    let renderer: Box<dyn ChartRenderer> = match args.format {
        OutputFormat::Text => Box::new(StripChart::new(args.width)),
        OutputFormat::Json => Box::new(JsonExport::new(true)),
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    renderer
        .render(&comparison, &mut out)
        .context("Failed to write chart")?;
    out.flush()?;

    Ok(())
}

/// Initialize tracing: `RUST_LOG` wins, else the configured level
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&logging.level))
        .with_context(|| format!("Invalid log level '{}'", logging.level))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let initialized = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };

    initialized.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

/// Ask for the access token on the terminal
fn prompt_access_token() -> std::io::Result<String> {
    eprint!("Spotify access token: ");
    std::io::stderr().flush()?;

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line)
}
