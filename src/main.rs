//! CLI entry point for the live transit map backend.
//!
//! `serve` loads a static GTFS network, polls a GTFS-RT vehicle feed and
//! pushes both to map clients over WebSockets. `check-feed` fetches a vehicle
//! feed once and summarizes it.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use trimetric_live::config::{DEFAULT_CHUNK_SIZE, LiveConfig};
use trimetric_live::dataset::{Datasets, RealtimeVehicles, StaticNetwork};
use trimetric_live::fetch::auth::{ApiKey, UrlParam};
use trimetric_live::fetch::{BasicClient, HttpClient, load_source};
use trimetric_live::model::high_water_mark;
use trimetric_live::parser::{parse_feed, vehicle_positions};
use trimetric_live::server::{AppState, cancel_on_signal, serve};

#[derive(Parser)]
#[command(name = "trimetric_live")]
#[command(about = "Live transit map backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve static network data and live vehicle positions
    Serve(ServeArgs),
    /// Fetch a GTFS-RT vehicle positions feed once and summarize it
    CheckFeed {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        #[command(flatten)]
        key: FeedKeyArgs,
    },
}

#[derive(Args)]
struct FeedKeyArgs {
    /// Query parameter carrying FEED_API_KEY
    #[arg(long, default_value = "appID")]
    feed_key_param: String,

    /// Send FEED_API_KEY in this header instead of the query string
    #[arg(long)]
    feed_key_header: Option<String>,
}

#[derive(Args)]
struct ServeArgs {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Directory holding an unpacked static GTFS feed
    #[arg(short, long, default_value = "gtfs")]
    gtfs_dir: PathBuf,

    /// GTFS-RT vehicle positions feed (file or URL)
    #[arg(short, long, default_value = "https://developer.trimet.org/ws/gtfs/VehiclePositions")]
    vehicle_feed: String,

    #[command(flatten)]
    key: FeedKeyArgs,

    /// How long a fetched vehicle feed is reused across sessions
    #[arg(long, default_value_t = 2000)]
    feed_cache_ms: u64,

    /// Delay before a new client receives its first snapshot
    #[arg(long, default_value_t = 1250)]
    initial_delay_ms: u64,

    /// Interval between vehicle refreshes
    #[arg(long, default_value_t = 5000)]
    refresh_interval_ms: u64,

    /// Pause between consecutive messages of a burst
    #[arg(long, default_value_t = 25)]
    pacing_ms: u64,

    /// Maximum stops per chunked message
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: NonZeroUsize,

    /// Give up on a dataset fetch after this long (no limit by default)
    #[arg(long)]
    fetch_timeout_ms: Option<u64>,

    /// Periodically log the number of open live connections
    #[arg(long, default_value_t = false)]
    track_connections: bool,
}

impl ServeArgs {
    fn live_config(&self) -> LiveConfig {
        LiveConfig {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            refresh_interval: Duration::from_millis(self.refresh_interval_ms),
            pacing: Duration::from_millis(self.pacing_ms),
            chunk_size: self.chunk_size,
            fetch_timeout: self.fetch_timeout_ms.map(Duration::from_millis),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/trimetric_live.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("trimetric_live.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => run_server(args).await?,
        Commands::CheckFeed { source, key } => check_feed(&source, &key).await?,
    }

    Ok(())
}

/// Builds the feed HTTP client, attaching `FEED_API_KEY` when it is set.
fn feed_client(key: &FeedKeyArgs) -> Result<Box<dyn HttpClient>> {
    let basic = BasicClient::new()?;
    let Some(api_key) = std::env::var("FEED_API_KEY").ok().filter(|k| !k.is_empty()) else {
        return Ok(Box::new(basic));
    };

    Ok(match &key.feed_key_header {
        Some(header) if header.eq_ignore_ascii_case("authorization") => {
            Box::new(ApiKey::bearer(basic, &api_key)?)
        }
        Some(header) => Box::new(ApiKey::new(basic, header, &api_key)?),
        None => Box::new(UrlParam {
            inner: basic,
            param_name: key.feed_key_param.clone(),
            key: api_key,
        }),
    })
}

#[tracing::instrument(skip_all, fields(bind = %args.bind, gtfs_dir = %args.gtfs_dir.display()))]
async fn run_server(args: ServeArgs) -> Result<()> {
    let gtfs_dir = args.gtfs_dir.clone();
    let network = Arc::new(tokio::task::spawn_blocking(move || StaticNetwork::load(&gtfs_dir)).await??);

    let vehicles = RealtimeVehicles::new(
        feed_client(&args.key)?,
        args.vehicle_feed.clone(),
        network.route_types(),
        Duration::from_millis(args.feed_cache_ms),
    );
    let state = AppState::new(
        Datasets::new(network, Arc::new(vehicles)),
        args.live_config(),
    );

    if args.track_connections {
        state.tracker().spawn_observer(Duration::from_secs(2));
    }

    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), state.shutdown_token()));

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    serve(listener, state).await
}

#[tracing::instrument(skip(key))]
async fn check_feed(source: &str, key: &FeedKeyArgs) -> Result<()> {
    let client = feed_client(key)?;
    let bytes = load_source(client.as_ref(), source).await?;
    let feed = parse_feed(&bytes)?;
    let vehicles = vehicle_positions(&feed, &HashMap::new());

    let age_secs = feed
        .header
        .timestamp
        .map(|ts| Utc::now().timestamp() - ts as i64);
    if vehicles.is_empty() {
        warn!("Feed has no vehicle positions");
    }

    info!(
        entities = feed.entity.len(),
        vehicles = vehicles.len(),
        since = high_water_mark(0, &vehicles),
        age_secs,
        "Feed summary"
    );
    Ok(())
}
