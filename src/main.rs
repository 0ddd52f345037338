//! Querywatch Server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - QUERYWATCH_HOST: Bind address (default: 0.0.0.0)
//! - QUERYWATCH_PORT: Port number (default: 8080)
//! - QUERYWATCH_DB_PATH: SQLite database to monitor (default: monitor.db)
//! - QUERYWATCH_QUERIES_FILE: Query definitions file (default: built-in queries)
//! - QUERYWATCH_INTERVAL_MS: Tick period in milliseconds (default: 1000)
//! - QUERYWATCH_MAX_CONCURRENT: Concurrent executions (default: 5)
//! - QUERYWATCH_DUPLICATE_DETECTION: Suppress repeated alerts (default: true)
//! - QUERYWATCH_DUPLICATE_WINDOW_SECS: Suppression window (default: 30)
//! - QUERYWATCH_MAX_ALERTS: Alert store capacity (default: 1000)
//! - QUERYWATCH_ALERT_MAX_AGE_SECS: Alert retention (default: 86400)
//! - QUERYWATCH_AUTOSTART: Start monitoring on boot (default: true)
//! - QUERYWATCH_WEBHOOK_URL: POST every alert to this URL (optional)
//! - RUST_LOG: Log level (default: info)

use std::sync::Arc;

use querywatch::alerts::AlertStore;
use querywatch::api::{run_server, ServerConfig};
use querywatch::config::MonitorConfig;
use querywatch::engine::Scheduler;
use querywatch::queries::{QueryRegistry, DEFAULT_QUERIES};
use querywatch::source::{DataSource, SqliteSource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "querywatch=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MonitorConfig::from_env();

    tracing::info!("Querywatch configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!("  Database: {}", config.db_path.display());
    tracing::info!("  Interval: {} ms", config.interval.as_millis());
    tracing::info!("  Max concurrent queries: {}", config.max_concurrent_queries);
    tracing::info!(
        "  Duplicate detection: {} ({} s window)",
        config.duplicate_detection,
        config.duplicate_window.as_secs()
    );
    tracing::info!("  Max alerts: {}", config.max_alerts);
    tracing::info!("  Alert max age: {} s", config.alert_max_age.as_secs());

    // A missing database is not fatal; it can be reconnected through the API
    let sqlite = SqliteSource::new(&config.db_path);
    if let Err(e) = sqlite.reconnect() {
        tracing::warn!(error = %e, "Database not available at startup");
    }
    let source: Arc<dyn DataSource> = Arc::new(sqlite);

    let registry = Arc::new(QueryRegistry::new());
    let loaded = match &config.queries_file {
        Some(path) => {
            tracing::info!("  Queries: {}", path.display());
            registry.load_file(path)?
        }
        None => {
            tracing::info!("  Queries: built-in defaults");
            registry.load(DEFAULT_QUERIES)?
        }
    };
    tracing::info!(loaded, enabled = registry.enabled_count(), "Query definitions loaded");

    let store = Arc::new(AlertStore::with_config(config.store_config()));
    let scheduler = Arc::new(Scheduler::with_config(
        source,
        registry,
        store,
        config.scheduler_config(),
    ));

    if config.autostart {
        if let Err(e) = scheduler.start() {
            tracing::warn!(error = %e, "Monitoring not started");
        }
    }

    println!(
        r#"
                                          _       _
   __ _ _   _  ___ _ __ _   ___      ____ _| |_ ___| |__
  / _` | | | |/ _ \ '__| | | \ \ /\ / / _` | __/ __| '_ \
 | (_| | |_| |  __/ |  | |_| |\ V  V / (_| | || (__| | | |
  \__, |\__,_|\___|_|   \__, | \_/\_/ \__,_|\__\___|_| |_|
     |_|                |___/

 Scheduled SQL Monitoring
 Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );

    run_server(ServerConfig::from(&config), scheduler).await
}
