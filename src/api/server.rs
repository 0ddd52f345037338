use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    alert_stats, clear_alerts, health_check, list_alerts, list_queries, reconnect_source, run_now,
    set_query_enabled, start_monitoring, stats, stop_monitoring, AppState,
};
use crate::alerts::retention::DEFAULT_RETENTION_INTERVAL;
use crate::alerts::{AlertTarget, Notifier, RetentionWorker};
use crate::config::MonitorConfig;
use crate::engine::Scheduler;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub retention_interval: Duration,
    pub alert_max_age: Duration,
    pub webhook_url: Option<String>,
}

impl From<&MonitorConfig> for ServerConfig {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            retention_interval: DEFAULT_RETENTION_INTERVAL,
            alert_max_age: config.alert_max_age,
            webhook_url: config.webhook_url.clone(),
        }
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Alerts
        .route("/alerts", get(list_alerts).delete(clear_alerts))
        .route("/alerts/stats", get(alert_stats))
        // Query definitions
        .route("/queries", get(list_queries))
        .route("/queries/:id/enabled", put(set_query_enabled))
        // Monitoring control
        .route("/stats", get(stats))
        .route("/monitoring/start", post(start_monitoring))
        .route("/monitoring/stop", post(stop_monitoring))
        .route("/monitoring/run", post(run_now))
        .route("/source/reconnect", post(reconnect_source))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server plus the retention worker and notifier until Ctrl+C
pub async fn run_server(
    config: ServerConfig,
    scheduler: Arc<Scheduler>,
) -> Result<(), Box<dyn std::error::Error>> {
    let retention = Arc::new(RetentionWorker::new(
        Arc::clone(scheduler.store()),
        config.retention_interval,
        config.alert_max_age,
    ));
    let retention_handle = Arc::clone(&retention).start();

    let mut targets = vec![AlertTarget::Log];
    if let Some(url) = &config.webhook_url {
        targets.push(AlertTarget::Webhook {
            url: url.clone(),
            headers: Default::default(),
        });
    }
    let notifier_handle = Notifier::new(targets).spawn(scheduler.subscribe());

    let state = Arc::new(AppState {
        scheduler: Arc::clone(&scheduler),
    });
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting querywatch server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&scheduler), retention))
        .await?;

    retention_handle.abort();
    notifier_handle.abort();

    tracing::info!("querywatch server stopped");
    Ok(())
}

async fn shutdown_signal(scheduler: Arc<Scheduler>, retention: Arc<RetentionWorker>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        return;
    }

    tracing::info!("Shutdown signal received, stopping monitoring...");
    scheduler.stop();
    retention.stop();
}
