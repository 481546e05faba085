use axum::{response::Html, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::broadcast::Broadcaster;
use super::handlers::{active_alerts, alerts, health_check, history, metrics, websocket, AppState};
use crate::alerts::{AlertEngine, Notifier, NotifyTarget};
use crate::config::Config;
use crate::metrics::MetricsStore;
use crate::monitor::{MonitorSink, MonitoringEngine};

// Embed UI files at compile time
const INDEX_HTML: &str = include_str!("../ui/index.html");

/// Pending notifications get this long to drain on shutdown
const NOTIFIER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

async fn serve_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // UI routes
        .route("/", get(serve_index))
        .route("/ws", get(websocket))
        // Read-only API
        .route("/api/health", get(health_check))
        .route("/api/metrics", get(metrics))
        .route("/api/history", get(history))
        .route("/api/alerts", get(alerts))
        .route("/api/alerts/active", get(active_alerts))
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

/// Start monitoring and serve the dashboard until a shutdown signal arrives
pub async fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MetricsStore::new(
        config.history_retention,
        config.history_max_entries,
    ));
    let alerts = Arc::new(AlertEngine::new(
        config.replica_lag_threshold,
        config.alert_history_limit,
    ));

    // Alert transitions are delivered off the probe path
    let targets = if config.notifications.is_empty() {
        vec![NotifyTarget::Log]
    } else {
        config.notifications.clone()
    };
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let notifier_handle = Notifier::new(targets).spawn(events_rx);

    let sink = MonitorSink::new(Arc::clone(&store), Arc::clone(&alerts)).with_events(events_tx);
    let engine = Arc::new(MonitoringEngine::from_config(&config, Arc::new(sink)));
    let broadcaster = Arc::new(Broadcaster::new(
        Arc::clone(&store),
        Arc::clone(&alerts),
        config.broadcast_interval,
    ));

    let state = Arc::new(AppState {
        store,
        alerts,
        engine: Arc::clone(&engine),
        broadcaster: Arc::clone(&broadcaster),
        alert_history_limit: config.alert_history_limit,
    });

    let addr: SocketAddr =
        format!("{}:{}", config.web_server_host, config.web_server_port).parse()?;
    let listener = TcpListener::bind(addr).await?;

    engine.start().await?;
    let broadcast_handle = Arc::clone(&broadcaster).start();

    tracing::info!("Starting replication monitor on {}", addr);
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.stop().await;
    broadcaster.stop();
    broadcast_handle.abort();

    // Dropping the engine drops the last event sender and lets the notifier finish
    drop(engine);
    if tokio::time::timeout(NOTIFIER_DRAIN_TIMEOUT, notifier_handle)
        .await
        .is_err()
    {
        tracing::warn!("Notifier did not drain in time");
    }

    tracing::info!("Replication monitor stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received, stopping monitor...");
}
