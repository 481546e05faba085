//! Periodic push of metrics to WebSocket clients

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time;

use crate::alerts::{Alert, AlertEngine};
use crate::metrics::{MetricsSnapshot, MetricsStore};

/// Message pushed to dashboard clients
#[derive(Debug, Clone, Serialize)]
pub struct UpdateMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub timestamp: DateTime<Utc>,
    pub data: UpdatePayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdatePayload {
    pub metrics: MetricsSnapshot,
    pub active_alerts: Vec<Alert>,
}

/// Reads the store every interval and fans the result out to all sockets
pub struct Broadcaster {
    store: Arc<MetricsStore>,
    alerts: Arc<AlertEngine>,
    interval: Duration,
    tx: broadcast::Sender<Arc<str>>,
    running: Arc<AtomicBool>,
}

impl Broadcaster {
    pub fn new(store: Arc<MetricsStore>, alerts: Arc<AlertEngine>, interval: Duration) -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            store,
            alerts,
            interval,
            tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build an update from the current snapshot and open alerts
    pub fn message(&self) -> UpdateMessage {
        UpdateMessage {
            kind: "metrics_update",
            timestamp: Utc::now(),
            data: UpdatePayload {
                metrics: self.store.snapshot(),
                active_alerts: self.alerts.get_active(),
            },
        }
    }

    /// Current update, serialized once for every recipient
    pub fn render(&self) -> Result<Arc<str>, serde_json::Error> {
        serde_json::to_string(&self.message()).map(Arc::from)
    }

    /// Receiver for every future update
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.tx.subscribe()
    }

    /// Number of connected sockets
    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Push one update now; returns the number of clients it reached
    pub fn publish(&self) -> usize {
        if self.tx.receiver_count() == 0 {
            return 0;
        }
        match self.render() {
            Ok(text) => self.tx.send(text).unwrap_or(0),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize metrics update");
                0
            }
        }
    }

    /// Start the background worker
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::info!("Broadcaster started with interval {:?}", self.interval);

            let mut interval = time::interval(self.interval);
            interval.tick().await;

            while self.running.load(Ordering::SeqCst) {
                interval.tick().await;
                let reached = self.publish();
                tracing::trace!(clients = reached, "Metrics update broadcast");
            }

            tracing::info!("Broadcaster stopped");
        })
    }

    /// Stop the broadcast loop after its current tick
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Serve one WebSocket client until it disconnects.
///
/// The client gets an update immediately, then every broadcast. A client
/// that falls behind skips the updates it missed.
pub async fn serve_socket(socket: WebSocket, broadcaster: Arc<Broadcaster>) {
    let (mut sender, mut receiver) = socket.split();
    let mut updates = broadcaster.subscribe();
    tracing::info!(
        clients = broadcaster.client_count(),
        "WebSocket client connected"
    );

    match broadcaster.render() {
        Ok(text) => {
            if sender.send(Message::Text(text.to_string())).await.is_err() {
                return;
            }
        }
        Err(e) => tracing::error!(error = %e, "Failed to serialize metrics update"),
    }

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(text) => {
                    if sender.send(Message::Text(text.to_string())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "WebSocket client lagging, updates skipped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    drop(updates);
    tracing::info!(
        clients = broadcaster.client_count(),
        "WebSocket client disconnected"
    );
}
