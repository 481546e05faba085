//! Notification delivery for alert transitions

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::types::{AlertEvent, NotifyTarget, Severity};

/// Delivers alert events to the configured targets
pub struct Notifier {
    client: reqwest::Client,
    targets: Vec<NotifyTarget>,
}

impl Notifier {
    /// Notifier delivering to every target in order
    pub fn new(targets: Vec<NotifyTarget>) -> Self {
        Self {
            client: reqwest::Client::new(),
            targets,
        }
    }

    /// Consume events until every sender is dropped
    pub fn spawn(self, mut events: mpsc::UnboundedReceiver<AlertEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let Err(e) = self.notify(&event).await {
                    tracing::error!(
                        alert_id = %event.alert().id,
                        error = %e,
                        "Failed to send notification"
                    );
                }
            }
            tracing::debug!("Notifier shutting down");
        })
    }

    /// Send an event to all targets
    pub async fn notify(&self, event: &AlertEvent) -> Result<(), NotifierError> {
        let mut errors = Vec::new();

        for target in &self.targets {
            if let Err(e) = self.notify_target(event, target).await {
                errors.push(e);
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(NotifierError::Multiple(errors)),
        }
    }

    async fn notify_target(
        &self,
        event: &AlertEvent,
        target: &NotifyTarget,
    ) -> Result<(), NotifierError> {
        match target {
            NotifyTarget::Log => {
                log_event(event);
                Ok(())
            }
            NotifyTarget::Webhook { url, headers } => self.send_webhook(event, url, headers).await,
        }
    }

    async fn send_webhook(
        &self,
        event: &AlertEvent,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<(), NotifierError> {
        let alert = event.alert();
        let payload = serde_json::json!({
            "event": event.name(),
            "alert_id": alert.id,
            "severity": alert.severity,
            "kind": alert.kind,
            "pair": alert.condition.pair,
            "table": alert.condition.table,
            "message": alert.message,
            "resolved": alert.resolved,
            "timestamp": alert.timestamp.to_rfc3339(),
        });

        let mut request = self.client.post(url).json(&payload);
        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifierError::Webhook(format!("Failed to send webhook: {}", e)))?;

        if !response.status().is_success() {
            return Err(NotifierError::Webhook(format!(
                "Webhook returned status {}",
                response.status()
            )));
        }

        tracing::debug!(alert_id = %alert.id, url = %url, "Webhook notification sent");
        Ok(())
    }
}

fn log_event(event: &AlertEvent) {
    let alert = event.alert();
    match event {
        AlertEvent::Resolved(_) => {
            tracing::info!(alert_id = %alert.id, "Alert resolved: {}", alert.message);
        }
        AlertEvent::Opened(_) if alert.severity == Severity::Critical => {
            tracing::error!(alert_id = %alert.id, "Alert: {}", alert.message);
        }
        AlertEvent::Opened(_) => {
            tracing::warn!(alert_id = %alert.id, "Alert: {}", alert.message);
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Multiple notification failures: {0:?}")]
    Multiple(Vec<NotifierError>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::Utc;
    use parking_lot::Mutex;

    use crate::alerts::types::{Alert, AlertKind, ConditionKey};

    type Received = Arc<Mutex<Vec<(Option<String>, serde_json::Value)>>>;

    fn opened() -> AlertEvent {
        AlertEvent::Opened(Alert {
            id: "count:orders-db:users#1".into(),
            timestamp: Utc::now(),
            severity: Severity::Critical,
            kind: AlertKind::CountMismatch,
            condition: ConditionKey::count("orders-db", "users"),
            message: "[orders-db] Row count mismatch for table users (source: 100, target: 98)"
                .into(),
            resolved: false,
        })
    }

    async fn webhook_server(status: StatusCode) -> (String, Received) {
        let received: Received = Arc::default();
        let app = Router::new()
            .route(
                "/hook",
                post(
                    move |State(received): State<Received>,
                          headers: HeaderMap,
                          Json(body): Json<serde_json::Value>| async move {
                        let token = headers
                            .get("x-token")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        received.lock().push((token, body));
                        status
                    },
                ),
            )
            .with_state(Arc::clone(&received));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/hook", addr), received)
    }

    #[tokio::test]
    async fn test_log_notification() {
        let notifier = Notifier::new(vec![NotifyTarget::Log]);
        assert!(notifier.notify(&opened()).await.is_ok());
    }

    #[tokio::test]
    async fn test_webhook_receives_payload_and_headers() {
        let (url, received) = webhook_server(StatusCode::OK).await;
        let notifier = Notifier::new(vec![NotifyTarget::Webhook {
            url,
            headers: HashMap::from([("x-token".to_string(), "secret".to_string())]),
        }]);

        notifier.notify(&opened()).await.unwrap();

        let received = received.lock();
        assert_eq!(received.len(), 1);
        let (token, body) = &received[0];
        assert_eq!(token.as_deref(), Some("secret"));
        assert_eq!(body["event"], "opened");
        assert_eq!(body["severity"], "critical");
        assert_eq!(body["pair"], "orders-db");
        assert_eq!(body["table"], "users");
    }

    #[tokio::test]
    async fn test_webhook_error_status_reported() {
        let (url, _received) = webhook_server(StatusCode::INTERNAL_SERVER_ERROR).await;
        let notifier = Notifier::new(vec![NotifyTarget::Log, NotifyTarget::Webhook {
            url,
            headers: HashMap::new(),
        }]);

        let err = notifier.notify(&opened()).await.unwrap_err();
        assert!(matches!(err, NotifierError::Webhook(ref msg) if msg.contains("500")));
    }

    #[tokio::test]
    async fn test_spawned_notifier_drains_channel() {
        let (url, received) = webhook_server(StatusCode::OK).await;
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Notifier::new(vec![NotifyTarget::Webhook {
            url,
            headers: HashMap::new(),
        }])
        .spawn(rx);

        tx.send(opened()).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(received.lock().len(), 1);
    }
}
