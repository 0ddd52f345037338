//! Delivery of accepted alerts to external targets

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::model::Alert;
use crate::engine::MonitorEvent;

/// Where an alert is delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertTarget {
    /// Structured log line at a level matching the severity
    Log,
    /// JSON POST
    Webhook {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

/// Sends alerts to a fixed set of targets
pub struct Notifier {
    client: reqwest::Client,
    targets: Vec<AlertTarget>,
}

impl Notifier {
    pub fn new(targets: Vec<AlertTarget>) -> Self {
        Self {
            client: reqwest::Client::new(),
            targets,
        }
    }

    /// Send to every target, collecting failures
    pub async fn notify(&self, alert: &Alert) -> Result<(), NotifierError> {
        let mut errors = Vec::new();

        for target in &self.targets {
            if let Err(e) = self.notify_target(alert, target).await {
                errors.push(e);
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(NotifierError::Multiple(errors)),
        }
    }

    async fn notify_target(&self, alert: &Alert, target: &AlertTarget) -> Result<(), NotifierError> {
        match target {
            AlertTarget::Log => {
                log_alert(alert);
                Ok(())
            }
            AlertTarget::Webhook { url, headers } => self.send_webhook(alert, url, headers).await,
        }
    }

    async fn send_webhook(
        &self,
        alert: &Alert,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<(), NotifierError> {
        let mut request = self.client.post(url).json(&webhook_payload(alert));

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

        tracing::debug!(alert_id = alert.id, url = %url, "Webhook notification sent");
        Ok(())
    }

    /// Forward every `AlertGenerated` event until the bus closes
    pub fn spawn(self, mut events: broadcast::Receiver<MonitorEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(MonitorEvent::AlertGenerated(alert)) => {
                        if let Err(e) = self.notify(&alert).await {
                            tracing::error!(alert_id = alert.id, error = %e, "Alert notification failed");
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Notifier lagged behind, alerts dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!("Notifier stopped");
        })
    }
}

fn log_alert(alert: &Alert) {
    match alert.severity {
        super::Severity::Critical => tracing::error!(
            alert_id = alert.id,
            source = %alert.source,
            title = %alert.title,
            "[{}] {}",
            alert.severity.label(),
            alert.message
        ),
        super::Severity::Warning => tracing::warn!(
            alert_id = alert.id,
            source = %alert.source,
            title = %alert.title,
            "[{}] {}",
            alert.severity.label(),
            alert.message
        ),
        super::Severity::Info => tracing::info!(
            alert_id = alert.id,
            source = %alert.source,
            title = %alert.title,
            "[{}] {}",
            alert.severity.label(),
            alert.message
        ),
    }
}

fn webhook_payload(alert: &Alert) -> serde_json::Value {
    serde_json::json!({
        "alert_id": alert.id,
        "severity": alert.severity,
        "title": alert.title,
        "message": alert.message,
        "source": alert.source,
        "raw_result": alert.raw_result,
        "timestamp": alert.created_at.to_rfc3339(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Multiple notification failures: {0:?}")]
    Multiple(Vec<NotifierError>),
}
