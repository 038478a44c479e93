//! Alerting
//!
//! Structured operator alerts for balance and seeding failures. Alerts
//! fan out to registered handlers: a logging handler is always present,
//! and a webhook handler fires when an endpoint is configured. Webhook
//! delivery is fire-and-forget; an alert must never stall the write
//! path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Alert severity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warn,
    Error,
    Critical,
}

/// A structured operator alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub severity: AlertSeverity,
    pub title: String,
    pub detail: String,
    pub fields: HashMap<String, String>,
}

impl Alert {
    pub fn new(
        severity: AlertSeverity,
        title: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("alert:{}", uuid::Uuid::new_v4()),
            timestamp: Utc::now(),
            severity,
            title: title.into(),
            detail: detail.into(),
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Alert delivery handler
#[async_trait]
pub trait AlertHandler: Send + Sync {
    async fn handle(&self, alert: &Alert) -> Result<(), String>;

    /// Handler name for identification
    fn name(&self) -> &str;
}

/// Logging handler (always installed)
pub struct LogAlertHandler;

#[async_trait]
impl AlertHandler for LogAlertHandler {
    async fn handle(&self, alert: &Alert) -> Result<(), String> {
        match alert.severity {
            AlertSeverity::Critical | AlertSeverity::Error => {
                error!(
                    alert_id = %alert.id,
                    severity = ?alert.severity,
                    title = %alert.title,
                    detail = %alert.detail,
                    "ALERT"
                );
            }
            AlertSeverity::Warn => {
                warn!(
                    alert_id = %alert.id,
                    title = %alert.title,
                    detail = %alert.detail,
                    "ALERT"
                );
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Webhook body: `{title, detail, severity, fields}`
#[derive(Serialize)]
struct WebhookBody<'a> {
    title: &'a str,
    detail: &'a str,
    severity: AlertSeverity,
    fields: &'a HashMap<String, String>,
}

/// Fire-and-forget webhook POST handler
pub struct WebhookAlertHandler {
    endpoint: String,
    client: reqwest::Client,
}

impl WebhookAlertHandler {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl AlertHandler for WebhookAlertHandler {
    async fn handle(&self, alert: &Alert) -> Result<(), String> {
        let body = serde_json::to_value(WebhookBody {
            title: &alert.title,
            detail: &alert.detail,
            severity: alert.severity,
            fields: &alert.fields,
        })
        .map_err(|e| e.to_string())?;

        let request = self.client.post(&self.endpoint).json(&body);
        let alert_id = alert.id.clone();
        // Delivery happens off the tick path.
        tokio::spawn(async move {
            match request.send().await {
                Ok(response) if !response.status().is_success() => {
                    warn!(
                        alert_id = %alert_id,
                        status = response.status().as_u16(),
                        "Alert webhook rejected"
                    );
                }
                Err(e) => {
                    warn!(alert_id = %alert_id, error = %e, "Alert webhook failed");
                }
                _ => {}
            }
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// How long identical alerts are suppressed.
const DEDUPE_WINDOW_SECS: i64 = 300;
/// Recent alerts retained for the admin surface.
const RECENT_CAPACITY: usize = 200;

/// Alert dispatcher
pub struct Alerter {
    handlers: Vec<Arc<dyn AlertHandler>>,
    recent: RwLock<Vec<Alert>>,
}

impl Alerter {
    /// Logging-only alerter.
    pub fn new() -> Self {
        Self {
            handlers: vec![Arc::new(LogAlertHandler)],
            recent: RwLock::new(Vec::new()),
        }
    }

    /// Alerter with an optional webhook endpoint.
    pub fn with_webhook(endpoint: Option<String>) -> Self {
        let mut alerter = Self::new();
        if let Some(endpoint) = endpoint {
            info!(endpoint = %endpoint, "Alert webhook configured");
            alerter
                .handlers
                .push(Arc::new(WebhookAlertHandler::new(endpoint)));
        }
        alerter
    }

    pub fn add_handler(&mut self, handler: Arc<dyn AlertHandler>) {
        self.handlers.push(handler);
    }

    /// Dispatch an alert to every handler. Identical alerts (same
    /// severity and title) inside the dedupe window are suppressed.
    pub async fn emit(&self, alert: Alert) {
        if self.is_duplicate(&alert).await {
            info!(title = %alert.title, "Alert deduplicated");
            return;
        }

        for handler in &self.handlers {
            if let Err(e) = handler.handle(&alert).await {
                error!(handler = handler.name(), error = %e, "Alert handler failed");
            }
        }

        let mut recent = self.recent.write().await;
        recent.push(alert);
        if recent.len() > RECENT_CAPACITY {
            let excess = recent.len() - RECENT_CAPACITY;
            recent.drain(..excess);
        }
    }

    async fn is_duplicate(&self, alert: &Alert) -> bool {
        let recent = self.recent.read().await;
        let cutoff = Utc::now() - chrono::Duration::seconds(DEDUPE_WINDOW_SECS);
        recent.iter().any(|a| {
            a.timestamp > cutoff && a.severity == alert.severity && a.title == alert.title
        })
    }

    /// Most recent alerts, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<Alert> {
        let recent = self.recent.read().await;
        recent.iter().rev().take(limit).cloned().collect()
    }
}

impl Default for Alerter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingHandler {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AlertHandler for RecordingHandler {
        async fn handle(&self, alert: &Alert) -> Result<(), String> {
            self.seen.lock().unwrap().push(alert.title.clone());
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_emit_reaches_handlers() {
        let handler = Arc::new(RecordingHandler {
            seen: Mutex::new(Vec::new()),
        });
        let mut alerter = Alerter::new();
        alerter.add_handler(handler.clone());

        alerter
            .emit(Alert::new(AlertSeverity::Critical, "Balance critical", "0.01 AR"))
            .await;

        assert_eq!(*handler.seen.lock().unwrap(), vec!["Balance critical"]);
        assert_eq!(alerter.recent(10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_identical_alert_deduplicated() {
        let handler = Arc::new(RecordingHandler {
            seen: Mutex::new(Vec::new()),
        });
        let mut alerter = Alerter::new();
        alerter.add_handler(handler.clone());

        let make = || Alert::new(AlertSeverity::Warn, "Balance low", "1.5 AR");
        alerter.emit(make()).await;
        alerter.emit(make()).await;

        assert_eq!(handler.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_different_titles_not_deduplicated() {
        let handler = Arc::new(RecordingHandler {
            seen: Mutex::new(Vec::new()),
        });
        let mut alerter = Alerter::new();
        alerter.add_handler(handler.clone());

        alerter.emit(Alert::new(AlertSeverity::Warn, "A", "")).await;
        alerter.emit(Alert::new(AlertSeverity::Warn, "B", "")).await;

        assert_eq!(handler.seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&AlertSeverity::Critical).unwrap(),
            "\"critical\""
        );
    }

    #[test]
    fn test_alert_fields() {
        let alert = Alert::new(AlertSeverity::Error, "Seeding failure", "bundle lost")
            .with_field("bundle_tx", "BTX1")
            .with_field("item_count", "3");
        assert_eq!(alert.fields.len(), 2);
        assert_eq!(alert.fields["bundle_tx"], "BTX1");
    }
}
