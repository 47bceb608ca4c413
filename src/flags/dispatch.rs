use crate::errors::{Result, StorefrontError};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

/// Conversion event handed to a dispatcher by `FlagClient::track`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionEvent {
    pub event_key: String,
    pub event_id: String,
    pub user_id: String,
    pub revision: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl ConversionEvent {
    pub fn new(event_key: &str, event_id: String, user_id: &str, revision: Option<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            event_key: event_key.to_string(),
            event_id,
            user_id: user_id.to_string(),
            revision,
            timestamp,
        }
    }
}

/// Delivers analytics events. Errors are reported back to the client, which
/// only logs them.
pub trait EventDispatcher: Send + Sync {
    fn dispatch(&self, event: &ConversionEvent) -> Result<()>;
}

/// Writes every event to the log and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatcher;

impl EventDispatcher for LogDispatcher {
    fn dispatch(&self, event: &ConversionEvent) -> Result<()> {
        tracing::info!(
            event = %event.event_key,
            event_id = %event.event_id,
            user = %event.user_id,
            "conversion event"
        );
        Ok(())
    }
}

/// Keeps events in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingDispatcher {
    events: Arc<Mutex<Vec<ConversionEvent>>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ConversionEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventDispatcher for RecordingDispatcher {
    fn dispatch(&self, event: &ConversionEvent) -> Result<()> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| StorefrontError::Io(std::io::Error::other("event buffer poisoned")))?;
        events.push(event.clone());
        Ok(())
    }
}

/// POSTs events as JSON on background tasks of the current tokio runtime.
/// Clones share the pending deliveries; call [`HttpDispatcher::flush`] before
/// the runtime shuts down.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    endpoint: String,
    client: reqwest::Client,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl HttpDispatcher {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
            pending: Arc::default(),
        }
    }

    /// Wait for every delivery started so far.
    pub async fn flush(&self) {
        let handles = match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(_) => return,
        };
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(endpoint = %self.endpoint, error = %e, "event delivery task failed");
            }
        }
    }
}

impl EventDispatcher for HttpDispatcher {
    fn dispatch(&self, event: &ConversionEvent) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| StorefrontError::Io(std::io::Error::other(e.to_string())))?;
        let request = self.client.post(&self.endpoint).json(event);
        let endpoint = self.endpoint.clone();
        let key = event.event_key.clone();
        let task = handle.spawn(async move {
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!(event = %key, %endpoint, "event delivered");
                }
                Ok(resp) => {
                    tracing::warn!(event = %key, %endpoint, status = %resp.status(), "event rejected");
                }
                Err(e) => {
                    tracing::warn!(event = %key, %endpoint, error = %e, "event delivery failed");
                }
            }
        });
        self.pending
            .lock()
            .map_err(|_| StorefrontError::Io(std::io::Error::other("pending deliveries poisoned")))?
            .push(task);
        Ok(())
    }
}
