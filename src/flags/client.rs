use super::datafile::DatafileProvider;
use super::dispatch::{ConversionEvent, EventDispatcher, LogDispatcher};
use super::{FeatureDecision, FlagProvider};
use crate::errors::{Result, StorefrontError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How the datafile is downloaded.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    /// Extra attempts after the first one, for transport errors and 5xx only.
    pub retries: u32,
    /// Linear backoff step between attempts.
    pub backoff: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retries: 0,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Facade over a flag provider and an event dispatcher. Build one at startup
/// and share it (`Arc<FlagClient>`); there is no process-wide instance.
pub struct FlagClient {
    provider: Arc<dyn FlagProvider>,
    dispatcher: Arc<dyn EventDispatcher>,
}

impl fmt::Debug for FlagClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlagClient")
            .field("revision", &self.provider.revision())
            .finish_non_exhaustive()
    }
}

impl FlagClient {
    /// Download the datafile from `url` and build a client over it.
    pub async fn initialize(url: &str) -> Result<Self> {
        Self::initialize_with(url, &FetchOptions::default()).await
    }

    pub async fn initialize_with(url: &str, opts: &FetchOptions) -> Result<Self> {
        let body = fetch_datafile(url, opts).await?;
        let client = Self::from_datafile(&body)?;
        tracing::info!(%url, revision = ?client.provider.revision(), "flag client initialized");
        Ok(client)
    }

    /// Build from an already downloaded datafile.
    pub fn from_datafile(json: &str) -> Result<Self> {
        Ok(Self::with_provider(DatafileProvider::from_json(json)?))
    }

    pub fn with_provider<P: FlagProvider + 'static>(provider: P) -> Self {
        Self {
            provider: Arc::new(provider),
            dispatcher: Arc::new(LogDispatcher),
        }
    }

    /// Replace the event dispatcher (default: [`LogDispatcher`]).
    pub fn with_dispatcher<D: EventDispatcher + 'static>(mut self, dispatcher: D) -> Self {
        self.dispatcher = Arc::new(dispatcher);
        self
    }

    pub fn is_enabled(&self, feature_key: &str, user_id: &str) -> bool {
        let enabled = self.provider.is_enabled(feature_key, user_id);
        tracing::debug!(feature = feature_key, user = user_id, enabled, "feature evaluated");
        enabled
    }

    /// `None` when the feature is off for the user or the variable is not
    /// defined. Callers pick their own default.
    pub fn get_variable_string(&self, feature_key: &str, variable: &str, user_id: &str) -> Option<String> {
        if !self.is_enabled(feature_key, user_id) {
            return None;
        }
        self.provider.variable_string(feature_key, variable, user_id)
    }

    pub fn decide(&self, feature_key: &str, user_id: &str) -> FeatureDecision {
        let enabled = self.is_enabled(feature_key, user_id);
        let variables = if enabled {
            self.provider.variables(feature_key, user_id)
        } else {
            Default::default()
        };
        FeatureDecision {
            feature_key: feature_key.to_string(),
            user_id: user_id.to_string(),
            enabled,
            variables,
        }
    }

    /// Fire-and-forget conversion event. Never fails; problems are logged.
    pub fn track(&self, event_key: &str, user_id: &str) {
        let Some(event_id) = self.provider.event_id(event_key) else {
            tracing::warn!(event = event_key, "event key not in configuration; not tracking");
            return;
        };
        let event = ConversionEvent::new(
            event_key,
            event_id,
            user_id,
            self.provider.revision().map(str::to_string),
        );
        if let Err(e) = self.dispatcher.dispatch(&event) {
            tracing::warn!(event = event_key, user = user_id, error = %e, "failed to dispatch event");
        }
    }
}

async fn fetch_datafile(url: &str, opts: &FetchOptions) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(opts.timeout)
        .build()
        .map_err(|e| fetch_error(url, e))?;

    let mut attempt = 0;
    loop {
        attempt += 1;
        match fetch_once(&client, url).await {
            Ok(body) => return Ok(body),
            Err(FetchFailure::Retryable(reason)) if attempt <= opts.retries => {
                tracing::warn!(%url, attempt, %reason, "datafile fetch failed; retrying");
                tokio::time::sleep(opts.backoff * attempt).await;
            }
            Err(FetchFailure::Retryable(reason) | FetchFailure::Fatal(reason)) => {
                tracing::error!(%url, attempt, %reason, "datafile fetch failed");
                return Err(StorefrontError::ConfigFetch {
                    url: url.to_string(),
                    reason,
                });
            }
        }
    }
}

enum FetchFailure {
    Retryable(String),
    Fatal(String),
}

async fn fetch_once(client: &reqwest::Client, url: &str) -> std::result::Result<String, FetchFailure> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| FetchFailure::Retryable(e.to_string()))?;
    let status = response.status();
    if status.is_server_error() {
        return Err(FetchFailure::Retryable(format!("HTTP status {status}")));
    }
    if status.is_client_error() {
        return Err(FetchFailure::Fatal(format!("HTTP status {status}")));
    }
    response
        .text()
        .await
        .map_err(|e| FetchFailure::Retryable(e.to_string()))
}

fn fetch_error(url: &str, e: reqwest::Error) -> StorefrontError {
    StorefrontError::ConfigFetch {
        url: url.to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::RecordingDispatcher;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    /// Enabled for users whose id starts with 'a'; one variable.
    struct Prefix;

    impl FlagProvider for Prefix {
        fn is_enabled(&self, _feature_key: &str, user_id: &str) -> bool {
            user_id.starts_with('a')
        }

        // Deliberately ignores enablement; the facade must gate it.
        fn variable_string(&self, _feature_key: &str, variable: &str, user_id: &str) -> Option<String> {
            (variable == "welcome_message").then(|| format!("Hi {user_id}"))
        }

        fn variables(&self, feature_key: &str, user_id: &str) -> BTreeMap<String, String> {
            self.variable_string(feature_key, "welcome_message", user_id)
                .map(|v| BTreeMap::from([("welcome_message".to_string(), v)]))
                .unwrap_or_default()
        }
    }

    #[test]
    fn variable_absent_when_disabled() {
        let client = FlagClient::with_provider(Prefix);
        assert_eq!(
            client.get_variable_string("f", "welcome_message", "alice").as_deref(),
            Some("Hi alice")
        );
        assert_eq!(client.get_variable_string("f", "welcome_message", "bob"), None);
        assert_eq!(client.get_variable_string("f", "other", "alice"), None);
    }

    #[test]
    fn decide_collects_variables() {
        let client = FlagClient::with_provider(Prefix);
        let on = client.decide("f", "alice");
        assert!(on.enabled);
        assert_eq!(on.variables.get("welcome_message").map(String::as_str), Some("Hi alice"));
        let off = client.decide("f", "bob");
        assert!(!off.enabled);
        assert!(off.variables.is_empty());
    }

    #[test]
    fn track_uses_dispatcher() {
        let rec = RecordingDispatcher::new();
        let client = FlagClient::with_provider(Prefix).with_dispatcher(rec.clone());
        client.track("item_purchase", "alice");
        let events = rec.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_key, "item_purchase");
        assert_eq!(events[0].user_id, "alice");
    }

    #[test]
    fn track_skips_unknown_events() {
        let rec = RecordingDispatcher::new();
        let client = FlagClient::from_datafile(r#"{"events":[{"key":"item_purchase"}]}"#)
            .unwrap()
            .with_dispatcher(rec.clone());
        client.track("page_view", "alice");
        client.track("item_purchase", "alice");
        let events = rec.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id, "item_purchase");
    }

    struct Failing;

    impl EventDispatcher for Failing {
        fn dispatch(&self, _event: &ConversionEvent) -> Result<()> {
            Err(StorefrontError::Io(std::io::Error::other("down")))
        }
    }

    #[test]
    fn track_swallows_dispatch_errors() {
        let client = FlagClient::with_provider(Prefix).with_dispatcher(Failing);
        client.track("item_purchase", "alice");
    }
}
