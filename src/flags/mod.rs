use serde::Serialize;
use std::collections::BTreeMap;

mod client;
pub mod datafile;
pub mod dispatch;

pub use client::{FetchOptions, FlagClient};
pub use datafile::{Datafile, DatafileProvider};
pub use dispatch::{ConversionEvent, EventDispatcher, HttpDispatcher, LogDispatcher, RecordingDispatcher};

/// Trait for pluggable flag evaluators. The facade never looks inside; it only
/// asks for decisions.
pub trait FlagProvider: Send + Sync {
    /// Must be deterministic for a given configuration and user.
    fn is_enabled(&self, feature_key: &str, user_id: &str) -> bool;

    /// Raw string variable. Providers return `None` for disabled features and
    /// for variables the feature does not define.
    fn variable_string(&self, feature_key: &str, variable: &str, user_id: &str) -> Option<String>;

    /// All string variables visible to `user_id`. Empty when disabled.
    fn variables(&self, feature_key: &str, user_id: &str) -> BTreeMap<String, String>;

    /// Resolve an event key to the id the provider reports it under.
    /// `None` means the event is unknown and must not be dispatched.
    fn event_id(&self, event_key: &str) -> Option<String> {
        Some(event_key.to_string())
    }

    /// Revision of the loaded configuration, if the provider has one.
    fn revision(&self) -> Option<&str> {
        None
    }
}

/// Outcome of evaluating one feature for one user. Computed per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureDecision {
    pub feature_key: String,
    pub user_id: String,
    pub enabled: bool,
    pub variables: BTreeMap<String, String>,
}
