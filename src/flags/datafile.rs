//! JSON flag configuration and the bundled evaluator over it.
//!
//! ```json
//! {
//!   "revision": "7",
//!   "featureFlags": [{
//!     "key": "sorting_enabled",
//!     "rolloutPercentage": 5000,
//!     "variables": [{ "key": "welcome_message", "type": "string", "defaultValue": "Welcome!" }],
//!     "userOverrides": { "alice": { "enabled": true, "variables": { "welcome_message": "Hi Alice" } } }
//!   }],
//!   "events": [{ "key": "item_purchase", "id": "1001" }]
//! }
//! ```

use super::FlagProvider;
use crate::errors::{Result, StorefrontError};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

/// Rollouts are expressed in basis points.
pub const BUCKET_RANGE: u32 = 10_000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datafile {
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub feature_flags: Vec<FeatureFlag>,
    #[serde(default)]
    pub events: Vec<EventDef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlag {
    pub key: String,
    #[serde(default)]
    pub rollout_percentage: u32,
    #[serde(default)]
    pub variables: Vec<VariableDef>,
    #[serde(default)]
    pub user_overrides: HashMap<String, UserOverride>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDef {
    pub key: String,
    #[serde(rename = "type", default = "string_type")]
    pub kind: String,
    pub default_value: String,
}

fn string_type() -> String {
    "string".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserOverride {
    pub enabled: Option<bool>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventDef {
    pub key: String,
    pub id: Option<String>,
}

impl Datafile {
    pub fn parse(raw: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| StorefrontError::ConfigParse(e.to_string()))?;
        if !value.is_object() {
            return Err(StorefrontError::ConfigParse(
                "datafile must be a JSON object".to_string(),
            ));
        }
        let datafile: Datafile =
            serde_json::from_value(value).map_err(|e| StorefrontError::ConfigParse(e.to_string()))?;
        datafile.validate()?;
        Ok(datafile)
    }

    fn validate(&self) -> Result<()> {
        for flag in &self.feature_flags {
            if flag.rollout_percentage > BUCKET_RANGE {
                return Err(StorefrontError::ConfigParse(format!(
                    "feature {:?}: rolloutPercentage {} exceeds {BUCKET_RANGE}",
                    flag.key, flag.rollout_percentage
                )));
            }
        }
        Ok(())
    }
}

/// Stable bucket in `0..BUCKET_RANGE` for a (feature, user) pair.
pub fn bucket(feature_key: &str, user_id: &str) -> u32 {
    let digest = Sha256::digest(format!("{feature_key}:{user_id}").as_bytes());
    let head = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    head % BUCKET_RANGE
}

/// Evaluates features straight from a [`Datafile`].
#[derive(Debug, Clone)]
pub struct DatafileProvider {
    revision: Option<String>,
    flags: HashMap<String, FeatureFlag>,
    events: HashMap<String, Option<String>>,
}

impl DatafileProvider {
    pub fn new(datafile: Datafile) -> Self {
        let flags = datafile
            .feature_flags
            .into_iter()
            .map(|f| (f.key.clone(), f))
            .collect();
        let events = datafile
            .events
            .into_iter()
            .map(|e| (e.key, e.id))
            .collect();
        Self {
            revision: datafile.revision,
            flags,
            events,
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Datafile::parse(raw).map(Self::new)
    }

    fn flag_for(&self, feature_key: &str, user_id: &str) -> Option<(&FeatureFlag, Option<&UserOverride>)> {
        let flag = self.flags.get(feature_key)?;
        let user_override = flag.user_overrides.get(user_id);
        let enabled = match user_override.and_then(|o| o.enabled) {
            Some(forced) => forced,
            None => bucket(feature_key, user_id) < flag.rollout_percentage,
        };
        enabled.then_some((flag, user_override))
    }
}

impl FlagProvider for DatafileProvider {
    fn is_enabled(&self, feature_key: &str, user_id: &str) -> bool {
        self.flag_for(feature_key, user_id).is_some()
    }

    fn variable_string(&self, feature_key: &str, variable: &str, user_id: &str) -> Option<String> {
        let (flag, user_override) = self.flag_for(feature_key, user_id)?;
        let def = flag
            .variables
            .iter()
            .find(|v| v.key == variable && v.kind == "string")?;
        let value = user_override
            .and_then(|o| o.variables.get(variable))
            .unwrap_or(&def.default_value);
        Some(value.clone())
    }

    fn variables(&self, feature_key: &str, user_id: &str) -> BTreeMap<String, String> {
        let Some((flag, _)) = self.flag_for(feature_key, user_id) else {
            return BTreeMap::new();
        };
        flag.variables
            .iter()
            .filter_map(|v| {
                self.variable_string(feature_key, &v.key, user_id)
                    .map(|value| (v.key.clone(), value))
            })
            .collect()
    }

    fn event_id(&self, event_key: &str) -> Option<String> {
        self.events
            .get(event_key)
            .map(|id| id.clone().unwrap_or_else(|| event_key.to_string()))
    }

    fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }
}
