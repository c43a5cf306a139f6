//! Storage decorator (4.3): wraps a user-supplied [`StorageConnector`] so
//! stickiness is opt-in, connector failures never fail a `get_flag` call, and
//! writes are validated before they ever reach the connector.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageRecord {
    pub feature_key: String,
    pub user_id: String,
    #[serde(default)]
    pub rollout_id: Option<i64>,
    #[serde(default)]
    pub rollout_key: Option<String>,
    #[serde(default)]
    pub rollout_variation_id: Option<i64>,
    #[serde(default)]
    pub experiment_id: Option<i64>,
    #[serde(default)]
    pub experiment_key: Option<String>,
    #[serde(default)]
    pub experiment_variation_id: Option<i64>,
}

impl StorageRecord {
    pub fn has_experiment(&self) -> bool {
        self.experiment_key.is_some() && self.experiment_variation_id.is_some()
    }

    pub fn has_rollout(&self) -> bool {
        self.rollout_key.is_some() && self.rollout_variation_id.is_some()
    }
}

/// User-supplied persistence for sticky decisions. Implementations must be
/// safe to call from multiple threads; the core does not serialize access.
pub trait StorageConnector: Send + Sync {
    fn get(&self, feature_key: &str, user_id: &str) -> Option<StorageRecord>;
    fn set(&self, record: StorageRecord) -> bool;
}

pub struct StorageDecorator {
    connector: Option<std::sync::Arc<dyn StorageConnector>>,
}

impl StorageDecorator {
    pub fn new(connector: Option<std::sync::Arc<dyn StorageConnector>>) -> Self {
        Self { connector }
    }

    pub fn get(&self, feature_key: &str, user_id: &str) -> Option<StorageRecord> {
        let connector = self.connector.as_ref()?;
        connector.get(feature_key, user_id)
    }

    pub fn set(&self, record: StorageRecord) -> bool {
        let Some(connector) = self.connector.as_ref() else { return false };
        if record.feature_key.is_empty() || record.user_id.is_empty() {
            return false;
        }
        if !record.has_experiment() && !record.has_rollout() {
            tracing::debug!(feature_key = %record.feature_key, "storage write rejected: no rollout or experiment triple");
            return false;
        }
        connector.set(record)
    }
}

pub fn meg_storage_key(group_id: &str) -> String {
    format!("{}{}", crate::constants::MEG_STORAGE_PREFIX, group_id)
}
