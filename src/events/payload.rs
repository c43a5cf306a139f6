//! Event payload shapes (4.9) handed to the batch queue.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationReason {
    TargetingMatch,
    Split,
    Default,
    Disabled,
    Error,
}

#[derive(Debug, Clone)]
pub struct DecisionRecord {
    pub feature_key: String,
    pub feature_name: String,
    pub user_id: String,
    pub is_enabled: bool,
    pub variation_id: Option<i64>,
    pub variation_name: Option<String>,
    pub rollout_id: Option<i64>,
    pub rollout_key: Option<String>,
    pub experiment_id: Option<i64>,
    pub experiment_key: Option<String>,
    pub reason: EvaluationReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImpressionEvent {
    pub msg_id: String,
    pub vis_id: String,
    pub session_id: i64,
    pub campaign_id: i64,
    pub variation_id: i64,
    pub feature_key: String,
    pub sdk_name: String,
    pub sdk_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackEvent {
    pub event_name: String,
    pub vis_id: String,
    pub session_id: i64,
    pub time_ms: i64,
    pub properties: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttributeEvent {
    pub vis_id: String,
    pub attributes: HashMap<String, Value>,
}

#[derive(Debug, Clone)]
pub enum QueuedEvent {
    Impression(ImpressionEvent),
    Track(TrackEvent),
    Attribute(AttributeEvent),
}

pub fn build_msg_id(vis_id: &str, time_ms: i64) -> String {
    format!("{vis_id}-{time_ms}")
}
