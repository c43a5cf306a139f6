//! Wire and compiled representations of a VWO-style settings document:
//! campaigns, variations, variables, features and mutually-exclusive groups.

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::hashing::Range;
use crate::segmentation::dsl::SegmentNode;

/// The settings wire format represents an empty `campaigns`/`features` list
/// as `{}` rather than `[]` (`settings_schema.py`'s `array` else `EMPTY_OBJECT`
/// placeholder). Accept either shape, treating any object value as empty.
fn array_or_empty_object<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ArrayOrEmptyObject<T> {
        Array(Vec<T>),
        Object(HashMap<String, serde_json::Value>),
    }

    match ArrayOrEmptyObject::<T>::deserialize(deserializer)? {
        ArrayOrEmptyObject::Array(items) => Ok(items),
        ArrayOrEmptyObject::Object(_) => Ok(Vec::new()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CampaignType {
    Ab,
    Personalize,
    Rollout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub id: i64,
    pub key: String,
    #[serde(rename = "type")]
    pub var_type: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variation {
    pub id: i64,
    pub name: String,
    pub weight: f64,
    #[serde(default)]
    pub salt: Option<String>,
    #[serde(default)]
    pub segments: Option<serde_json::Value>,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(skip)]
    pub range: Range,
}

impl Variation {
    pub fn get_variable_by_key(&self, key: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.key == key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: i64,
    pub key: String,
    pub name: String,
    #[serde(rename = "type")]
    pub campaign_type: CampaignType,
    #[serde(default)]
    pub percent_traffic: f64,
    #[serde(default)]
    pub salt: Option<String>,
    #[serde(default)]
    pub segments: Option<serde_json::Value>,
    #[serde(default)]
    pub is_forced_variation_enabled: bool,
    #[serde(default)]
    pub is_user_list_enabled: bool,
    pub variations: Vec<Variation>,
    /// Overwritten with the owning feature rule's ruleKey during inflation (4.4).
    #[serde(default)]
    pub rule_key: String,

    #[serde(skip)]
    pub parsed_segments: Option<SegmentNode>,
}

impl Campaign {
    fn salt_or_id(&self) -> Option<String> {
        match (&self.campaign_type, &self.salt) {
            (_, Some(salt)) => Some(salt.clone()),
            (CampaignType::Rollout | CampaignType::Personalize, None) => {
                self.variations.first().and_then(|v| v.salt.clone())
            }
            (CampaignType::Ab, None) => None,
        }
    }

    /// Seed for the traffic-membership gate (`isUserPartOfCampaign`, 4.5):
    /// `salt_userId` or `campaignId_userId`, never includes `accountId`.
    pub fn traffic_seed(&self, user_id: &str) -> String {
        match self.salt_or_id() {
            Some(salt) => format!("{salt}_{user_id}"),
            None => format!("{}_{}", self.id, user_id),
        }
    }

    /// Seed for variation bucketing (`bucketUserToVariation`, 4.5) and for
    /// whitelisting's candidate bucket (4.6): `salt_accountId_userId` or
    /// `campaignId_accountId_userId`.
    pub fn variation_seed(&self, user_id: &str, account_id: &str) -> String {
        match self.salt_or_id() {
            Some(salt) => format!("{salt}_{account_id}_{user_id}"),
            None => format!("{}_{}_{}", self.id, account_id, user_id),
        }
    }

    pub fn traffic_and_salt(&self) -> (f64, Option<String>) {
        match self.campaign_type {
            CampaignType::Ab => (self.percent_traffic, self.salt.clone()),
            CampaignType::Rollout | CampaignType::Personalize => self
                .variations
                .first()
                .map(|v| (v.weight, v.salt.clone()))
                .unwrap_or((0.0, None)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRule {
    #[serde(rename = "type")]
    pub rule_type: String,
    pub rule_key: String,
    pub campaign_id: i64,
    #[serde(default)]
    pub variation_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactCampaign {
    pub campaign_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub id: i64,
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub impact_campaign: Option<ImpactCampaign>,
    pub rules: Vec<FeatureRule>,

    /// Deep-copied, per-rule campaigns with their own ruleKey and final
    /// variation ranges. Built once per settings snapshot (4.4).
    #[serde(skip)]
    pub rules_linked_campaign: Vec<Campaign>,
    #[serde(skip)]
    pub is_gateway_service_required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    /// campaignRef -> either "<id>" (AB) or "<id>_<variationId>" (PERSONALIZE)
    pub campaigns: Vec<String>,
    /// 1 = random/equal-weight algorithm, anything else = priority/weighted
    #[serde(default)]
    pub et: i32,
    #[serde(default)]
    pub priority: Vec<String>,
    #[serde(default)]
    pub weight: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSettings {
    pub version: i64,
    pub account_id: String,
    pub sdk_key: String,
    #[serde(default)]
    pub collection_prefix: Option<String>,
    #[serde(default, deserialize_with = "array_or_empty_object")]
    pub campaigns: Vec<Campaign>,
    #[serde(default, deserialize_with = "array_or_empty_object")]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub groups: HashMap<String, Group>,
    #[serde(default)]
    pub campaign_groups: HashMap<String, String>,
}

/// The compiled, query-ready settings snapshot. Produced once per settings
/// load by [`crate::settings::inflate::compile`] and never mutated afterward;
/// readers share it behind an `Arc` (see [`crate::settings::manager`]).
#[derive(Debug, Clone)]
pub struct Settings {
    pub raw: RawSettings,
    pub features_by_key: HashMap<String, usize>,
    pub campaigns_by_id: HashMap<i64, usize>,
}

impl Settings {
    pub fn get_feature(&self, key: &str) -> Option<&Feature> {
        self.features_by_key.get(key).map(|&i| &self.raw.features[i])
    }

    pub fn get_campaign(&self, id: i64) -> Option<&Campaign> {
        self.campaigns_by_id.get(&id).map(|&i| &self.raw.campaigns[i])
    }

    pub fn group_id_for(&self, campaign_ref: &str) -> Option<&String> {
        self.raw.campaign_groups.get(campaign_ref)
    }
}
