//! Settings inflation (4.4): deep-copies each feature rule's campaign,
//! overwrites its ruleKey, filters PERSONALIZE variations down to the one
//! referenced variation, allocates variation ranges, and flags features that
//! need the gateway service for geo/UA/inlist segmentation.

use std::collections::HashMap;

use regex::Regex;

use crate::hashing::allocate_ranges;
use crate::segmentation::dsl::parse_segment;
use crate::settings::model::{Campaign, CampaignType, Feature, RawSettings, Settings};

fn requires_gateway(segments: &Option<serde_json::Value>) -> bool {
    let Some(segments) = segments else { return false };
    let text = segments.to_string();
    static GEO_UA_RE: once_cell::sync::Lazy<Regex> = once_cell::sync::Lazy::new(|| {
        Regex::new(r#""(country|region|city|os|device_type|browser_string|ua)""#).unwrap()
    });
    static INLIST_RE: once_cell::sync::Lazy<Regex> =
        once_cell::sync::Lazy::new(|| Regex::new(r"inlist\([^)]*\)").unwrap());
    GEO_UA_RE.is_match(&text) || (text.contains("custom_variable") && INLIST_RE.is_match(&text))
}

fn allocate_campaign(campaign: &mut Campaign) {
    match campaign.campaign_type {
        CampaignType::Ab => {
            let weights: Vec<f64> = campaign.variations.iter().map(|v| v.weight).collect();
            let ranges = allocate_ranges(&weights, 10000, false);
            for (variation, range) in campaign.variations.iter_mut().zip(ranges) {
                variation.range = range;
                tracing::debug!(campaign = %campaign.key, variation = %variation.name, start = range.start, end = range.end, "allocated variation range");
            }
        }
        CampaignType::Rollout | CampaignType::Personalize => {
            if let Some(variation) = campaign.variations.first_mut() {
                let end = (variation.weight * 100.0).floor() as i64;
                variation.range = crate::hashing::Range { start: 1, end };
            }
        }
    }
}

fn inflate_rule_campaign(settings: &RawSettings, rule: &crate::settings::model::FeatureRule) -> Option<Campaign> {
    let source = settings.campaigns.iter().find(|c| c.id == rule.campaign_id)?;
    let mut campaign = source.clone();
    campaign.rule_key = rule.rule_key.clone();
    if let Some(variation_id) = rule.variation_id {
        campaign.variations.retain(|v| v.id == variation_id);
    }
    campaign.parsed_segments = campaign.segments.as_ref().and_then(|s| parse_segment(s).ok());
    allocate_campaign(&mut campaign);
    Some(campaign)
}

fn inflate_feature(settings: &RawSettings, feature: &mut Feature) {
    feature.rules_linked_campaign = feature
        .rules
        .iter()
        .filter_map(|rule| inflate_rule_campaign(settings, rule))
        .collect();
    feature.is_gateway_service_required = feature
        .rules_linked_campaign
        .iter()
        .any(|c| requires_gateway(&c.segments));
}

/// Builds a query-ready [`Settings`] from a freshly-deserialized [`RawSettings`].
pub fn compile(mut raw: RawSettings) -> Settings {
    for campaign in raw.campaigns.iter_mut() {
        campaign.parsed_segments = campaign.segments.as_ref().and_then(|s| parse_segment(s).ok());
        allocate_campaign(campaign);
    }

    let mut features = std::mem::take(&mut raw.features);
    for feature in features.iter_mut() {
        inflate_feature(&raw, feature);
    }
    raw.features = features;

    let features_by_key: HashMap<String, usize> = raw
        .features
        .iter()
        .enumerate()
        .map(|(i, f)| (f.key.clone(), i))
        .collect();
    let campaigns_by_id: HashMap<i64, usize> = raw
        .campaigns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id, i))
        .collect();

    Settings { raw, features_by_key, campaigns_by_id }
}

#[cfg(test)]
mod inflate_tests {
    use super::*;
    use crate::settings::model::{CampaignType, FeatureRule, Variation};

    fn base_campaign() -> Campaign {
        Campaign {
            id: 1,
            key: "c1".into(),
            name: "Campaign 1".into(),
            campaign_type: CampaignType::Ab,
            percent_traffic: 100.0,
            salt: None,
            segments: None,
            is_forced_variation_enabled: false,
            is_user_list_enabled: false,
            variations: vec![
                Variation { id: 1, name: "A".into(), weight: 50.0, salt: None, segments: None, variables: vec![], range: Default::default() },
                Variation { id: 2, name: "B".into(), weight: 50.0, salt: None, segments: None, variables: vec![], range: Default::default() },
            ],
            rule_key: String::new(),
            parsed_segments: None,
        }
    }

    #[test]
    fn inflation_overwrites_rule_key_and_allocates_ranges() {
        let raw = RawSettings {
            version: 1,
            account_id: "acc".into(),
            sdk_key: "key".into(),
            collection_prefix: None,
            campaigns: vec![base_campaign()],
            features: vec![Feature {
                id: 1,
                key: "feature_ab".into(),
                name: "Feature AB".into(),
                impact_campaign: None,
                rules: vec![FeatureRule { rule_type: "experiment".into(), rule_key: "rule-1".into(), campaign_id: 1, variation_id: None }],
                rules_linked_campaign: vec![],
                is_gateway_service_required: false,
            }],
            groups: HashMap::new(),
            campaign_groups: HashMap::new(),
        };
        let settings = compile(raw);
        let feature = settings.get_feature("feature_ab").unwrap();
        assert_eq!(feature.rules_linked_campaign.len(), 1);
        assert_eq!(feature.rules_linked_campaign[0].rule_key, "rule-1");
        assert_eq!(feature.rules_linked_campaign[0].variations[0].range.start, 1);
        assert_eq!(feature.rules_linked_campaign[0].variations[0].range.end, 5000);
    }
}
