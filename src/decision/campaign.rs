//! Campaign Decision Service (4.5): traffic membership, variation selection,
//! and forced-variation whitelisting.

use crate::hashing::{allocate_ranges, bucket_for_user};
use crate::segmentation::{evaluate, EvalInput};
use crate::settings::model::{Campaign, Variation};

/// `0 < bucket(seed, 100) <= traffic`
pub fn is_user_part_of_campaign(user_id: &str, campaign: &Campaign) -> bool {
    let (traffic, _) = campaign.traffic_and_salt();
    let seed = campaign.traffic_seed(user_id);
    let value = bucket_for_user(&seed, 100);
    value > 0 && (value as f64) <= traffic
}

pub fn get_variation_for_bucket_value<'a>(variations: &'a [Variation], bucket_value: u32) -> Option<&'a Variation> {
    variations.iter().find(|v| v.range.contains(bucket_value))
}

/// Buckets the user into `[1, 10000]` using the campaign's seed (salted with
/// `account_id`) and returns the variation whose range contains that value.
pub fn bucket_user_to_variation<'a>(user_id: &str, account_id: &str, campaign: &'a Campaign) -> Option<&'a Variation> {
    let seed = campaign.variation_seed(user_id, account_id);
    let value = bucket_for_user(&seed, 10000);
    get_variation_for_bucket_value(&campaign.variations, value)
}

pub fn passes_pre_segmentation(campaign: &Campaign, input: &EvalInput) -> bool {
    match &campaign.parsed_segments {
        None => true,
        Some(node) => evaluate(node, input),
    }
}

/// Combines pre-segmentation, traffic gating, and variation bucketing into a
/// single "what does this user get from this campaign" decision.
pub fn get_variation_alloted<'a>(user_id: &str, account_id: &str, campaign: &'a Campaign, input: &EvalInput) -> Option<&'a Variation> {
    if !passes_pre_segmentation(campaign, input) {
        return None;
    }
    match campaign.campaign_type {
        crate::settings::model::CampaignType::Ab => {
            if !is_user_part_of_campaign(user_id, campaign) {
                return None;
            }
            bucket_user_to_variation(user_id, account_id, campaign)
        }
        crate::settings::model::CampaignType::Rollout | crate::settings::model::CampaignType::Personalize => {
            campaign.variations.first()
        }
    }
}

/// Forced-variation whitelisting (4.6): only for AB campaigns with
/// `is_forced_variation_enabled`. Evaluates each variation's own segments
/// against the caller-supplied targeting variables, rescales the weights of
/// the variations that pass, and buckets among just those.
pub fn get_whitelisted_variation<'a>(
    user_id: &str,
    account_id: &str,
    campaign: &'a Campaign,
    targeting_input: &EvalInput,
) -> Option<Variation> {
    if !campaign.is_forced_variation_enabled {
        return None;
    }
    let candidates: Vec<&Variation> = campaign
        .variations
        .iter()
        .filter(|v| match &v.segments {
            None => false,
            Some(segments) => crate::segmentation::parse_segment(segments)
                .map(|node| evaluate(&node, targeting_input))
                .unwrap_or(false),
        })
        .collect();

    if candidates.is_empty() {
        return None;
    }

    let weights: Vec<f64> = candidates.iter().map(|v| v.weight).collect();
    let ranges = allocate_ranges(&weights, 10000, false);
    let seed = campaign.variation_seed(user_id, account_id);
    let value = bucket_for_user(&seed, 10000);

    candidates
        .iter()
        .zip(ranges)
        .find(|(_, range)| range.contains(value))
        .map(|(variation, range)| {
            let mut chosen = (*variation).clone();
            chosen.range = range;
            chosen
        })
}

#[cfg(test)]
mod campaign_tests {
    use super::*;
    use crate::settings::model::CampaignType;
    use std::collections::HashMap;

    fn campaign_with(variations: Vec<Variation>) -> Campaign {
        Campaign {
            id: 1,
            key: "c1".into(),
            name: "c1".into(),
            campaign_type: CampaignType::Ab,
            percent_traffic: 100.0,
            salt: None,
            segments: None,
            is_forced_variation_enabled: false,
            is_user_list_enabled: false,
            variations,
            rule_key: String::new(),
            parsed_segments: None,
        }
    }

    fn empty_input<'a>(props: &'a HashMap<String, serde_json::Value>) -> (fn(&str) -> bool, fn(&str, &str) -> bool, EvalInput<'a>) {
        fn membership(_: &str) -> bool { false }
        fn inlist(_: &str, _: &str) -> bool { false }
        let input = EvalInput {
            properties: props,
            user_agent: None,
            location: None,
            ua_info: None,
            user_id: "u1",
            feature_membership: &membership,
            inlist_check: &inlist,
        };
        (membership, inlist, input)
    }

    #[test]
    fn variation_selection_respects_ranges() {
        let mut variations = vec![
            Variation { id: 1, name: "A".into(), weight: 50.0, salt: None, segments: None, variables: vec![], range: crate::hashing::Range { start: 1, end: 5000 } },
            Variation { id: 2, name: "B".into(), weight: 50.0, salt: None, segments: None, variables: vec![], range: crate::hashing::Range { start: 5001, end: 10000 } },
        ];
        variations.sort_by_key(|v| v.id);
        assert_eq!(get_variation_for_bucket_value(&variations, 1).unwrap().id, 1);
        assert_eq!(get_variation_for_bucket_value(&variations, 10000).unwrap().id, 2);
        assert!(get_variation_for_bucket_value(&variations, 0).is_none());
    }

    #[test]
    fn full_traffic_campaign_always_qualifies() {
        let campaign = campaign_with(vec![Variation {
            id: 1, name: "A".into(), weight: 100.0, salt: None, segments: None, variables: vec![],
            range: crate::hashing::Range { start: 1, end: 10000 },
        }]);
        assert!(is_user_part_of_campaign("any-user", &campaign));
    }

    #[test]
    fn no_segments_passes_pre_segmentation() {
        let campaign = campaign_with(vec![]);
        let props = HashMap::new();
        let (_, _, input) = empty_input(&props);
        assert!(passes_pre_segmentation(&campaign, &input));
    }
}
