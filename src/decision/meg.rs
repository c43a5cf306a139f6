//! Mutually-Exclusive Group arbitration (4.7). Chooses a single winning
//! campaign among everything sharing a group for one user, with sticky
//! storage precedence and a request-scoped cache so the other features in
//! the group short-circuit once a winner is known.

use std::collections::{HashMap, HashSet};

use crate::decision::campaign::{get_variation_alloted, is_user_part_of_campaign, passes_pre_segmentation};
use crate::hashing::{allocate_ranges, bucket_for_user};
use crate::segmentation::EvalInput;
use crate::settings::model::{Campaign, CampaignType, Feature, Group, Settings};
use crate::storage::{meg_storage_key, StorageDecorator, StorageRecord};

fn campaign_ref(campaign: &Campaign, variation_id: Option<i64>) -> String {
    match variation_id {
        Some(id) => format!("{}_{}", campaign.id, id),
        None => campaign.id.to_string(),
    }
}

/// Per-request cache so that once a winner is known for a group, every other
/// candidate in that group short-circuits to "not the winner" without
/// re-running arbitration.
#[derive(Default)]
pub struct MegRequestCache {
    winners: HashMap<String, String>,
}

impl MegRequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn winner_for(&self, group_id: &str) -> Option<&String> {
        self.winners.get(group_id)
    }

    pub fn record_winner(&mut self, group_id: &str, winner_ref: String) {
        self.winners.insert(group_id.to_string(), winner_ref);
    }
}

fn weighted_pick<'a>(candidates: &[&'a Campaign], weights: &[f64], user_id: &str, account_id: &str, group_id: &str) -> &'a Campaign {
    let ranges = allocate_ranges(weights, 10000, true);
    let seed = format!("{group_id}_{account_id}_{user_id}");
    let value = bucket_for_user(&seed, 10000);
    candidates
        .iter()
        .zip(ranges)
        .find(|(_, range)| value as i64 >= range.start && (value as i64) < range.end)
        .map(|(c, _)| *c)
        .unwrap_or(candidates[0])
}

fn pick_winner<'a>(group: &Group, candidates: &[&'a Campaign], user_id: &str, account_id: &str, group_id: &str) -> &'a Campaign {
    if candidates.len() == 1 {
        return candidates[0];
    }
    if group.et == 1 {
        let weights = vec![100.0 / candidates.len() as f64; candidates.len()];
        return weighted_pick(candidates, &weights, user_id, account_id, group_id);
    }
    for priority_ref in &group.priority {
        if let Some(found) = candidates.iter().find(|c| &campaign_ref(c, None) == priority_ref) {
            return found;
        }
    }
    let weights: Vec<f64> = candidates
        .iter()
        .map(|c| group.weight.get(&campaign_ref(c, None)).copied().unwrap_or(0.0))
        .collect();
    weighted_pick(candidates, &weights, user_id, account_id, group_id)
}

/// Ref format for a campaign as it would appear in `group.campaigns`: plain id
/// for AB, `id_variationId` for PERSONALIZE (its single inflated variation).
fn ref_for_campaign(campaign: &Campaign) -> String {
    match campaign.variations.first() {
        Some(v) if campaign.campaign_type == CampaignType::Personalize => format!("{}_{}", campaign.id, v.id),
        _ => campaign.id.to_string(),
    }
}

/// Features owning at least one campaign ref listed in this group (4.7 step 1).
fn participating_features<'a>(settings: &'a Settings, group: &Group) -> Vec<&'a Feature> {
    let mut seen = HashSet::new();
    let mut features = vec![];
    for feature in &settings.raw.features {
        let owns_one = feature
            .rules_linked_campaign
            .iter()
            .any(|c| group.campaigns.iter().any(|r| r == &ref_for_campaign(c)));
        if owns_one && seen.insert(feature.id) {
            features.push(feature);
        }
    }
    features
}

/// A feature with no rollout rules always passes; one with rollout rules
/// passes only if at least one of them allots this user a variation.
fn rollout_gate_passes(feature: &Feature, user_id: &str, account_id: &str, input: &EvalInput) -> bool {
    let rollouts: Vec<&Campaign> = feature
        .rules_linked_campaign
        .iter()
        .filter(|c| c.campaign_type == CampaignType::Rollout)
        .collect();
    if rollouts.is_empty() {
        return true;
    }
    rollouts.iter().any(|c| get_variation_alloted(user_id, account_id, c, input).is_some())
}

/// Evaluates a mutually-exclusive group for one user and returns the winning
/// campaign ref (`"<id>"` or `"<id>_<variationId>"`), if any.
pub fn evaluate_group(
    settings: &Settings,
    group_id: &str,
    user_id: &str,
    account_id: &str,
    storage: &StorageDecorator,
    cache: &mut MegRequestCache,
    input: &EvalInput,
) -> Option<String> {
    if let Some(cached) = cache.winner_for(group_id) {
        return Some(cached.clone());
    }

    let Some(group) = settings.raw.groups.get(group_id) else { return None };

    // Step 1: a feature whose rollout rules exist but none pass drops every
    // campaign it owns out of the group entirely, before stickiness is even
    // considered.
    let gated_out: HashSet<i64> = participating_features(settings, group)
        .into_iter()
        .filter(|f| !rollout_gate_passes(f, user_id, account_id, input))
        .flat_map(|f| f.rules_linked_campaign.iter().map(|c| c.id))
        .collect();

    let candidates: Vec<&Campaign> = group
        .campaigns
        .iter()
        .filter_map(|campaign_ref| {
            let id_part = campaign_ref.split('_').next()?;
            let id: i64 = id_part.parse().ok()?;
            settings.get_campaign(id)
        })
        .filter(|c| !gated_out.contains(&c.id))
        .collect();

    let mut seen_ids = HashSet::new();
    let candidates: Vec<&Campaign> = candidates.into_iter().filter(|c| seen_ids.insert(c.id)).collect();

    if candidates.is_empty() {
        return None;
    }

    // Step 2: stickiness is checked against every surviving candidate, not
    // just the ones that currently pass pre-segmentation/traffic -- a
    // previously-sticky winner keeps winning even if targeting later shifts.
    let sticky_key = meg_storage_key(group_id);
    let sticky_ref = storage
        .get(&sticky_key, user_id)
        .and_then(|record| record.experiment_key.map(|k| (k, record.experiment_variation_id)));

    let with_storage: Vec<&Campaign> = if let Some((sticky_campaign_key, _)) = &sticky_ref {
        candidates.iter().filter(|c| &c.key == sticky_campaign_key).copied().collect()
    } else {
        vec![]
    };

    let winner = if !with_storage.is_empty() {
        with_storage[0]
    } else {
        let eligible: Vec<&Campaign> = candidates
            .iter()
            .filter(|c| passes_pre_segmentation(c, input))
            .filter(|c| is_user_part_of_campaign(user_id, c))
            .copied()
            .collect();
        if eligible.is_empty() {
            return None;
        }
        pick_winner(group, &eligible, user_id, account_id, group_id)
    };

    let winner_variation_id = if with_storage.is_empty() {
        None
    } else {
        sticky_ref.and_then(|(_, vid)| vid).filter(|&v| v != -1)
    };
    let winner_ref = campaign_ref(winner, winner_variation_id);

    if with_storage.is_empty() {
        storage.set(StorageRecord {
            feature_key: sticky_key,
            user_id: user_id.to_string(),
            experiment_id: Some(winner.id),
            experiment_key: Some(winner.key.clone()),
            experiment_variation_id: Some(-1),
            ..Default::default()
        });
    }

    cache.record_winner(group_id, winner_ref.clone());
    Some(winner_ref)
}

#[cfg(test)]
mod meg_tests {
    use super::*;

    #[test]
    fn campaign_ref_formats_personalize_with_variation_suffix() {
        let campaign = Campaign {
            id: 7,
            key: "c7".into(),
            name: "c7".into(),
            campaign_type: crate::settings::model::CampaignType::Personalize,
            percent_traffic: 0.0,
            salt: None,
            segments: None,
            is_forced_variation_enabled: false,
            is_user_list_enabled: false,
            variations: vec![],
            rule_key: String::new(),
            parsed_segments: None,
        };
        assert_eq!(campaign_ref(&campaign, Some(3)), "7_3");
        assert_eq!(campaign_ref(&campaign, None), "7");
    }

    #[test]
    fn request_cache_short_circuits_repeat_lookups() {
        let mut cache = MegRequestCache::new();
        assert!(cache.winner_for("g1").is_none());
        cache.record_winner("g1", "10".to_string());
        assert_eq!(cache.winner_for("g1"), Some(&"10".to_string()));
    }

    fn campaign_fixture(id: i64, campaign_type: CampaignType) -> Campaign {
        Campaign {
            id,
            key: format!("c{id}"),
            name: format!("c{id}"),
            campaign_type,
            percent_traffic: 100.0,
            salt: None,
            segments: None,
            is_forced_variation_enabled: false,
            is_user_list_enabled: false,
            variations: vec![crate::settings::model::Variation {
                id: 1,
                name: "V1".into(),
                weight: 100.0,
                salt: None,
                segments: None,
                variables: vec![],
                range: crate::hashing::Range { start: 1, end: 10000 },
            }],
            rule_key: String::new(),
            parsed_segments: None,
        }
    }

    #[test]
    fn feature_without_rollout_rules_passes_the_gate() {
        let feature = Feature {
            id: 1,
            key: "f1".into(),
            name: "f1".into(),
            impact_campaign: None,
            rules: vec![],
            rules_linked_campaign: vec![campaign_fixture(1, CampaignType::Ab)],
            is_gateway_service_required: false,
        };
        let props = HashMap::new();
        let membership = |_: &str| false;
        let inlist = |_: &str, _: &str| false;
        let input = EvalInput {
            properties: &props,
            user_agent: None,
            location: None,
            ua_info: None,
            user_id: "u1",
            feature_membership: &membership,
            inlist_check: &inlist,
        };
        assert!(rollout_gate_passes(&feature, "u1", "acc1", &input));
    }

    #[test]
    fn feature_with_full_rollout_always_passes_the_gate() {
        let feature = Feature {
            id: 1,
            key: "f1".into(),
            name: "f1".into(),
            impact_campaign: None,
            rules: vec![],
            rules_linked_campaign: vec![campaign_fixture(1, CampaignType::Rollout)],
            is_gateway_service_required: false,
        };
        let props = HashMap::new();
        let membership = |_: &str| false;
        let inlist = |_: &str, _: &str| false;
        let input = EvalInput {
            properties: &props,
            user_agent: None,
            location: None,
            ua_info: None,
            user_id: "u1",
            feature_membership: &membership,
            inlist_check: &inlist,
        };
        assert!(rollout_gate_passes(&feature, "u1", "acc1", &input));
    }
}
