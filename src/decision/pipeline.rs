//! The decision pipeline (4.8): storage hit short-circuit, rollout cascade,
//! experiment cascade (with MEG arbitration folded in), impression emission,
//! and the final sticky write. Never panics and never returns `Err` -- any
//! internal failure degrades to a disabled response.

use std::collections::HashMap;

use serde_json::Value;

use crate::context::EvaluationContext;
use crate::decision::campaign::{get_variation_alloted, get_whitelisted_variation, passes_pre_segmentation};
use crate::decision::meg::{evaluate_group, MegRequestCache};
use crate::events::payload::{DecisionRecord, EvaluationReason};
use crate::hooks::DecisionHook;
use crate::segmentation::EvalInput;
use crate::settings::model::{Campaign, CampaignType, Feature, Settings, Variation};
use crate::storage::{StorageDecorator, StorageRecord};

#[derive(Debug, Clone, Default)]
pub struct GetFlagResult {
    pub is_enabled: bool,
    pub variables: Vec<crate::settings::model::Variable>,
}

struct SelectedRule<'a> {
    campaign: &'a Campaign,
    variation: Variation,
    is_rollout: bool,
}

fn feature_membership_check<'a>(settings: &'a Settings, storage: &'a StorageDecorator, user_id: &'a str) -> impl Fn(&str) -> bool + 'a {
    move |feature_key: &str| -> bool {
        settings
            .get_feature(feature_key)
            .map(|f| storage.get(&f.key, user_id).is_some())
            .unwrap_or(false)
    }
}

fn no_inlist_gateway(_key: &str, _list_id: &str) -> bool {
    // Resolved through the gateway service by the caller before segmentation
    // runs (9, open questions); the pipeline itself stays synchronous.
    false
}

fn make_eval_input<'a>(
    ctx: &'a EvaluationContext,
    props: &'a HashMap<String, Value>,
    membership: &'a dyn Fn(&str) -> bool,
) -> EvalInput<'a> {
    EvalInput {
        properties: props,
        user_agent: ctx.user_agent.as_deref(),
        location: ctx.vwo.as_ref().map(|v| &v.location),
        ua_info: ctx.vwo.as_ref().map(|v| &v.ua_info),
        user_id: &ctx.id,
        feature_membership: membership,
        inlist_check: &no_inlist_gateway,
    }
}

pub fn get_flag(
    settings: &Settings,
    feature_key: &str,
    ctx: &EvaluationContext,
    storage: &StorageDecorator,
    hook: &dyn DecisionHook,
    mut on_impression: impl FnMut(&Campaign, &Variation, &Feature),
) -> GetFlagResult {
    let Some(feature) = settings.get_feature(feature_key) else {
        tracing::debug!(feature_key, "feature not found");
        return GetFlagResult::default();
    };

    let mut response = GetFlagResult::default();
    let mut should_check_experiments = false;
    let mut decision_record = DecisionRecord {
        feature_key: feature.key.clone(),
        feature_name: feature.name.clone(),
        user_id: ctx.id.clone(),
        is_enabled: false,
        variation_id: None,
        variation_name: None,
        rollout_id: None,
        rollout_key: None,
        experiment_id: None,
        experiment_key: None,
        reason: EvaluationReason::Disabled,
    };

    if let Some(stored) = storage.get(&feature.key, &ctx.id) {
        if stored.has_experiment() {
            let found = feature.rules_linked_campaign.iter().find_map(|c| {
                if stored.experiment_key.as_deref() != Some(c.key.as_str()) {
                    return None;
                }
                c.variations
                    .iter()
                    .find(|v| Some(v.id) == stored.experiment_variation_id)
                    .map(|v| (c, v))
            });
            if let Some((campaign, variation)) = found {
                response.is_enabled = true;
                response.variables = variation.variables.clone();
                decision_record.is_enabled = true;
                decision_record.variation_id = Some(variation.id);
                decision_record.variation_name = Some(variation.name.clone());
                decision_record.experiment_id = Some(campaign.id);
                decision_record.experiment_key = Some(campaign.key.clone());
                decision_record.reason = EvaluationReason::TargetingMatch;
                hook.decision(&decision_record);
                return response;
            }
        } else if stored.has_rollout() {
            if let Some(campaign) = feature.rules_linked_campaign.iter().find(|c| {
                c.campaign_type == CampaignType::Rollout && Some(c.key.as_str()) == stored.rollout_key.as_deref()
            }) {
                if let Some(variation) = campaign.variations.first() {
                    response.is_enabled = true;
                    response.variables = variation.variables.clone();
                    should_check_experiments = true;
                    decision_record.rollout_id = Some(campaign.id);
                    decision_record.rollout_key = Some(campaign.key.clone());
                }
            }
        }
    }

    let props = ctx.custom_variables.clone();
    let membership = feature_membership_check(settings, storage, &ctx.id);
    let input = make_eval_input(ctx, &props, &membership);

    let rollouts: Vec<&Campaign> = feature
        .rules_linked_campaign
        .iter()
        .filter(|c| c.campaign_type == CampaignType::Rollout)
        .collect();

    let account_id = &settings.raw.account_id;

    if !response.is_enabled && !rollouts.is_empty() {
        for campaign in &rollouts {
            if let Some(variation) = get_variation_alloted(&ctx.id, account_id, campaign, &input) {
                response.is_enabled = true;
                response.variables = variation.variables.clone();
                should_check_experiments = true;
                decision_record.rollout_id = Some(campaign.id);
                decision_record.rollout_key = Some(campaign.key.clone());
                decision_record.variation_id = Some(variation.id);
                decision_record.variation_name = Some(variation.name.clone());
                on_impression(campaign, variation, feature);
                break;
            }
        }
    } else if rollouts.is_empty() {
        should_check_experiments = true;
    }

    if should_check_experiments {
        let mut meg_cache = MegRequestCache::new();
        let experiments: Vec<&Campaign> = feature
            .rules_linked_campaign
            .iter()
            .filter(|c| c.campaign_type != CampaignType::Rollout)
            .collect();

        let mut selected: Option<SelectedRule> = None;

        for campaign in experiments {
            if campaign.campaign_type == CampaignType::Ab && campaign.is_forced_variation_enabled {
                let targeting_props: HashMap<String, Value> = ctx.variation_targeting_variables.clone();
                let targeting_input = make_eval_input(ctx, &targeting_props, &membership);
                if let Some(variation) = get_whitelisted_variation(&ctx.id, account_id, campaign, &targeting_input) {
                    selected = Some(SelectedRule { campaign, variation, is_rollout: false });
                    break;
                }
            }

            if !passes_pre_segmentation(campaign, &input) {
                continue;
            }

            let my_ref = match campaign.campaign_type {
                CampaignType::Personalize => campaign
                    .variations
                    .first()
                    .map(|v| format!("{}_{}", campaign.id, v.id))
                    .unwrap_or_else(|| campaign.id.to_string()),
                _ => campaign.id.to_string(),
            };
            let group_id = settings.group_id_for(&my_ref).cloned();
            if let Some(group_id) = group_id {
                let winner_ref = evaluate_group(settings, &group_id, &ctx.id, account_id, storage, &mut meg_cache, &input);
                if winner_ref.as_deref() != Some(my_ref.as_str()) {
                    continue;
                }
            }

            if let Some(variation) = get_variation_alloted(&ctx.id, account_id, campaign, &input) {
                selected = Some(SelectedRule { campaign, variation: variation.clone(), is_rollout: false });
                break;
            }
        }

        if let Some(rule) = selected {
            response.is_enabled = true;
            response.variables = rule.variation.variables.clone();
            decision_record.variation_id = Some(rule.variation.id);
            decision_record.variation_name = Some(rule.variation.name.clone());
            decision_record.experiment_id = Some(rule.campaign.id);
            decision_record.experiment_key = Some(rule.campaign.key.clone());
            decision_record.reason = if rule.is_rollout { EvaluationReason::Split } else { EvaluationReason::TargetingMatch };
            on_impression(rule.campaign, &rule.variation, feature);

            storage.set(StorageRecord {
                feature_key: feature.key.clone(),
                user_id: ctx.id.clone(),
                experiment_id: Some(rule.campaign.id),
                experiment_key: Some(rule.campaign.key.clone()),
                experiment_variation_id: Some(rule.variation.id),
                ..Default::default()
            });
        }
    }

    decision_record.is_enabled = response.is_enabled;
    hook.decision(&decision_record);
    response
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;
    use crate::hooks::NoopHook;
    use crate::settings::model::{FeatureRule, RawSettings, Variable};
    use std::collections::HashMap;

    fn make_settings_with_rollout() -> Settings {
        let campaign = Campaign {
            id: 1,
            key: "rollout-1".into(),
            name: "Rollout".into(),
            campaign_type: CampaignType::Rollout,
            percent_traffic: 0.0,
            salt: None,
            segments: None,
            is_forced_variation_enabled: false,
            is_user_list_enabled: false,
            variations: vec![Variation {
                id: 1,
                name: "On".into(),
                weight: 100.0,
                salt: None,
                segments: None,
                variables: vec![Variable { id: 1, key: "enabled".into(), var_type: "boolean".into(), value: Value::Bool(true) }],
                range: Default::default(),
            }],
            rule_key: String::new(),
            parsed_segments: None,
        };
        let feature = Feature {
            id: 1,
            key: "feature_rollout".into(),
            name: "Feature Rollout".into(),
            impact_campaign: None,
            rules: vec![FeatureRule { rule_type: "rollout".into(), rule_key: "rule-1".into(), campaign_id: 1, variation_id: None }],
            rules_linked_campaign: vec![],
            is_gateway_service_required: false,
        };
        let raw = RawSettings {
            version: 1,
            account_id: "acc".into(),
            sdk_key: "key".into(),
            collection_prefix: None,
            campaigns: vec![campaign],
            features: vec![feature],
            groups: HashMap::new(),
            campaign_groups: HashMap::new(),
        };
        crate::settings::compile(raw)
    }

    #[test]
    fn full_rollout_enables_for_every_user() {
        let settings = make_settings_with_rollout();
        let storage = StorageDecorator::new(None);
        let hook = NoopHook;
        let ctx = EvaluationContext::from_user_context(
            &crate::context::UserContext { id: "u1".into(), ..Default::default() },
            "acc",
        );
        let result = get_flag(&settings, "feature_rollout", &ctx, &storage, &hook, |_, _, _| {});
        assert!(result.is_enabled);
        assert_eq!(result.variables.len(), 1);
    }

    #[test]
    fn unknown_feature_returns_disabled() {
        let settings = make_settings_with_rollout();
        let storage = StorageDecorator::new(None);
        let hook = NoopHook;
        let ctx = EvaluationContext::from_user_context(
            &crate::context::UserContext { id: "u1".into(), ..Default::default() },
            "acc",
        );
        let result = get_flag(&settings, "does-not-exist", &ctx, &storage, &hook, |_, _, _| {});
        assert!(!result.is_enabled);
    }
}
