//! Normalizes caller-supplied user input into the internal evaluation
//! context (4.12): requires an id, derives a stable UUID, and stamps a
//! session id when the caller didn't provide one.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use uuid::Uuid;

use crate::constants::UUID_NAMESPACE_URL;

#[derive(Debug, Clone, Default)]
pub struct UserContext {
    pub id: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub custom_variables: HashMap<String, Value>,
    pub variation_targeting_variables: HashMap<String, Value>,
    pub session_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct GatewayUserData {
    pub location: HashMap<String, String>,
    pub ua_info: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub id: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub custom_variables: HashMap<String, Value>,
    pub variation_targeting_variables: HashMap<String, Value>,
    pub session_id: i64,
    pub vwo_uuid: String,
    pub vwo: Option<GatewayUserData>,
}

impl EvaluationContext {
    pub fn from_user_context(ctx: &UserContext, account_id: &str) -> Self {
        let session_id = ctx.session_id.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0)
        });
        EvaluationContext {
            id: ctx.id.clone(),
            user_agent: ctx.user_agent.clone(),
            ip_address: ctx.ip_address.clone(),
            custom_variables: ctx.custom_variables.clone(),
            variation_targeting_variables: ctx.variation_targeting_variables.clone(),
            session_id,
            vwo_uuid: generate_uuid(&ctx.id, account_id),
            vwo: None,
        }
    }
}

/// `uuid5(uuid5(accountId, NS=uuid5("https://vwo.com")), userId)`, rendered as
/// 32 uppercase hex characters with no dashes.
pub fn generate_uuid(user_id: &str, account_id: &str) -> String {
    let url_namespace = Uuid::new_v5(&Uuid::NAMESPACE_URL, UUID_NAMESPACE_URL.as_bytes());
    let account_namespace = Uuid::new_v5(&url_namespace, account_id.as_bytes());
    let user_uuid = Uuid::new_v5(&account_namespace, user_id.as_bytes());
    user_uuid.simple().to_string().to_uppercase()
}

#[cfg(test)]
mod context_tests {
    use super::*;

    #[test]
    fn uuid_is_deterministic_and_well_formed() {
        let a = generate_uuid("user-1", "acc-1");
        let b = generate_uuid("user-1", "acc-1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_lowercase()));
    }

    #[test]
    fn uuid_differs_per_user() {
        assert_ne!(generate_uuid("user-1", "acc-1"), generate_uuid("user-2", "acc-1"));
    }

    #[test]
    fn session_id_defaults_when_absent() {
        let ctx = UserContext { id: "u1".into(), ..Default::default() };
        let evald = EvaluationContext::from_user_context(&ctx, "acc");
        assert!(evald.session_id > 0);
    }
}
