//! Narrow traits standing in for the out-of-scope HTTP layer (4.13), so the
//! evaluation core stays transport-agnostic and unit-testable without a
//! network. Each has a `reqwest`-backed default implementation.

pub mod http;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CoreError;

#[derive(Debug, Clone)]
pub struct SettingsRequest {
    pub sdk_key: String,
    pub account_id: String,
    pub host: String,
    pub collection_prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BatchEventRequest {
    pub host: String,
    pub account_id: String,
    pub sdk_key: String,
    pub events: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct AttributeCheckRequest {
    pub gateway_url: String,
    pub attribute: String,
    pub list_id: String,
    pub account_id: String,
    pub sdk_key: String,
}

#[derive(Debug, Clone)]
pub struct UserDataRequest {
    pub gateway_url: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GatewayUserData {
    pub location: std::collections::HashMap<String, String>,
    pub ua_info: std::collections::HashMap<String, String>,
}

#[async_trait]
pub trait SettingsTransport: Send + Sync {
    async fn fetch_settings(&self, req: SettingsRequest) -> Result<Value, CoreError>;
}

#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn send_batch(&self, req: BatchEventRequest) -> Result<(), CoreError>;
}

#[async_trait]
pub trait GatewayService: Send + Sync {
    async fn attribute_check(&self, req: AttributeCheckRequest) -> Result<bool, CoreError>;
    async fn get_user_data(&self, req: UserDataRequest) -> Result<GatewayUserData, CoreError>;
}
