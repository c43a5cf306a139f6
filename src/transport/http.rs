//! `reqwest`-backed default implementations of the transport traits. These
//! are what `Client::init` wires up unless the caller supplies a fake for
//! testing.

use async_trait::async_trait;
use serde_json::Value;

use crate::constants::{SDK_NAME, SDK_VERSION};
use crate::error::CoreError;

use super::{
    AttributeCheckRequest, BatchEventRequest, EventTransport, GatewayService, GatewayUserData,
    SettingsRequest, SettingsTransport, UserDataRequest,
};

pub struct HttpSettingsTransport {
    client: reqwest::Client,
}

impl Default for HttpSettingsTransport {
    fn default() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

#[async_trait]
impl SettingsTransport for HttpSettingsTransport {
    async fn fetch_settings(&self, req: SettingsRequest) -> Result<Value, CoreError> {
        let prefix = req.collection_prefix.unwrap_or_default();
        let url = format!(
            "{}{}/server-side/v2-settings?i={}&a={}&platform=server&api-version=1&sn={}&sv={}",
            req.host, prefix, req.sdk_key, req.account_id, SDK_NAME, SDK_VERSION
        );
        let response = self.client.get(url).send().await?;
        let body = response.json::<Value>().await?;
        Ok(body)
    }
}

pub struct HttpEventTransport {
    client: reqwest::Client,
}

impl Default for HttpEventTransport {
    fn default() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

#[async_trait]
impl EventTransport for HttpEventTransport {
    async fn send_batch(&self, req: BatchEventRequest) -> Result<(), CoreError> {
        let url = format!("{}/events/t/batch?a={}&env={}", req.host, req.account_id, req.sdk_key);
        self.client
            .post(url)
            .header("Authorization", req.sdk_key.clone())
            .json(&serde_json::json!({ "ev": req.events }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

pub struct HttpGatewayService {
    client: reqwest::Client,
}

impl Default for HttpGatewayService {
    fn default() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

#[async_trait]
impl GatewayService for HttpGatewayService {
    async fn attribute_check(&self, req: AttributeCheckRequest) -> Result<bool, CoreError> {
        let url = format!(
            "{}/attribute/check?attribute={}&listId={}&accountId={}&sdkKey={}",
            req.gateway_url, req.attribute, req.list_id, req.account_id, req.sdk_key
        );
        let text = self.client.get(url).send().await?.text().await?;
        Ok(text.trim() != "false" && !text.is_empty())
    }

    async fn get_user_data(&self, req: UserDataRequest) -> Result<GatewayUserData, CoreError> {
        let mut url = format!("{}/get-user-data?", req.gateway_url);
        if let Some(ua) = &req.user_agent {
            url.push_str(&format!("userAgent={ua}&"));
        }
        if let Some(ip) = &req.ip_address {
            url.push_str(&format!("ipAddress={ip}"));
        }
        let body = self.client.get(url).send().await?.json::<Value>().await?;
        let location = body
            .get("location")
            .and_then(|v| v.as_object())
            .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string())).collect())
            .unwrap_or_default();
        let ua_info = body
            .get("userAgent")
            .and_then(|v| v.as_object())
            .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string())).collect())
            .unwrap_or_default();
        Ok(GatewayUserData { location, ua_info })
    }
}
