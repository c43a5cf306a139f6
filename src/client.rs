//! Runtime facade (6): wires settings, storage, segmentation, the event
//! queue and hooks together behind `init`/`get_flag`/`track_event`/
//! `set_attribute`/`update_settings`/`flush_events`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::Value;

use crate::context::{generate_uuid, EvaluationContext, UserContext};
use crate::decision::pipeline::get_flag as run_get_flag;
use crate::error::{CoreError, CoreResult};
use crate::events::payload::{build_msg_id, ImpressionEvent, QueuedEvent, TrackEvent};
use crate::events::queue::{BatchEventOptions, EventQueue};
use crate::hooks::{DecisionHook, NoopHook};
use crate::platform::PlatformData;
use crate::settings::model::{RawSettings, Settings, Variable};
use crate::storage::StorageConnector;
use crate::storage::StorageDecorator;
use crate::transport::http::{HttpEventTransport, HttpSettingsTransport};
use crate::transport::{EventTransport, GatewayService, SettingsTransport, UserDataRequest};

#[derive(Clone)]
pub enum VariableValue {
    String(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    Json(Value),
}

pub struct ThreadingOptions {
    pub enabled: bool,
    pub max_workers: usize,
}

impl Default for ThreadingOptions {
    fn default() -> Self {
        Self { enabled: true, max_workers: crate::constants::DEFAULT_MAX_WORKERS }
    }
}

pub struct ClientOptions {
    pub sdk_key: String,
    pub account_id: String,
    pub host: String,
    pub storage: Option<Arc<dyn StorageConnector>>,
    pub poll_interval: Duration,
    pub hook: Option<Arc<dyn DecisionHook>>,
    pub batch_event_data: BatchEventOptions,
    pub threading: ThreadingOptions,
    pub is_usage_stats_disabled: bool,
    pub settings_transport: Option<Arc<dyn SettingsTransport>>,
    pub event_transport: Option<Arc<dyn EventTransport>>,
    pub gateway_service: Option<Arc<dyn GatewayService>>,
    pub gateway_url: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            sdk_key: String::new(),
            account_id: String::new(),
            host: "https://dev.visualwebsiteoptimizer.com".to_string(),
            storage: None,
            poll_interval: Duration::from_secs(crate::constants::DEFAULT_POLL_INTERVAL_SECS),
            hook: None,
            batch_event_data: BatchEventOptions::default(),
            threading: ThreadingOptions::default(),
            is_usage_stats_disabled: false,
            settings_transport: None,
            event_transport: None,
            gateway_service: None,
            gateway_url: None,
        }
    }
}

pub struct Client {
    account_id: String,
    sdk_key: String,
    host: String,
    settings: std::sync::RwLock<Arc<Settings>>,
    storage: StorageDecorator,
    hook: Arc<dyn DecisionHook>,
    event_queue: EventQueue,
    platform_data: PlatformData,
    gateway_service: Option<Arc<dyn GatewayService>>,
    gateway_url: Option<String>,
}

impl Client {
    pub async fn init(opts: ClientOptions) -> CoreResult<Self> {
        if opts.sdk_key.is_empty() {
            return Err(CoreError::Configuration("sdk_key is required".into()));
        }
        if opts.account_id.is_empty() {
            return Err(CoreError::Configuration("account_id is required".into()));
        }
        if opts.poll_interval < Duration::from_secs(1) {
            return Err(CoreError::Configuration("poll_interval must be at least 1 second".into()));
        }

        // Re-initializing with an sdk_key that already has a cached snapshot
        // (e.g. a second `Client` built for the same project in-process)
        // reuses it instead of paying for another settings fetch.
        let settings = if let Some(cached) = crate::settings::get_settings(&opts.sdk_key) {
            cached
        } else {
            let settings_transport = opts
                .settings_transport
                .unwrap_or_else(|| Arc::new(HttpSettingsTransport::default()));
            let compiled = fetch_and_compile(
                settings_transport.as_ref(),
                &opts.host,
                &opts.sdk_key,
                &opts.account_id,
            )
            .await
            .unwrap_or_else(|err| {
                tracing::error!(%err, "failed to fetch settings, starting with an empty settings snapshot");
                crate::settings::compile(RawSettings {
                    version: 0,
                    account_id: opts.account_id.clone(),
                    sdk_key: opts.sdk_key.clone(),
                    collection_prefix: None,
                    campaigns: vec![],
                    features: vec![],
                    groups: HashMap::new(),
                    campaign_groups: HashMap::new(),
                })
            });
            Arc::new(compiled)
        };
        crate::settings::set_settings(&opts.sdk_key, (*settings).clone());

        let event_transport = opts.event_transport.unwrap_or_else(|| Arc::new(HttpEventTransport::default()));
        let event_queue = EventQueue::start(
            opts.batch_event_data,
            event_transport,
            opts.host.clone(),
            opts.account_id.clone(),
            opts.sdk_key.clone(),
        );

        Ok(Client {
            account_id: opts.account_id,
            sdk_key: opts.sdk_key,
            host: opts.host,
            settings: std::sync::RwLock::new(settings),
            storage: StorageDecorator::new(opts.storage),
            hook: opts.hook.unwrap_or_else(|| Arc::new(NoopHook)),
            event_queue,
            platform_data: PlatformData::generate(),
            gateway_service: opts.gateway_service,
            gateway_url: opts.gateway_url,
        })
    }

    fn snapshot(&self) -> Arc<Settings> {
        self.settings.read().expect("settings RwLock poisoned").clone()
    }

    /// Resolves UA/geo data through the gateway service when the feature's
    /// segments need it and the caller didn't prefill `context.vwo` (4.13).
    async fn resolve_gateway_data(&self, settings: &Settings, feature_key: &str, ctx: &mut EvaluationContext) {
        if ctx.vwo.is_some() {
            return;
        }
        let Some(feature) = settings.get_feature(feature_key) else { return };
        if !feature.is_gateway_service_required {
            return;
        }
        let (Some(gateway), Some(url)) = (&self.gateway_service, &self.gateway_url) else { return };
        match gateway
            .get_user_data(UserDataRequest {
                gateway_url: url.clone(),
                user_agent: ctx.user_agent.clone(),
                ip_address: ctx.ip_address.clone(),
            })
            .await
        {
            Ok(data) => {
                ctx.vwo = Some(crate::context::GatewayUserData { location: data.location, ua_info: data.ua_info });
            }
            Err(err) => {
                tracing::debug!(%err, feature_key, "gateway user-data lookup failed, segmentation will skip geo/UA predicates");
            }
        }
    }

    /// Synchronous entry point. The gateway round trip (if any) runs on the
    /// shared runtime via a blocking bridge; callers already inside an async
    /// task should prefer [`Client::get_flag_async`] instead (9, open questions).
    pub fn get_flag(&self, feature_key: &str, user_context: &UserContext) -> GetFlagResult {
        if user_context.id.is_empty() {
            tracing::warn!("get_flag called with an empty user id");
            return GetFlagResult::default();
        }

        let settings = self.snapshot();
        let mut ctx = EvaluationContext::from_user_context(user_context, &self.account_id);

        if self.gateway_service.is_some() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                tokio::task::block_in_place(|| {
                    handle.block_on(self.resolve_gateway_data(&settings, feature_key, &mut ctx));
                });
            }
        }

        self.decide(&settings, feature_key, &ctx)
    }

    /// Async entry point for callers already running on a `tokio` task;
    /// awaits the gateway round trip directly instead of bridging to a
    /// blocking call (9, open questions).
    pub async fn get_flag_async(&self, feature_key: &str, user_context: &UserContext) -> GetFlagResult {
        if user_context.id.is_empty() {
            tracing::warn!("get_flag_async called with an empty user id");
            return GetFlagResult::default();
        }

        let settings = self.snapshot();
        let mut ctx = EvaluationContext::from_user_context(user_context, &self.account_id);
        self.resolve_gateway_data(&settings, feature_key, &mut ctx).await;

        self.decide(&settings, feature_key, &ctx)
    }

    fn decide(&self, settings: &Settings, feature_key: &str, ctx: &EvaluationContext) -> GetFlagResult {
        let platform = &self.platform_data;
        let vis_id = ctx.vwo_uuid.clone();
        let session_id = ctx.session_id;
        let queue = &self.event_queue;

        let result = run_get_flag(settings, feature_key, ctx, &self.storage, self.hook.as_ref(), |campaign, variation, _feature| {
            let now_ms = now_millis();
            queue.enqueue(QueuedEvent::Impression(ImpressionEvent {
                msg_id: build_msg_id(&vis_id, now_ms),
                vis_id: vis_id.clone(),
                session_id,
                campaign_id: campaign.id,
                variation_id: variation.id,
                feature_key: feature_key.to_string(),
                sdk_name: platform.sdk_name.clone(),
                sdk_version: platform.sdk_version.clone(),
            }));
        });

        if let Some(feature) = settings.get_feature(feature_key) {
            if let Some(impact) = &feature.impact_campaign {
                let now_ms = now_millis();
                self.event_queue.enqueue(QueuedEvent::Impression(ImpressionEvent {
                    msg_id: build_msg_id(&vis_id, now_ms),
                    vis_id: vis_id.clone(),
                    session_id,
                    campaign_id: impact.campaign_id,
                    variation_id: if result.is_enabled { 2 } else { 1 },
                    feature_key: feature_key.to_string(),
                    sdk_name: self.platform_data.sdk_name.clone(),
                    sdk_version: self.platform_data.sdk_version.clone(),
                }));
            }
        }

        GetFlagResult { is_enabled: result.is_enabled, variables: result.variables }
    }

    pub fn track_event(
        &self,
        event_name: &str,
        user_context: &UserContext,
        event_properties: HashMap<String, Value>,
    ) -> HashMap<String, bool> {
        let mut result = HashMap::new();
        if user_context.id.is_empty() {
            result.insert(event_name.to_string(), false);
            return result;
        }
        let vis_id = generate_uuid(&user_context.id, &self.account_id);
        let session_id = user_context.session_id.unwrap_or_else(now_seconds);
        self.event_queue.enqueue(QueuedEvent::Track(TrackEvent {
            event_name: event_name.to_string(),
            vis_id,
            session_id,
            time_ms: now_millis(),
            properties: event_properties,
        }));
        result.insert(event_name.to_string(), true);
        result
    }

    pub fn set_attribute(&self, attributes: HashMap<String, Value>, user_context: &UserContext) {
        if user_context.id.is_empty() {
            tracing::warn!("set_attribute called with an empty user id");
            return;
        }
        let vis_id = generate_uuid(&user_context.id, &self.account_id);
        self.event_queue.enqueue(QueuedEvent::Attribute(crate::events::payload::AttributeEvent {
            vis_id,
            attributes,
        }));
    }

    pub async fn update_settings(&self, raw: Option<RawSettings>) -> CoreResult<()> {
        let raw = match raw {
            Some(raw) => raw,
            None => {
                let transport = HttpSettingsTransport::default();
                fetch_settings_raw(&transport, &self.host, &self.snapshot().raw.sdk_key, &self.account_id).await?
            }
        };
        let compiled = crate::settings::compile(raw);
        crate::settings::set_settings(&self.sdk_key, compiled.clone());
        let mut guard = self.settings.write().expect("settings RwLock poisoned");
        *guard = Arc::new(compiled);
        Ok(())
    }

    pub async fn flush_events(&self) -> bool {
        self.event_queue.flush().await
    }
}

pub use crate::decision::pipeline::GetFlagResult;

async fn fetch_settings_raw(
    transport: &dyn SettingsTransport,
    host: &str,
    sdk_key: &str,
    account_id: &str,
) -> CoreResult<RawSettings> {
    let body = transport
        .fetch_settings(crate::transport::SettingsRequest {
            sdk_key: sdk_key.to_string(),
            account_id: account_id.to_string(),
            host: host.to_string(),
            collection_prefix: None,
        })
        .await?;
    serde_json::from_value(body).map_err(|e| CoreError::Settings(e.to_string()))
}

async fn fetch_and_compile(
    transport: &dyn SettingsTransport,
    host: &str,
    sdk_key: &str,
    account_id: &str,
) -> CoreResult<Settings> {
    let raw = fetch_settings_raw(transport, host, sdk_key, account_id).await?;
    Ok(crate::settings::compile(raw))
}

fn now_millis() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

fn now_seconds() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

impl GetFlagResult {
    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    pub fn get_variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn get_variable(&self, key: &str, default: VariableValue) -> VariableValue {
        let Some(variable) = self.variables.iter().find(|v| v.key == key) else {
            return default;
        };
        match &variable.value {
            Value::String(s) => VariableValue::String(s.clone()),
            Value::Bool(b) => VariableValue::Boolean(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    VariableValue::Integer(i)
                } else {
                    VariableValue::Double(n.as_f64().unwrap_or(0.0))
                }
            }
            other => VariableValue::Json(other.clone()),
        }
    }
}
