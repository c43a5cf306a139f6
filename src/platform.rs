//! Runtime/platform identification attached to outgoing events and logs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformData {
    pub sdk_name: String,
    pub sdk_version: String,
    pub hostname: String,
}

impl PlatformData {
    pub fn generate() -> Self {
        PlatformData {
            sdk_name: crate::constants::SDK_NAME.to_string(),
            sdk_version: crate::constants::SDK_VERSION.to_string(),
            hostname: resolve_hostname(),
        }
    }
}

fn resolve_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod platform_tests {
    use super::*;

    #[test]
    fn generate_fills_sdk_identity() {
        let data = PlatformData::generate();
        assert_eq!(data.sdk_name, crate::constants::SDK_NAME);
        assert!(!data.sdk_version.is_empty());
    }
}
