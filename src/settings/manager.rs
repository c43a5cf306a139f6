//! Per-sdk-key settings registry. Readers take a short read-lock, clone the
//! `Arc` (a refcount bump, not a deep copy) and release the lock before doing
//! any evaluation work, so `get_flag` never holds a lock across a decision.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::settings::model::Settings;

static SETTINGS: Lazy<RwLock<HashMap<String, Arc<Settings>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

pub fn get_settings(sdk_key: &str) -> Option<Arc<Settings>> {
    let map = SETTINGS.read().expect("SETTINGS RwLock poisoned");
    map.get(sdk_key).cloned()
}

pub fn set_settings(sdk_key: &str, settings: Settings) {
    let mut map = SETTINGS.write().expect("SETTINGS RwLock poisoned");
    map.insert(sdk_key.to_string(), Arc::new(settings));
}

pub fn has_settings(sdk_key: &str) -> bool {
    let map = SETTINGS.read().expect("SETTINGS RwLock poisoned");
    map.contains_key(sdk_key)
}
