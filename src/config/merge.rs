//! Structural deep merge of user overrides into the configuration.

use crate::config::{Config, MongoConfig, Secret};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard};

/// Partial configuration. Every present leaf replaces the matching default; absent leaves are kept.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigOverride {
    #[serde(default)]
    pub disable_swagger: Option<bool>,
    #[serde(default)]
    pub enable_policies: Option<bool>,
    #[serde(default)]
    pub policy_path: Option<String>,
    #[serde(default)]
    pub absolute_policy_path: Option<bool>,
    #[serde(default)]
    pub swagger_host: Option<String>,
    #[serde(default)]
    pub doc_expansion: Option<String>,
    #[serde(default, rename = "enableSwaggerUI")]
    pub enable_swagger_ui: Option<bool>,
    #[serde(default)]
    pub enable_swagger_https: Option<bool>,
    #[serde(default)]
    pub swagger_options: Option<Map<String, Value>>,
    #[serde(default)]
    pub app_title: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub loglevel: Option<String>,
    #[serde(default)]
    pub mongo: Option<MongoOverride>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MongoOverride {
    #[serde(default)]
    pub default_connection: Option<String>,
    #[serde(default, rename = "URI")]
    pub uri: Option<String>,
    #[serde(default)]
    pub options: Option<Map<String, Value>>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<Secret>,
}

impl ConfigOverride {
    /// Parse an override from JSON. Unknown keys are rejected.
    pub fn from_value(value: Value) -> Result<Self, crate::error::ConfigError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn is_empty(&self) -> bool {
        self == &ConfigOverride::default()
    }
}

fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
    if let Some(v) = value {
        *slot = v.clone();
    }
}

impl Config {
    pub fn merge(&mut self, o: &ConfigOverride) {
        set(&mut self.disable_swagger, &o.disable_swagger);
        set(&mut self.enable_policies, &o.enable_policies);
        set(&mut self.policy_path, &o.policy_path);
        set(&mut self.absolute_policy_path, &o.absolute_policy_path);
        set(&mut self.swagger_host, &o.swagger_host);
        set(&mut self.doc_expansion, &o.doc_expansion);
        set(&mut self.enable_swagger_ui, &o.enable_swagger_ui);
        set(&mut self.enable_swagger_https, &o.enable_swagger_https);
        if let Some(opts) = &o.swagger_options {
            merge_json(&mut self.swagger_options, opts);
        }
        set(&mut self.app_title, &o.app_title);
        set(&mut self.version, &o.version);
        set(&mut self.loglevel, &o.loglevel);
        if let Some(m) = &o.mongo {
            self.mongo.merge(m);
        }
    }
}

impl MongoConfig {
    pub fn merge(&mut self, o: &MongoOverride) {
        set(&mut self.default_connection, &o.default_connection);
        set(&mut self.uri, &o.uri);
        if let Some(opts) = &o.options {
            merge_json(&mut self.options, opts);
        }
        if o.user.is_some() {
            self.user = o.user.clone();
        }
        if o.password.is_some() {
            self.password = o.password.clone();
        }
    }
}

/// Recursive object merge: nested objects merge key by key, any other value replaces.
pub fn merge_json(target: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => merge_json(existing, incoming),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// The single process-wide configuration value. Clones share the same underlying config.
#[derive(Clone, Debug, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<Config>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        SharedConfig {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Merge in place so every holder of this handle observes the result.
    pub fn merge(&self, o: &ConfigOverride) {
        if o.is_empty() {
            return;
        }
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.merge(o);
    }

    pub fn set_app_root(&self, root: PathBuf) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.app_root = Some(root);
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Config> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> Config {
        self.read().clone()
    }

    pub fn ptr_eq(&self, other: &SharedConfig) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
