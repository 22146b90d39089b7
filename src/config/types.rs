//! Typed plugin configuration. JSON keys match the documented option names (`disableSwagger`, `mongo.URI`, ...).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_CONNECTION: &str = "default";
pub const DEFAULT_URI: &str = "mem://default";
pub const DEFAULT_POLICY_PATH: &str = "policies";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub disable_swagger: bool,
    pub enable_policies: bool,
    /// Policy directory; relative to the application root unless `absolute_policy_path`.
    pub policy_path: String,
    pub absolute_policy_path: bool,
    pub swagger_host: String,
    pub doc_expansion: String,
    #[serde(rename = "enableSwaggerUI")]
    pub enable_swagger_ui: bool,
    pub enable_swagger_https: bool,
    /// Explicit documentation options; override computed defaults except title and version.
    pub swagger_options: Map<String, Value>,
    pub app_title: String,
    pub version: String,
    pub loglevel: String,
    pub mongo: MongoConfig,
    /// Application root for relative paths. Set in code, never read from overrides.
    #[serde(skip)]
    pub app_root: Option<PathBuf>,
}

impl Config {
    /// `app_root`, or the working directory when unset.
    pub fn resolved_app_root(&self) -> std::io::Result<PathBuf> {
        match &self.app_root {
            Some(root) => Ok(root.clone()),
            None => std::env::current_dir(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            disable_swagger: false,
            enable_policies: false,
            policy_path: DEFAULT_POLICY_PATH.into(),
            absolute_policy_path: false,
            swagger_host: "localhost:3000".into(),
            doc_expansion: "list".into(),
            enable_swagger_ui: true,
            enable_swagger_https: false,
            swagger_options: Map::new(),
            app_title: "schema-api".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            loglevel: "info".into(),
            mongo: MongoConfig::default(),
            app_root: None,
        }
    }
}

/// Database connection defaults. `uri` and `options` seed every connection opened without overrides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MongoConfig {
    pub default_connection: String,
    #[serde(rename = "URI")]
    pub uri: String,
    pub options: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<Secret>,
}

impl Default for MongoConfig {
    fn default() -> Self {
        MongoConfig {
            default_connection: DEFAULT_CONNECTION.into(),
            uri: DEFAULT_URI.into(),
            options: Map::new(),
            user: None,
            password: None,
        }
    }
}

/// Credential string that never prints its value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Caller-supplied connection override for `RequestContext::connect`. Unset fields fall back to `MongoConfig`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConnectionParams {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "URI")]
    pub uri: Option<String>,
    #[serde(default)]
    pub options: Option<Map<String, Value>>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<Secret>,
}

impl ConnectionParams {
    pub fn named(name: impl Into<String>) -> Self {
        ConnectionParams {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Layer this override on top of the configured defaults.
    pub fn resolve(&self, defaults: &MongoConfig) -> ResolvedConnection {
        let mut options = defaults.options.clone();
        if let Some(extra) = &self.options {
            crate::config::merge_json(&mut options, extra);
        }
        ResolvedConnection {
            name: self
                .name
                .clone()
                .unwrap_or_else(|| defaults.default_connection.clone()),
            uri: self.uri.clone().unwrap_or_else(|| defaults.uri.clone()),
            options,
            user: self.user.clone().or_else(|| defaults.user.clone()),
            password: self.password.clone().or_else(|| defaults.password.clone()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedConnection {
    pub name: String,
    pub uri: String,
    pub options: Map<String, Value>,
    pub user: Option<String>,
    pub password: Option<Secret>,
}
