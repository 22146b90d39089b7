//! Load configuration overrides from a JSON file or from `SCHEMA_API_*` environment variables.

use crate::config::{ConfigOverride, MongoOverride, Secret};
use crate::error::ConfigError;
use std::path::Path;

pub const ENV_PREFIX: &str = "SCHEMA_API_";

impl ConfigOverride {
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Read overrides from the process environment, loading a `.env` file first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build overrides from an arbitrary variable lookup (keys include [`ENV_PREFIX`]).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.is_empty());
        let flag = |key: &'static str| -> Result<Option<bool>, ConfigError> {
            match var(key) {
                None => Ok(None),
                Some(v) => parse_bool(&v)
                    .map(Some)
                    .ok_or(ConfigError::InvalidValue { key, value: v }),
            }
        };

        let mongo = MongoOverride {
            default_connection: var("DEFAULT_CONNECTION"),
            uri: var("URI"),
            options: None,
            user: var("DB_USER"),
            password: var("DB_PASSWORD").map(Secret::new),
        };

        Ok(ConfigOverride {
            disable_swagger: flag("DISABLE_SWAGGER")?,
            enable_policies: flag("ENABLE_POLICIES")?,
            policy_path: var("POLICY_PATH"),
            absolute_policy_path: flag("ABSOLUTE_POLICY_PATH")?,
            swagger_host: var("SWAGGER_HOST"),
            enable_swagger_https: flag("SWAGGER_HTTPS")?,
            app_title: var("APP_TITLE"),
            version: var("VERSION"),
            loglevel: var("LOGLEVEL"),
            mongo: if mongo == MongoOverride::default() { None } else { Some(mongo) },
            ..Default::default()
        })
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
