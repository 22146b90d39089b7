use schema_api::config::{merge_json, Config, ConfigOverride, SharedConfig};
use schema_api::ConfigError;
use serde_json::json;

fn overrides() -> ConfigOverride {
    ConfigOverride::from_value(json!({
        "enablePolicies": true,
        "swaggerOptions": { "deepLinking": true, "nested": { "a": 1 } },
        "mongo": {
            "URI": "mem://shop",
            "options": { "maxPoolSize": 20, "tls": { "enabled": true } }
        }
    }))
    .unwrap()
}

#[test]
fn merging_twice_equals_merging_once() {
    let mut once = Config::default();
    once.merge(&overrides());
    let mut twice = once.clone();
    twice.merge(&overrides());
    assert_eq!(once, twice);
}

#[test]
fn absent_leaves_keep_defaults() {
    let mut config = Config::default();
    config.merge(&overrides());
    assert!(config.enable_policies);
    assert_eq!(config.mongo.uri, "mem://shop");
    assert_eq!(config.mongo.default_connection, "default");
    assert_eq!(config.policy_path, "policies");
    assert_eq!(config.loglevel, "info");
}

#[test]
fn nested_options_merge_key_by_key() {
    let mut config = Config::default();
    config.merge(&overrides());
    config.merge(
        &ConfigOverride::from_value(json!({ "mongo": { "options": { "tls": { "ca": "/etc/ca.pem" } } } })).unwrap(),
    );
    let options = &config.mongo.options;
    assert_eq!(options["maxPoolSize"], json!(20));
    assert_eq!(options["tls"], json!({ "enabled": true, "ca": "/etc/ca.pem" }));
}

#[test]
fn merge_json_replaces_non_object_leaves() {
    let mut target = json!({ "a": { "b": 1 }, "c": [1, 2] }).as_object().cloned().unwrap();
    let overlay = json!({ "a": 5, "c": [3] }).as_object().cloned().unwrap();
    merge_json(&mut target, &overlay);
    assert_eq!(serde_json::Value::Object(target), json!({ "a": 5, "c": [3] }));
}

#[test]
fn unknown_keys_are_rejected() {
    let err = ConfigOverride::from_value(json!({ "disableSwager": true })).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
    assert!(ConfigOverride::from_value(json!({ "mongo": { "uri": "x" } })).is_err());
}

#[test]
fn shared_merge_is_seen_by_every_holder() {
    let shared = SharedConfig::new(Config::default());
    let other = shared.clone();
    shared.merge(&overrides());
    assert!(other.read().enable_policies);
    assert!(shared.ptr_eq(&other));
}

#[tokio::test]
async fn loads_override_from_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema-api.json");
    std::fs::write(&path, r#"{ "appTitle": "From file", "mongo": { "defaultConnection": "main" } }"#).unwrap();

    let o = ConfigOverride::from_json_file(&path).await.unwrap();
    let mut config = Config::default();
    config.merge(&o);
    assert_eq!(config.app_title, "From file");
    assert_eq!(config.mongo.default_connection, "main");

    let missing = ConfigOverride::from_json_file(dir.path().join("nope.json")).await.unwrap_err();
    assert!(matches!(missing, ConfigError::Read { .. }));
}

#[test]
fn env_lookup_builds_override() {
    let vars = [
        ("SCHEMA_API_URI", "postgres://db/app"),
        ("SCHEMA_API_DISABLE_SWAGGER", "yes"),
        ("SCHEMA_API_LOGLEVEL", "debug"),
    ];
    let o = ConfigOverride::from_lookup(|k| vars.iter().find(|(n, _)| *n == k).map(|(_, v)| v.to_string())).unwrap();
    let mut config = Config::default();
    config.merge(&o);
    assert!(config.disable_swagger);
    assert_eq!(config.loglevel, "debug");
    assert_eq!(config.mongo.uri, "postgres://db/app");

    let bad = ConfigOverride::from_lookup(|k| (k == "SCHEMA_API_ENABLE_POLICIES").then(|| "maybe".to_string()));
    assert!(matches!(bad, Err(ConfigError::InvalidValue { key: "ENABLE_POLICIES", .. })));
}
