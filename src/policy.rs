//! Policy engine: JSON policy files plus ordered pre-hooks, enforced ahead of generated routes.

use crate::config::Config;
use crate::context::RequestContext;
use crate::error::{AppError, PluginError};
use crate::schema::Operation;
use async_trait::async_trait;
use axum::{
    extract::{MatchedPath, Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Policies applied when enforcement is disabled, as `(file name, JSON)`.
pub const DEFAULT_POLICIES: &[(&str, &str)] = &[("allow-all.json", include_str!("../policies/default/allow-all.json"))];
/// Policies shipped with the crate, loaded after the application's when enforcement is enabled.
pub const BUILTIN_POLICIES: &[(&str, &str)] = &[("baseline.json", include_str!("../policies/builtin/baseline.json"))];

/// Directory of application policies, or `None` when enforcement is disabled.
///
/// `policyPath` is used verbatim when `absolutePolicyPath` is set, otherwise relative to
/// [`Config::resolved_app_root`].
pub fn resolve_policy_dir(config: &Config) -> std::io::Result<Option<PathBuf>> {
    if !config.enable_policies {
        return Ok(None);
    }
    if config.absolute_policy_path {
        Ok(Some(PathBuf::from(&config.policy_path)))
    } else {
        Ok(Some(config.resolved_app_root()?.join(&config.policy_path)))
    }
}

/// Where a set of loaded policies came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicySource {
    Dir(PathBuf),
    /// Compiled into the crate, by set name.
    Embedded(&'static str),
}

/// The route a policy check runs for.
#[derive(Clone, Debug)]
pub struct RouteInfo {
    pub schema: String,
    pub operation: Operation,
    pub headers: HeaderMap,
}

/// Step run before route-level policies, in registration order. An error rejects the request.
#[async_trait]
pub trait PolicyHook: Send + Sync {
    async fn before(&self, ctx: &RequestContext, route: &RouteInfo) -> Result<(), AppError>;
}

fn all_schemas() -> Vec<String> {
    vec!["*".into()]
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Schema names this policy applies to. `*` matches every schema.
    #[serde(default = "all_schemas")]
    pub schemas: Vec<String>,
    #[serde(default)]
    pub deny: Vec<Operation>,
    /// Headers that must be present on matching requests.
    #[serde(default)]
    pub require_headers: Vec<String>,
}

impl Policy {
    fn applies_to(&self, schema: &str) -> bool {
        self.schemas.iter().any(|s| s == "*" || s == schema)
    }

    pub fn evaluate(&self, route: &RouteInfo) -> Result<(), AppError> {
        if !self.applies_to(&route.schema) {
            return Ok(());
        }
        if self.deny.contains(&route.operation) {
            return Err(AppError::Forbidden(format!(
                "policy '{}' denies {:?} on {}",
                self.name, route.operation, route.schema
            )));
        }
        if let Some(missing) = self.require_headers.iter().find(|h| !route.headers.contains_key(h.as_str())) {
            return Err(AppError::Forbidden(format!("policy '{}' requires header {}", self.name, missing)));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct PolicyEngine {
    sources: Vec<PolicySource>,
    policies: Vec<Policy>,
    pre_hooks: Vec<Arc<dyn PolicyHook>>,
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pre_hooks(mut self, hooks: Vec<Arc<dyn PolicyHook>>) -> Self {
        self.pre_hooks = hooks;
        self
    }

    /// Load every `*.json` policy in `dir`, in file-name order. A missing directory loads nothing.
    pub async fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize, PluginError> {
        let dir = dir.as_ref();
        let load_err = |message: String| PluginError::PolicyLoad {
            path: dir.to_path_buf(),
            message,
        };
        if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
            tracing::warn!(dir = %dir.display(), "policy directory not found; no policies loaded from it");
            return Ok(0);
        }

        let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| load_err(e.to_string()))?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| load_err(e.to_string()))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let loaded = paths.len();
        for path in paths {
            let raw = tokio::fs::read_to_string(&path).await.map_err(|e| PluginError::PolicyLoad {
                path: path.clone(),
                message: e.to_string(),
            })?;
            let policy: Policy = serde_json::from_str(&raw).map_err(|e| PluginError::PolicyLoad {
                path: path.clone(),
                message: e.to_string(),
            })?;
            self.policies.push(policy);
        }
        self.sources.push(PolicySource::Dir(dir.to_path_buf()));
        Ok(loaded)
    }

    /// Load a compiled-in policy set such as [`BUILTIN_POLICIES`].
    pub fn load_embedded(&mut self, set: &'static str, files: &[(&str, &str)]) -> Result<usize, PluginError> {
        for (file, raw) in files {
            let policy: Policy = serde_json::from_str(raw).map_err(|e| PluginError::PolicyLoad {
                path: PathBuf::from(set).join(file),
                message: e.to_string(),
            })?;
            self.policies.push(policy);
        }
        self.sources.push(PolicySource::Embedded(set));
        Ok(files.len())
    }

    pub fn sources(&self) -> &[PolicySource] {
        &self.sources
    }

    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    pub fn pre_hook_count(&self) -> usize {
        self.pre_hooks.len()
    }

    /// Run pre-hooks in order, then every policy. First rejection wins.
    pub async fn check(&self, ctx: &RequestContext, route: &RouteInfo) -> Result<(), AppError> {
        for hook in &self.pre_hooks {
            hook.before(ctx, route).await?;
        }
        for policy in &self.policies {
            policy.evaluate(route)?;
        }
        Ok(())
    }
}

/// Middleware state: the engine plus the schema whose routes it guards.
#[derive(Clone)]
pub struct PolicyGate {
    pub engine: Arc<PolicyEngine>,
    pub schema: String,
}

/// Operation a generated route serves, from its method and matched path.
pub fn operation_for(method: &Method, matched: &str) -> Option<Operation> {
    let item = matched.contains("/:id");
    match *method {
        Method::GET if item => Some(Operation::Read),
        Method::GET => Some(Operation::List),
        Method::POST => Some(Operation::Create),
        Method::PATCH | Method::PUT => Some(Operation::Update),
        Method::DELETE => Some(Operation::Delete),
        _ => None,
    }
}

pub async fn enforce(State(gate): State<PolicyGate>, req: Request, next: Next) -> Response {
    let matched = req
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let Some(operation) = operation_for(req.method(), &matched) else {
        return next.run(req).await;
    };
    let Some(ctx) = req.extensions().get::<Arc<RequestContext>>().cloned() else {
        return AppError::MissingContext.into_response();
    };

    let route = RouteInfo {
        schema: gate.schema.clone(),
        operation,
        headers: req.headers().clone(),
    };
    if let Err(e) = gate.engine.check(&ctx, &route).await {
        ctx.logger().debug(format!("rejected {:?} on {}: {}", operation, gate.schema, e));
        return e.into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn route(schema: &str, operation: Operation) -> RouteInfo {
        RouteInfo {
            schema: schema.into(),
            operation,
            headers: HeaderMap::new(),
        }
    }

    #[test]
    fn disabled_policies_have_no_dir() {
        let config = Config {
            policy_path: "/x/y".into(),
            absolute_policy_path: true,
            ..Config::default()
        };
        assert_eq!(resolve_policy_dir(&config).unwrap(), None);
    }

    #[test]
    fn absolute_policy_path_is_used_verbatim() {
        let config = Config {
            enable_policies: true,
            policy_path: "/x/y".into(),
            absolute_policy_path: true,
            app_root: Some(PathBuf::from("/app")),
            ..Config::default()
        };
        assert_eq!(resolve_policy_dir(&config).unwrap(), Some(PathBuf::from("/x/y")));
    }

    #[test]
    fn relative_policy_path_joins_app_root() {
        let config = Config {
            enable_policies: true,
            policy_path: "rules".into(),
            app_root: Some(PathBuf::from("/app")),
            ..Config::default()
        };
        assert_eq!(resolve_policy_dir(&config).unwrap(), Some(PathBuf::from("/app/rules")));
    }

    #[test]
    fn policy_denies_listed_operations_on_matching_schemas() {
        let policy: Policy = serde_json::from_value(json!({
            "name": "no-delete",
            "schemas": ["User"],
            "deny": ["delete"]
        }))
        .unwrap();
        assert!(matches!(policy.evaluate(&route("User", Operation::Delete)), Err(AppError::Forbidden(_))));
        assert!(policy.evaluate(&route("User", Operation::Read)).is_ok());
        assert!(policy.evaluate(&route("Post", Operation::Delete)).is_ok());
    }

    #[test]
    fn required_headers() {
        let policy: Policy = serde_json::from_value(json!({ "name": "auth", "requireHeaders": ["authorization"] })).unwrap();
        let mut r = route("Any", Operation::List);
        assert!(policy.evaluate(&r).is_err());
        r.headers.insert("authorization", "Bearer x".parse().unwrap());
        assert!(policy.evaluate(&r).is_ok());
    }

    #[test]
    fn operations_from_method_and_path() {
        assert_eq!(operation_for(&Method::GET, "/users"), Some(Operation::List));
        assert_eq!(operation_for(&Method::GET, "/users/:id"), Some(Operation::Read));
        assert_eq!(operation_for(&Method::GET, "/users/:id/:relation"), Some(Operation::Read));
        assert_eq!(operation_for(&Method::PATCH, "/users/:id"), Some(Operation::Update));
        assert_eq!(operation_for(&Method::OPTIONS, "/users"), None);
    }

    #[tokio::test]
    async fn loads_embedded_sets_and_skips_missing_dirs() {
        let mut engine = PolicyEngine::new();
        assert_eq!(engine.load_embedded("default", DEFAULT_POLICIES).unwrap(), 1);
        assert_eq!(engine.load_embedded("builtin", BUILTIN_POLICIES).unwrap(), 1);
        assert_eq!(engine.load_dir("/definitely/not/here").await.unwrap(), 0);
        assert_eq!(
            engine.sources(),
            &[PolicySource::Embedded("default"), PolicySource::Embedded("builtin")]
        );
        assert!(engine.policies().iter().any(|p| p.name == "allow-all"));
    }

    #[tokio::test]
    async fn invalid_policy_file_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        let err = PolicyEngine::new().load_dir(dir.path()).await.unwrap_err();
        assert!(matches!(err, PluginError::PolicyLoad { .. }));
    }
}
