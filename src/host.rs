//! The host server the plugin registers into: accumulated routes, request hooks, a validator slot and
//! the registered plugins.

use crate::docs::{build_openapi, docs_routes, DocsOptions, RouteDoc};
use crate::error::PluginError;
use crate::policy::PolicyEngine;
use crate::schema::SchemaDefinition;
use crate::validation::Validator;
use axum::Router;
use std::sync::Arc;

/// A plugin registered on a host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PluginMeta {
    pub name: String,
    pub version: String,
}

type RequestHook = Box<dyn FnOnce(Router) -> Router + Send>;

pub struct Host {
    router: Router,
    route_docs: Vec<RouteDoc>,
    doc_schemas: Vec<Arc<SchemaDefinition>>,
    validator: Option<Arc<dyn Validator>>,
    plugins: Vec<PluginMeta>,
    request_hooks: Vec<RequestHook>,
    docs: Option<DocsOptions>,
    policy: Option<Arc<PolicyEngine>>,
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

impl Host {
    pub fn new() -> Self {
        Host {
            router: Router::new(),
            route_docs: Vec::new(),
            doc_schemas: Vec::new(),
            validator: None,
            plugins: Vec::new(),
            request_hooks: Vec::new(),
            docs: None,
            policy: None,
        }
    }

    /// Host with a validator already installed; registration adopts it.
    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn validator(&self) -> Option<&Arc<dyn Validator>> {
        self.validator.as_ref()
    }

    pub fn set_validator(&mut self, validator: Arc<dyn Validator>) {
        self.validator = Some(validator);
    }

    /// Record a plugin. Fails if a plugin with the same name is already registered.
    pub fn register_plugin(&mut self, name: &str, version: &str) -> Result<(), PluginError> {
        if self.has_plugin(name) {
            return Err(PluginError::AlreadyRegistered(name.to_string()));
        }
        self.plugins.push(PluginMeta {
            name: name.to_string(),
            version: version.to_string(),
        });
        Ok(())
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.iter().any(|p| p.name == name)
    }

    pub fn plugins(&self) -> &[PluginMeta] {
        &self.plugins
    }

    pub fn merge(&mut self, router: Router) {
        let current = std::mem::take(&mut self.router);
        self.router = current.merge(router);
    }

    pub fn document(&mut self, route: RouteDoc) {
        self.route_docs.push(route);
    }

    pub fn document_schema(&mut self, schema: Arc<SchemaDefinition>) {
        self.doc_schemas.push(schema);
    }

    pub fn documented_routes(&self) -> &[RouteDoc] {
        &self.route_docs
    }

    /// Wrap every route with `hook` when the host is finished. Hooks run in registration order.
    pub fn on_request<F>(&mut self, hook: F)
    where
        F: FnOnce(Router) -> Router + Send + 'static,
    {
        self.request_hooks.push(Box::new(hook));
    }

    pub fn register_docs(&mut self, options: DocsOptions) {
        self.docs = Some(options);
    }

    pub fn docs(&self) -> Option<&DocsOptions> {
        self.docs.as_ref()
    }

    pub fn register_policy(&mut self, engine: Arc<PolicyEngine>) {
        self.policy = Some(engine);
    }

    pub fn policy(&self) -> Option<&Arc<PolicyEngine>> {
        self.policy.as_ref()
    }

    /// Final router: accumulated routes, documentation routes, then request hooks.
    pub fn into_router(self) -> Router {
        let mut router = self.router;
        if let Some(options) = &self.docs {
            let openapi = build_openapi(options, &self.route_docs, &self.doc_schemas);
            router = router.merge(docs_routes(options, openapi));
        }
        // The last layer applied runs first.
        for hook in self.request_hooks.into_iter().rev() {
            router = hook(router);
        }
        router
    }
}
