//! Registration orchestrator.
//!
//! [`Plugin::register`] runs a fixed sequence of stages against a [`Host`]:
//!
//! 1. validator setup (adopt the host's, or install [`RuleValidator`])
//! 2. configuration merge
//! 3. request augmentation (a [`RequestContext`] on every request)
//! 4. pre-registration hook capture
//! 5. schema resolution, degraded when the policy directory is missing
//! 6. documentation registration unless disabled
//! 7. policy engine registration
//! 8. route generation per schema, then the custom-route hook
//!
//! Every stage error aborts registration. Only stage 5 can continue degraded.

use crate::config::{Config, ConfigOverride};
use crate::context::RequestContext;
use crate::docs::DocsOptions;
use crate::error::PluginError;
use crate::host::Host;
use crate::logger::Logger;
use crate::policy::{resolve_policy_dir, PolicyEngine, PolicyHook, BUILTIN_POLICIES, DEFAULT_POLICIES};
use crate::routes::{common_routes, CrudRoutes, CustomRoutes, NoCustomRoutes, RouteGenerator};
use crate::schema::{Resolved, SchemaBuilder, SchemaMap, StaticSchemaBuilder};
use crate::state::{AppState, Runtime};
use crate::validation::{RuleValidator, Validator};
use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

pub const PLUGIN_NAME: &str = "schema-api";
pub const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DOCS_PLUGIN_NAME: &str = "schema-api-docs";
pub const POLICY_PLUGIN_NAME: &str = "schema-api-policies";

/// Caller-supplied registration options.
#[derive(Clone)]
pub struct PluginOptions {
    pub config: ConfigOverride,
    pub schema_builder: Arc<dyn SchemaBuilder>,
    pub route_generator: Arc<dyn RouteGenerator>,
    pub custom_routes: Arc<dyn CustomRoutes>,
    /// Run in order before route-level policies.
    pub pre_hooks: Vec<Arc<dyn PolicyHook>>,
    /// Root for a relative `policyPath`, written to `Config::app_root` by the config merge stage.
    /// The configured root (or the working directory) is kept when unset.
    pub app_root: Option<PathBuf>,
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self::new(Arc::new(StaticSchemaBuilder::default()))
    }
}

impl PluginOptions {
    pub fn new(schema_builder: Arc<dyn SchemaBuilder>) -> Self {
        PluginOptions {
            config: ConfigOverride::default(),
            schema_builder,
            route_generator: Arc::new(CrudRoutes::default()),
            custom_routes: Arc::new(NoCustomRoutes),
            pre_hooks: Vec::new(),
            app_root: None,
        }
    }

    pub fn config(mut self, config: ConfigOverride) -> Self {
        self.config = config;
        self
    }

    pub fn route_generator(mut self, generator: Arc<dyn RouteGenerator>) -> Self {
        self.route_generator = generator;
        self
    }

    pub fn custom_routes(mut self, custom: Arc<dyn CustomRoutes>) -> Self {
        self.custom_routes = custom;
        self
    }

    pub fn pre_hook(mut self, hook: Arc<dyn PolicyHook>) -> Self {
        self.pre_hooks.push(hook);
        self
    }

    pub fn app_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.app_root = Some(root.into());
        self
    }
}

/// Result of one pipeline stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Continue,
    /// Registration goes on with reduced output.
    Degraded,
}

/// What a successful registration produced.
#[derive(Clone, Debug)]
pub struct Registration {
    pub schemas: Arc<SchemaMap>,
    pub degraded: bool,
    pub docs: Option<DocsOptions>,
    /// Application policy directory; `None` when enforcement is disabled.
    pub policy_dir: Option<PathBuf>,
    pub policies_loaded: usize,
}

impl Registration {
    fn new() -> Self {
        Registration {
            schemas: Arc::new(SchemaMap::new()),
            degraded: false,
            docs: None,
            policy_dir: None,
            policies_loaded: 0,
        }
    }

    fn record(&mut self, stage: Stage) {
        if stage == Stage::Degraded {
            self.degraded = true;
        }
    }
}

pub struct Plugin {
    runtime: Arc<Runtime>,
    validator: RwLock<Option<Arc<dyn Validator>>>,
}

impl Plugin {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Plugin {
            runtime,
            validator: RwLock::new(None),
        }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Validator resolved by the last registration.
    pub fn validator(&self) -> Option<Arc<dyn Validator>> {
        self.validator.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn logger(&self) -> Logger {
        self.runtime.logger(PLUGIN_NAME)
    }

    /// Merge `config` and build the registry ahead of registration. A later `register` reuses it.
    pub async fn generate_models(&self, config: &ConfigOverride, builder: &dyn SchemaBuilder) -> Result<Resolved, PluginError> {
        self.runtime.config().merge(config);
        self.resolve(builder, &self.logger()).await
    }

    async fn resolve(&self, builder: &dyn SchemaBuilder, logger: &Logger) -> Result<Resolved, PluginError> {
        let config = self.runtime.config().snapshot();
        let resolved = self
            .runtime
            .registry()
            .resolve(builder, self.runtime.driver().as_ref(), logger, &config)
            .await?;
        Ok(resolved)
    }

    pub async fn register(&self, host: &mut Host, options: PluginOptions) -> Result<Registration, PluginError> {
        host.register_plugin(PLUGIN_NAME, PLUGIN_VERSION)?;
        let logger = self.logger();
        let mut out = Registration::new();

        let validator = self.setup_validator(host, &logger);
        out.record(self.merge_config(&options.config, options.app_root.as_ref()));
        out.record(self.augment_requests(host));
        let pre_hooks = options.pre_hooks.clone();
        let stage = self.resolve_schemas(&options, &logger, &mut out).await?;
        out.record(stage);

        let config = self.runtime.config().snapshot();
        let stage = self.register_docs(host, &config, &mut out)?;
        out.record(stage);
        let stage = self.register_policies(host, &config, pre_hooks, &mut out).await?;
        out.record(stage);

        let state = AppState {
            runtime: self.runtime.clone(),
            validator,
        };
        let schemas = out.schemas.clone();
        let stage = self.generate_routes(host, &state, &options, &config, &logger, &schemas).await?;
        out.record(stage);

        if out.degraded {
            logger.warn("registration finished in degraded mode: no schema routes were generated");
        } else {
            logger.info(format!("registered {} schemas", out.schemas.len()));
        }
        Ok(out)
    }

    fn setup_validator(&self, host: &mut Host, logger: &Logger) -> Arc<dyn Validator> {
        let validator = match host.validator() {
            Some(existing) => {
                logger.debug("adopting the host's validator");
                existing.clone()
            }
            None => {
                let installed: Arc<dyn Validator> = Arc::new(RuleValidator);
                host.set_validator(installed.clone());
                installed
            }
        };
        *self.validator.write().unwrap_or_else(|e| e.into_inner()) = Some(validator.clone());
        validator
    }

    fn merge_config(&self, config: &ConfigOverride, app_root: Option<&PathBuf>) -> Stage {
        self.runtime.config().merge(config);
        if let Some(root) = app_root {
            self.runtime.config().set_app_root(root.clone());
        }
        Stage::Continue
    }

    fn augment_requests(&self, host: &mut Host) -> Stage {
        let runtime = self.runtime.clone();
        host.on_request(move |router| router.layer(middleware::from_fn_with_state(runtime, attach_context)));
        Stage::Continue
    }

    async fn resolve_schemas(&self, options: &PluginOptions, logger: &Logger, out: &mut Registration) -> Result<Stage, PluginError> {
        let resolved = self.resolve(options.schema_builder.as_ref(), logger).await?;
        out.schemas = resolved.schemas();
        Ok(if resolved.is_degraded() { Stage::Degraded } else { Stage::Continue })
    }

    fn register_docs(&self, host: &mut Host, config: &Config, out: &mut Registration) -> Result<Stage, PluginError> {
        if config.disable_swagger {
            return Ok(Stage::Continue);
        }
        let options = DocsOptions::from_config(config)?;
        host.register_plugin(DOCS_PLUGIN_NAME, PLUGIN_VERSION)?;
        host.register_docs(options.clone());
        out.docs = Some(options);
        Ok(Stage::Continue)
    }

    async fn register_policies(
        &self,
        host: &mut Host,
        config: &Config,
        pre_hooks: Vec<Arc<dyn PolicyHook>>,
        out: &mut Registration,
    ) -> Result<Stage, PluginError> {
        let dir = resolve_policy_dir(config).map_err(PluginError::CurrentDir)?;

        let mut engine = PolicyEngine::new().with_pre_hooks(pre_hooks);
        let loaded = match &dir {
            Some(dir) => engine.load_dir(dir).await? + engine.load_embedded("builtin", BUILTIN_POLICIES)?,
            None => engine.load_embedded("default", DEFAULT_POLICIES)?,
        };
        host.register_plugin(POLICY_PLUGIN_NAME, PLUGIN_VERSION)?;
        host.register_policy(Arc::new(engine));

        let from = match &dir {
            Some(dir) => format!("{} and the builtin set", dir.display()),
            None => "the default set".to_string(),
        };
        self.logger().debug(format!("loaded {} policies from {}", loaded, from));
        out.policy_dir = dir;
        out.policies_loaded = loaded;
        Ok(Stage::Continue)
    }

    async fn generate_routes(
        &self,
        host: &mut Host,
        state: &AppState,
        options: &PluginOptions,
        config: &Config,
        logger: &Logger,
        schemas: &Arc<SchemaMap>,
    ) -> Result<Stage, PluginError> {
        host.merge(common_routes());
        for schema in schemas.values() {
            options.route_generator.generate(host, state, schema, schemas).await?;
        }
        let driver = self
            .runtime
            .active_driver()
            .unwrap_or_else(|| self.runtime.driver().clone());
        options
            .custom_routes
            .generate(host, &driver, &logger.bind("routes"), config)
            .await?;
        Ok(Stage::Continue)
    }
}

/// Attach a fresh [`RequestContext`] to every request.
async fn attach_context(State(runtime): State<Arc<Runtime>>, mut req: Request, next: Next) -> Response {
    let schemas = runtime
        .registry()
        .current()
        .await
        .unwrap_or_else(|| Arc::new(SchemaMap::new()));
    let logger = runtime.logger("request");
    req.extensions_mut()
        .insert(Arc::new(RequestContext::new(runtime, schemas, logger)));
    next.run(req).await
}
