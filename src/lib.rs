//! Schema API: compiles declared document schemas into a REST surface on an axum host.

pub mod config;
pub mod context;
pub mod docs;
pub mod driver;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod host;
pub mod logger;
pub mod model;
pub mod plugin;
pub mod policy;
pub mod response;
pub mod routes;
pub mod schema;
pub mod state;
pub mod validation;

pub use config::{Config, ConfigOverride, ConnectionParams, SharedConfig};
pub use context::{Connection, ModelRef, RequestContext};
pub use driver::{ConnectionHandle, Driver, MemoryDriver, PgDriver, UriDriver};
pub use error::{AppError, ConfigError, DriverError, PluginError, SchemaBuildError};
pub use extractors::Ctx;
pub use host::Host;
pub use logger::{init_tracing, Logger, LoggerFactory};
pub use model::Model;
pub use plugin::{Plugin, PluginOptions, Registration, Stage, PLUGIN_NAME, PLUGIN_VERSION};
pub use policy::{resolve_policy_dir, PolicyEngine, PolicyHook, PolicySource, RouteInfo};
pub use response::{created, ok, page, Envelope, PageMeta};
pub use routes::{CrudRoutes, CustomRoutes, RouteGenerator};
pub use schema::{
    DirSchemaBuilder, FieldDef, FieldType, Operation, Resolved, SchemaBuilder, SchemaDefinition, SchemaMap,
    SchemaRegistry, StaticSchemaBuilder, ValidationRule,
};
pub use state::{AppState, Runtime};
pub use validation::{RuleValidator, Validator};
