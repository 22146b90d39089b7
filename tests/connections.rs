//! Per-request connections and model binding.

use schema_api::{
    AppError, Config, ConnectionParams, Logger, RequestContext, Runtime, SchemaDefinition, SchemaMap,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Counts WARN events.
#[derive(Clone, Default)]
struct WarnCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn context(runtime: Arc<Runtime>) -> RequestContext {
    let mut schemas = SchemaMap::new();
    schemas.insert("A".into(), Arc::new(SchemaDefinition::new("A")));
    schemas.insert("B".into(), Arc::new(SchemaDefinition::new("B")));
    let logger: Logger = runtime.logger("request");
    RequestContext::new(runtime, Arc::new(schemas), logger)
}

#[tokio::test]
async fn duplicate_connect_reuses_and_warns_once() {
    let counter = WarnCounter::default();
    let subscriber = tracing_subscriber::registry().with(counter.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let ctx = context(Runtime::new(Config::default()));
    let first = ctx.connect(None).await.unwrap();
    let second = ctx.connect(Some(ConnectionParams::named("default"))).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.connection_names().await, vec!["default".to_string()]);
}

#[tokio::test]
async fn empty_context_has_no_default_connection() {
    let ctx = context(Runtime::new(Config::default()));
    let err = ctx.get_connection(None).await.unwrap_err();
    assert!(matches!(err, AppError::NoConnections));
    assert_eq!(err.to_string(), "No database connections found");
}

#[tokio::test]
async fn named_lookup_of_missing_connection() {
    let ctx = context(Runtime::new(Config::default()));
    ctx.connect(None).await.unwrap();
    let err = ctx.get_connection(Some("analytics")).await.unwrap_err();
    assert_eq!(err.to_string(), "Connection 'analytics' does not exist");
}

#[tokio::test]
async fn default_name_comes_from_config() {
    let mut config = Config::default();
    config.mongo.default_connection = "primary".into();
    let ctx = context(Runtime::new(config));
    let conn = ctx.connect(None).await.unwrap();
    assert_eq!(conn.name(), "primary");
    let found = ctx.get_connection(Some("primary")).await.unwrap();
    assert!(Arc::ptr_eq(&conn, &found));
}

#[tokio::test]
async fn model_is_bound_once_per_connection() {
    let ctx = context(Runtime::new(Config::default()));
    ctx.connect(None).await.unwrap();

    let first = ctx.model("A", None).await.unwrap().into_inner();
    let second = ctx.model("A", None).await.unwrap().into_inner();
    assert!(Arc::ptr_eq(&first, &second));

    ctx.connect(Some(ConnectionParams::named("other"))).await.unwrap();
    let elsewhere = ctx.model("A", Some("other")).await.unwrap().into_inner();
    assert!(!Arc::ptr_eq(&first, &elsewhere));
}

#[tokio::test]
async fn unknown_schema_is_an_error() {
    let ctx = context(Runtime::new(Config::default()));
    ctx.connect(None).await.unwrap();
    let err = ctx.model("Missing", None).await.err().unwrap();
    assert!(matches!(err, AppError::SchemaNotFound(name) if name == "Missing"));
    let conn = ctx.get_connection(None).await.unwrap();
    assert!(conn.bound_models().is_empty());
}

#[tokio::test]
async fn with_pivots_to_a_lazily_created_connection() {
    let ctx = context(Runtime::new(Config::default()));
    ctx.connect(None).await.unwrap();

    let a = ctx.model("A", None).await.unwrap();
    assert!(a.is_rebindable());
    let pivoted = a.with("secondary").await.unwrap();

    assert_eq!(pivoted.name(), "A");
    assert_eq!(pivoted.connection_name(), "secondary");
    assert_eq!(ctx.connection_names().await, vec!["default".to_string(), "secondary".to_string()]);
    assert!(!Arc::ptr_eq(a.model(), pivoted.model()));
}

#[tokio::test]
async fn connect_failures_propagate() {
    let ctx = context(Runtime::new(Config::default()));
    let params = ConnectionParams {
        uri: Some("redis://nowhere".into()),
        ..ConnectionParams::default()
    };
    let err = ctx.connect(Some(params)).await.unwrap_err();
    assert!(matches!(err, AppError::Driver(_)));
    assert!(ctx.connection_names().await.is_empty());
}
