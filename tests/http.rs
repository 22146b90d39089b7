//! End-to-end: register two schemas over `mem://test` and drive the generated routes.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use http_body_util::BodyExt;
use schema_api::{
    AppError, Config, ConfigOverride, Ctx, Driver, FieldDef, FieldType, Host, Logger, Plugin, PluginError,
    PluginOptions, Registration, Runtime, SchemaDefinition, StaticSchemaBuilder,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn schemas() -> Vec<SchemaDefinition> {
    vec![
        SchemaDefinition::new("A")
            .field("title", FieldDef::new(FieldType::String).required())
            .field("rank", FieldDef::new(FieldType::Integer))
            .field("secret", FieldDef::new(FieldType::String))
            .hide("secret"),
        SchemaDefinition::new("B").field("a", FieldDef::new(FieldType::Id).reference("A")),
    ]
}

/// Custom route that pivots model A from the default connection to `secondary`.
async fn pivot(Ctx(ctx): Ctx) -> Result<Json<Value>, AppError> {
    ctx.connect(None).await?;
    let a = ctx.model("A", None).await?;
    let b = a.with("secondary").await?;
    Ok(Json(json!({
        "from": a.connection_name(),
        "to": b.connection_name(),
        "connections": ctx.connection_names().await,
    })))
}

fn custom(host: &mut Host, _driver: &Arc<dyn Driver>, _logger: &Logger, _config: &Config) -> Result<(), PluginError> {
    host.merge(Router::new().route("/pivot", get(pivot)));
    Ok(())
}

async fn app() -> (Router, Registration) {
    let plugin = Plugin::new(Runtime::new(Config::default()));
    let mut host = Host::new();
    let options = PluginOptions::new(Arc::new(StaticSchemaBuilder::new(schemas())))
        .config(ConfigOverride::from_value(json!({ "mongo": { "URI": "mem://test" } })).unwrap())
        .custom_routes(Arc::new(custom));
    let reg = plugin.register(&mut host, options).await.unwrap();
    (host.into_router(), reg)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn every_schema_gets_routes() {
    let (app, reg) = app().await;
    assert_eq!(reg.schemas.keys().cloned().collect::<Vec<_>>(), vec!["A", "B"]);
    for path in ["/as", "/bs"] {
        let (status, body) = call(&app, "GET", path, None).await;
        assert_eq!(status, StatusCode::OK, "{}", path);
        assert_eq!(body["meta"]["total"], json!(0));
    }
}

#[tokio::test]
async fn crud_round_trip() {
    let (app, _) = app().await;

    let (status, created) = call(&app, "POST", "/as", Some(json!({ "title": "first", "rank": 2, "secret": "s" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["data"]["_id"].as_str().unwrap().to_string();
    assert!(created["data"].get("secret").is_none());

    let (status, read) = call(&app, "GET", &format!("/as/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["data"]["title"], json!("first"));

    let (status, updated) = call(&app, "PATCH", &format!("/as/{}", id), Some(json!({ "rank": 5 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["rank"], json!(5));
    assert_eq!(updated["data"]["title"], json!("first"));

    let (_, listed) = call(&app, "GET", "/as?rank=5", None).await;
    assert_eq!(listed["meta"]["count"], json!(1));

    let (status, _) = call(&app, "DELETE", &format!("/as/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = call(&app, "GET", &format!("/as/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("not_found"));
}

#[tokio::test]
async fn invalid_bodies_are_rejected() {
    let (app, _) = app().await;
    let (status, body) = call(&app, "POST", "/as", Some(json!({ "rank": 1 }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["message"], json!("validation: title is required"));

    let (status, _) = call(&app, "POST", "/as", Some(json!(["not", "an", "object"]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn relationship_route_follows_reference() {
    let (app, _) = app().await;
    let (_, a) = call(&app, "POST", "/as", Some(json!({ "_id": "a1", "title": "target" }))).await;
    assert_eq!(a["data"]["_id"], json!("a1"));
    let (_, b) = call(&app, "POST", "/bs", Some(json!({ "a": "a1" }))).await;
    let b_id = b["data"]["_id"].as_str().unwrap().to_string();

    let (status, related) = call(&app, "GET", &format!("/bs/{}/a", b_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(related["data"]["title"], json!("target"));

    let (status, _) = call(&app, "GET", &format!("/bs/{}/nope", b_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn named_connection_header_opens_that_connection() {
    let (app, _) = app().await;
    call(&app, "POST", "/as", Some(json!({ "title": "shared" }))).await;

    let request = Request::builder()
        .uri("/as")
        .header("X-Connection", "reports")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    // Same URI, so the named connection sees the same database.
    assert_eq!(body["meta"]["total"], json!(1));
}

#[tokio::test]
async fn custom_route_pivots_model_to_secondary_connection() {
    let (app, _) = app().await;
    let (status, body) = call(&app, "GET", "/pivot", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["from"], json!("default"));
    assert_eq!(body["to"], json!("secondary"));
    assert_eq!(body["connections"], json!(["default", "secondary"]));
}

#[tokio::test]
async fn documentation_and_common_routes() {
    let (app, _) = app().await;
    let (status, doc) = call(&app, "GET", "/documentation/json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/as"]["post"].is_object());
    assert!(doc["paths"]["/bs/{id}"]["delete"].is_object());
    assert!(doc["components"]["schemas"]["A"].is_object());

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/documentation").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, health) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], json!("ok"));
    let (_, version) = call(&app, "GET", "/version", None).await;
    assert_eq!(version["name"], json!("schema-api"));
}

#[tokio::test]
async fn policies_guard_generated_routes() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join("policies")).unwrap();
    std::fs::write(
        root.path().join("policies/a-readonly.json"),
        r#"{ "name": "a-readonly", "schemas": ["A"], "deny": ["create", "update", "delete"] }"#,
    )
    .unwrap();

    let plugin = Plugin::new(Runtime::new(Config::default()));
    let mut host = Host::new();
    let options = PluginOptions::new(Arc::new(StaticSchemaBuilder::new(schemas())))
        .config(ConfigOverride::from_value(json!({ "enablePolicies": true, "mongo": { "URI": "mem://policies" } })).unwrap())
        .app_root(root.path());
    plugin.register(&mut host, options).await.unwrap();
    let app = host.into_router();

    let (status, body) = call(&app, "POST", "/as", Some(json!({ "title": "x" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], json!("forbidden"));
    let (status, _) = call(&app, "GET", "/as", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, "POST", "/bs", Some(json!({}))).await;
    assert_eq!(status, StatusCode::CREATED);
}
