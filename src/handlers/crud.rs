//! Generated CRUD handlers: list, create, read, update, delete, and relationship lookup.

use crate::config::ConnectionParams;
use crate::context::{ModelRef, RequestContext};
use crate::error::AppError;
use crate::extractors::{ConnectionName, Ctx};
use crate::model::ID_FIELD;
use crate::response::{created, ok, page};
use crate::schema::{FieldType, Operation, SchemaDefinition};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

const DEFAULT_LIMIT: u64 = 100;
const MAX_LIMIT: u64 = 1000;

/// Route state for one schema's endpoints.
#[derive(Clone)]
pub struct SchemaRoute {
    pub state: AppState,
    pub schema: Arc<SchemaDefinition>,
}

/// Bind the route's schema on the requested connection, opening it on first use in this request.
async fn bind<'a>(ctx: &'a RequestContext, schema: &str, connection: &ConnectionName) -> Result<ModelRef<'a>, AppError> {
    let name = connection.0.as_deref();
    match ctx.get_connection(name).await {
        Ok(_) => {}
        Err(AppError::NoConnections) => {
            ctx.connect(None).await?;
        }
        Err(AppError::ConnectionNotFound(n)) => {
            ctx.connect(Some(ConnectionParams::named(n))).await?;
        }
        Err(e) => return Err(e),
    }
    ctx.model(schema, name).await
}

fn ensure_allowed(schema: &SchemaDefinition, op: Operation) -> Result<(), AppError> {
    if schema.allows(op) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("{:?} not allowed on {}", op, schema.name).to_lowercase()))
    }
}

fn body_to_map(value: Value) -> Result<Map<String, Value>, AppError> {
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

/// Coerce a query-string value to the declared field type so equality filters match stored JSON.
fn query_value_for_field(schema: &SchemaDefinition, field: &str, s: &str) -> Value {
    let ty = schema.fields.get(field).map(|f| f.type_);
    match ty {
        Some(FieldType::Integer) => {
            if let Ok(n) = s.parse::<i64>() {
                return Value::Number(n.into());
            }
        }
        Some(FieldType::Number) => {
            if let Some(n) = s.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
                return Value::Number(n);
            }
        }
        Some(FieldType::Boolean) => {
            if s.eq_ignore_ascii_case("true") {
                return Value::Bool(true);
            }
            if s.eq_ignore_ascii_case("false") {
                return Value::Bool(false);
            }
        }
        _ => {}
    }
    Value::String(s.to_string())
}

pub async fn list(
    State(route): State<SchemaRoute>,
    Ctx(ctx): Ctx,
    connection: ConnectionName,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    ensure_allowed(&route.schema, Operation::List)?;

    let mut limit = DEFAULT_LIMIT;
    let mut offset = 0;
    let mut filter = Map::new();
    for (k, v) in params {
        match k.as_str() {
            "limit" => limit = v.parse().map_err(|_| AppError::BadRequest("invalid limit".into()))?,
            "offset" => offset = v.parse().map_err(|_| AppError::BadRequest("invalid offset".into()))?,
            _ => {
                if k == ID_FIELD || route.schema.fields.contains_key(&k) {
                    let val = query_value_for_field(&route.schema, &k, &v);
                    filter.insert(k, val);
                }
            }
        }
    }
    let limit = limit.min(MAX_LIMIT);

    let model = bind(&ctx, &route.schema.name, &connection).await?;
    let total = model.count(&filter).await?;
    let rows = model.find(&filter, offset, limit).await?;
    Ok(page(rows, total, offset, limit))
}

pub async fn create(
    State(route): State<SchemaRoute>,
    Ctx(ctx): Ctx,
    connection: ConnectionName,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    ensure_allowed(&route.schema, Operation::Create)?;
    let body = body_to_map(body)?;
    route.state.validator.validate(&route.schema, &body, false)?;
    let model = bind(&ctx, &route.schema.name, &connection).await?;
    let row = model.create(body).await?;
    Ok(created(row))
}

pub async fn read(
    State(route): State<SchemaRoute>,
    Ctx(ctx): Ctx,
    connection: ConnectionName,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    ensure_allowed(&route.schema, Operation::Read)?;
    let model = bind(&ctx, &route.schema.name, &connection).await?;
    let row = model.find_by_id(&id).await?.ok_or_else(|| AppError::NotFound(id))?;
    Ok(ok(row))
}

pub async fn update(
    State(route): State<SchemaRoute>,
    Ctx(ctx): Ctx,
    connection: ConnectionName,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    ensure_allowed(&route.schema, Operation::Update)?;
    let body = body_to_map(body)?;
    route.state.validator.validate(&route.schema, &body, true)?;
    let model = bind(&ctx, &route.schema.name, &connection).await?;
    let row = model.update(&id, body).await?.ok_or_else(|| AppError::NotFound(id))?;
    Ok(ok(row))
}

pub async fn delete(
    State(route): State<SchemaRoute>,
    Ctx(ctx): Ctx,
    connection: ConnectionName,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    ensure_allowed(&route.schema, Operation::Delete)?;
    let model = bind(&ctx, &route.schema.name, &connection).await?;
    if !model.delete(&id).await? {
        return Err(AppError::NotFound(id));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /{path}/:id/:relation: documents referenced by a relationship field.
pub async fn related(
    State(route): State<SchemaRoute>,
    Ctx(ctx): Ctx,
    connection: ConnectionName,
    Path((id, relation)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    ensure_allowed(&route.schema, Operation::Read)?;
    let target = route
        .schema
        .fields
        .get(&relation)
        .and_then(|f| f.reference.clone())
        .ok_or_else(|| AppError::NotFound(format!("{}/{}", route.schema.path_segment(), relation)))?;

    let model = bind(&ctx, &route.schema.name, &connection).await?;
    let doc = model.find_by_id(&id).await?.ok_or_else(|| AppError::NotFound(id))?;
    let related = ctx.model(&target, connection.0.as_deref()).await?;
    let data = model.find_related(&doc, &relation, &related).await?;
    Ok(ok(data))
}
