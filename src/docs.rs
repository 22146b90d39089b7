//! OpenAPI document for the generated surface, served at `/documentation/json` (and a UI page at `/documentation`).

use crate::config::{merge_json, Config};
use crate::error::ConfigError;
use crate::schema::{FieldType, SchemaDefinition};
use axum::{
    http::Method,
    response::Html,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::openapi::{
    path::{HttpMethod, OperationBuilder, ParameterBuilder, ParameterIn, PathItemBuilder},
    request_body::RequestBodyBuilder,
    ArrayBuilder, ComponentsBuilder, ContentBuilder, InfoBuilder, ObjectBuilder, OpenApi, OpenApiBuilder,
    PathsBuilder, Ref, RefOr, Required, ResponseBuilder, Schema, Server, Type,
};

pub const DOCS_PATH: &str = "/documentation";
pub const DOCS_JSON_PATH: &str = "/documentation/json";

/// Options handed to the documentation generator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocsOptions {
    pub title: String,
    pub version: String,
    pub host: String,
    pub schemes: Vec<String>,
    pub doc_expansion: String,
    #[serde(rename = "exposeUI")]
    pub expose_ui: bool,
    /// Remaining user-supplied keys, passed through to the UI page.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DocsOptions {
    /// Computed defaults, overridden by `swaggerOptions`. Title and version always come from config.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let scheme = if config.enable_swagger_https { "https" } else { "http" };
        let mut options = json!({
            "host": config.swagger_host,
            "schemes": [scheme],
            "docExpansion": config.doc_expansion,
            "exposeUI": config.enable_swagger_ui,
        })
        .as_object()
        .cloned()
        .unwrap_or_default();
        merge_json(&mut options, &config.swagger_options);
        options.insert("title".into(), Value::String(config.app_title.clone()));
        options.insert("version".into(), Value::String(config.version.clone()));
        Ok(serde_json::from_value(Value::Object(options))?)
    }
}

/// One documented route.
#[derive(Clone, Debug)]
pub struct RouteDoc {
    pub method: Method,
    /// Path in router form (`/users/:id`).
    pub path: String,
    pub summary: String,
    pub tag: Option<String>,
    /// Component schema used for the request body (create / update) and response data.
    pub schema: Option<String>,
    pub request_body: bool,
}

impl RouteDoc {
    pub fn new(method: Method, path: impl Into<String>, summary: impl Into<String>) -> Self {
        RouteDoc {
            method,
            path: path.into(),
            summary: summary.into(),
            tag: None,
            schema: None,
            request_body: false,
        }
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn schema(mut self, name: impl Into<String>) -> Self {
        self.schema = Some(name.into());
        self
    }

    pub fn with_body(mut self) -> Self {
        self.request_body = true;
        self
    }
}

/// `/users/:id` -> `/users/{id}`
fn openapi_path(path: &str) -> String {
    path.split('/')
        .map(|seg| match seg.strip_prefix(':') {
            Some(name) => format!("{{{}}}", name),
            None => seg.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn http_method(method: &Method) -> Option<HttpMethod> {
    match *method {
        Method::GET => Some(HttpMethod::Get),
        Method::POST => Some(HttpMethod::Post),
        Method::PUT => Some(HttpMethod::Put),
        Method::PATCH => Some(HttpMethod::Patch),
        Method::DELETE => Some(HttpMethod::Delete),
        _ => None,
    }
}

fn field_schema(ty: FieldType) -> RefOr<Schema> {
    let t = match ty {
        FieldType::String | FieldType::Date | FieldType::Id => Type::String,
        FieldType::Number => Type::Number,
        FieldType::Integer => Type::Integer,
        FieldType::Boolean => Type::Boolean,
        FieldType::Array => return ArrayBuilder::new().build().into(),
        FieldType::Object | FieldType::Mixed => Type::Object,
    };
    ObjectBuilder::new().schema_type(t).build().into()
}

fn component(schema: &SchemaDefinition) -> RefOr<Schema> {
    let mut object = ObjectBuilder::new().schema_type(Type::Object);
    for (name, def) in &schema.fields {
        if schema.hidden.contains(name) {
            continue;
        }
        object = object.property(name, field_schema(def.type_));
        if def.required {
            object = object.required(name);
        }
    }
    object.build().into()
}

/// Build the OpenAPI document for the documented routes and schemas.
pub fn build_openapi(options: &DocsOptions, routes: &[RouteDoc], schemas: &[Arc<SchemaDefinition>]) -> OpenApi {
    let mut items: BTreeMap<String, PathItemBuilder> = BTreeMap::new();
    for route in routes {
        let Some(method) = http_method(&route.method) else {
            continue;
        };
        let path = openapi_path(&route.path);
        let mut op = OperationBuilder::new()
            .summary(Some(route.summary.clone()))
            .response("200", ResponseBuilder::new().description("Success").build());
        if let Some(tag) = &route.tag {
            op = op.tag(tag.clone());
        }
        for seg in route.path.split('/').filter_map(|s| s.strip_prefix(':')) {
            op = op.parameter(
                ParameterBuilder::new()
                    .name(seg)
                    .parameter_in(ParameterIn::Path)
                    .required(Required::True)
                    .schema(Some(ObjectBuilder::new().schema_type(Type::String).build())),
            );
        }
        if let (true, Some(schema)) = (route.request_body, &route.schema) {
            op = op.request_body(Some(
                RequestBodyBuilder::new()
                    .content(
                        "application/json",
                        ContentBuilder::new().schema(Some(Ref::from_schema_name(schema.clone()))).build(),
                    )
                    .required(Some(Required::True))
                    .build(),
            ));
        }
        let item = items.remove(&path).unwrap_or_else(PathItemBuilder::new);
        items.insert(path, item.operation(method, op.build()));
    }
    let paths = items
        .into_iter()
        .fold(PathsBuilder::new(), |paths, (path, item)| paths.path(path, item.build()));

    let mut components = ComponentsBuilder::new();
    for schema in schemas {
        components = components.schema(schema.name.clone(), component(schema));
    }

    let servers = options
        .schemes
        .iter()
        .map(|scheme| Server::new(format!("{}://{}", scheme, options.host)))
        .collect::<Vec<_>>();

    OpenApiBuilder::new()
        .info(InfoBuilder::new().title(options.title.clone()).version(options.version.clone()).build())
        .servers(Some(servers))
        .paths(paths.build())
        .components(Some(components.build()))
        .build()
}

fn ui_page(options: &DocsOptions) -> String {
    let extra = serde_json::to_string(&options.extra).unwrap_or_else(|_| "{}".into());
    format!(
        r##"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
</head>
<body>
<div id="swagger-ui"></div>
<script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
<script>
window.ui = SwaggerUIBundle(Object.assign({{ url: "{json}", dom_id: "#swagger-ui", docExpansion: "{expansion}" }}, {extra}));
</script>
</body>
</html>"##,
        title = options.title,
        json = DOCS_JSON_PATH,
        expansion = options.doc_expansion,
        extra = extra,
    )
}

/// Routes serving the document, plus the UI page when `exposeUI` is set.
pub fn docs_routes(options: &DocsOptions, openapi: OpenApi) -> Router {
    let doc = Arc::new(openapi);
    let mut router = Router::new().route(
        DOCS_JSON_PATH,
        get(move || {
            let doc = doc.clone();
            async move { Json(doc.as_ref().clone()) }
        }),
    );
    if options.expose_ui {
        let page = ui_page(options);
        router = router.route(DOCS_PATH, get(move || async move { Html(page) }));
    }
    router
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOverride;
    use crate::schema::FieldDef;

    #[test]
    fn title_and_version_are_forced_from_config() {
        let mut config = Config::default();
        config.merge(
            &ConfigOverride::from_value(json!({
                "appTitle": "Shop",
                "version": "2.1.0",
                "enableSwaggerHttps": true,
                "swaggerOptions": { "title": "ignored", "version": "0", "host": "api.shop.test", "deepLinking": true }
            }))
            .unwrap(),
        );
        let options = DocsOptions::from_config(&config).unwrap();
        assert_eq!(options.title, "Shop");
        assert_eq!(options.version, "2.1.0");
        assert_eq!(options.host, "api.shop.test");
        assert_eq!(options.schemes, vec!["https".to_string()]);
        assert_eq!(options.extra.get("deepLinking"), Some(&json!(true)));
    }

    #[test]
    fn ui_page_mounts_swagger_on_its_container() {
        let mut config = Config::default();
        config.merge(&ConfigOverride::from_value(json!({ "swaggerOptions": { "deepLinking": true } })).unwrap());
        let page = ui_page(&DocsOptions::from_config(&config).unwrap());
        assert!(page.contains(r##"dom_id: "#swagger-ui""##));
        assert!(page.contains(&format!(r#"url: "{}""#, DOCS_JSON_PATH)));
        assert!(page.contains(r#""deepLinking":true"#));
        assert!(page.trim_end().ends_with("</html>"));
    }

    #[test]
    fn paths_use_openapi_params() {
        assert_eq!(openapi_path("/users/:id/:relation"), "/users/{id}/{relation}");
    }

    #[test]
    fn document_lists_routes_and_components() {
        let options = DocsOptions::from_config(&Config::default()).unwrap();
        let user = Arc::new(
            SchemaDefinition::new("User")
                .field("email", FieldDef::new(FieldType::String).required())
                .field("secret", FieldDef::new(FieldType::String))
                .hide("secret"),
        );
        let routes = vec![
            RouteDoc::new(Method::GET, "/users", "List User").tag("User"),
            RouteDoc::new(Method::POST, "/users", "Create User").tag("User").schema("User").with_body(),
            RouteDoc::new(Method::GET, "/users/:id", "Read User").tag("User"),
        ];
        let doc = serde_json::to_value(build_openapi(&options, &routes, &[user])).unwrap();
        assert_eq!(doc["info"]["title"], json!("schema-api"));
        assert!(doc["paths"]["/users"]["get"].is_object());
        assert!(doc["paths"]["/users"]["post"]["requestBody"].is_object());
        assert_eq!(doc["paths"]["/users/{id}"]["get"]["parameters"][0]["name"], json!("id"));
        assert!(doc["components"]["schemas"]["User"]["properties"]["email"].is_object());
        assert!(doc["components"]["schemas"]["User"]["properties"].get("secret").is_none());
        assert_eq!(doc["servers"][0]["url"], json!("http://localhost:3000"));
    }
}
