//! Default route generator: CRUD and relationship endpoints for one schema.
//! Paths are fixed per schema (`/users`, `/users/:id`, `/users/:id/:relation`); handlers receive the schema as route state.

use crate::docs::RouteDoc;
use crate::error::{PluginError, SchemaBuildError};
use crate::handlers::crud::{self, SchemaRoute};
use crate::host::Host;
use crate::policy::{enforce, PolicyGate};
use crate::routes::RouteGenerator;
use crate::schema::{Operation, SchemaDefinition, SchemaMap};
use crate::state::AppState;
use async_trait::async_trait;
use axum::{http::Method, middleware, routing::MethodRouter, Router};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

#[derive(Clone, Copy, Debug)]
pub struct CrudRoutes {
    pub body_limit: usize,
}

impl Default for CrudRoutes {
    fn default() -> Self {
        CrudRoutes {
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

#[async_trait]
impl RouteGenerator for CrudRoutes {
    async fn generate(
        &self,
        host: &mut Host,
        state: &AppState,
        schema: &Arc<SchemaDefinition>,
        schemas: &Arc<SchemaMap>,
    ) -> Result<(), PluginError> {
        let name = schema.name.as_str();
        let collection_path = format!("/{}", schema.path_segment());
        let item_path = format!("{}/:id", collection_path);

        let mut collection: Option<MethodRouter<SchemaRoute>> = None;
        let mut item: Option<MethodRouter<SchemaRoute>> = None;
        let mut docs = Vec::new();

        if schema.allows(Operation::List) {
            collection = Some(collection.unwrap_or_else(MethodRouter::new).get(crud::list));
            docs.push(RouteDoc::new(Method::GET, &collection_path, format!("List {}", name)));
        }
        if schema.allows(Operation::Create) {
            collection = Some(collection.unwrap_or_else(MethodRouter::new).post(crud::create));
            docs.push(RouteDoc::new(Method::POST, &collection_path, format!("Create {}", name)).with_body());
        }
        if schema.allows(Operation::Read) {
            item = Some(item.unwrap_or_else(MethodRouter::new).get(crud::read));
            docs.push(RouteDoc::new(Method::GET, &item_path, format!("Read {}", name)));
        }
        if schema.allows(Operation::Update) {
            item = Some(item.unwrap_or_else(MethodRouter::new).patch(crud::update));
            docs.push(RouteDoc::new(Method::PATCH, &item_path, format!("Update {}", name)).with_body());
        }
        if schema.allows(Operation::Delete) {
            item = Some(item.unwrap_or_else(MethodRouter::new).delete(crud::delete));
            docs.push(RouteDoc::new(Method::DELETE, &item_path, format!("Delete {}", name)));
        }

        let mut router: Router<SchemaRoute> = Router::new();
        let mut any = false;
        if let Some(methods) = collection {
            router = router.route(&collection_path, methods);
            any = true;
        }
        if let Some(methods) = item {
            router = router.route(&item_path, methods);
            any = true;
        }
        if schema.allows(Operation::Read) {
            let mut relations = schema.relations().peekable();
            if relations.peek().is_some() {
                let relation_path = format!("{}/:relation", item_path);
                router = router.route(&relation_path, axum::routing::get(crud::related));
                for (field, target) in relations {
                    if !schemas.contains_key(target) {
                        return Err(PluginError::SchemaBuild(SchemaBuildError::MissingReference {
                            schema: name.to_string(),
                            field: field.to_string(),
                            target: target.to_string(),
                        }));
                    }
                    docs.push(RouteDoc::new(
                        Method::GET,
                        format!("{}/{}", item_path, field),
                        format!("{} referenced by {}.{}", target, name, field),
                    ));
                }
            }
        }
        if !any {
            return Ok(());
        }

        router = router.layer(RequestBodyLimitLayer::new(self.body_limit));
        if let Some(engine) = host.policy() {
            let gate = PolicyGate {
                engine: engine.clone(),
                schema: name.to_string(),
            };
            router = router.route_layer(middleware::from_fn_with_state(gate, enforce));
        }

        let route_state = SchemaRoute {
            state: state.clone(),
            schema: schema.clone(),
        };
        host.merge(router.with_state(route_state));
        for doc in docs {
            host.document(doc.tag(name).schema(name));
        }
        host.document_schema(schema.clone());
        Ok(())
    }
}
