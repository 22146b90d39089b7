//! Per-request scope: named connections opened lazily and models bound once per connection.

use crate::config::ConnectionParams;
use crate::driver::{default_driver_options, ConnectionHandle};
use crate::error::AppError;
use crate::logger::Logger;
use crate::model::Model;
use crate::schema::SchemaMap;
use crate::state::Runtime;
use serde_json::Value;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex};

/// A live connection owned by one request context, with its bound-model cache.
#[derive(Debug)]
pub struct Connection {
    name: String,
    handle: Arc<dyn ConnectionHandle>,
    models: Mutex<HashMap<String, Arc<Model>>>,
}

impl Connection {
    fn new(name: String, handle: Arc<dyn ConnectionHandle>) -> Self {
        Connection {
            name,
            handle,
            models: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &Arc<dyn ConnectionHandle> {
        &self.handle
    }

    /// Names of the schemas bound on this connection so far.
    pub fn bound_models(&self) -> Vec<String> {
        let models = self.models.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = models.keys().cloned().collect();
        names.sort();
        names
    }
}

pub struct RequestContext {
    runtime: Arc<Runtime>,
    schemas: Arc<SchemaMap>,
    logger: Logger,
    connections: tokio::sync::Mutex<HashMap<String, Arc<Connection>>>,
}

impl RequestContext {
    pub fn new(runtime: Arc<Runtime>, schemas: Arc<SchemaMap>, logger: Logger) -> Self {
        RequestContext {
            runtime,
            schemas,
            logger,
            connections: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn schemas(&self) -> &Arc<SchemaMap> {
        &self.schemas
    }

    fn default_connection_name(&self) -> String {
        self.runtime.config().read().mongo.default_connection.clone()
    }

    /// Open (or reuse) a named connection for this request.
    ///
    /// Parameters resolve as configured defaults, then the default name, then `params`. A live
    /// connection already stored under the resolved name is returned unchanged with a warning.
    pub async fn connect(&self, params: Option<ConnectionParams>) -> Result<Arc<Connection>, AppError> {
        let defaults = self.runtime.config().read().mongo.clone();
        let resolved = params.unwrap_or_default().resolve(&defaults);

        let mut connections = self.connections.lock().await;
        if let Some(existing) = connections.get(&resolved.name) {
            if existing.handle.is_live() {
                self.logger
                    .warn(format!("connection '{}' already exists, reusing it", resolved.name));
                return Ok(existing.clone());
            }
        }

        let mut options = default_driver_options();
        crate::config::merge_json(&mut options, &resolved.options);
        if let Some(user) = &resolved.user {
            options.insert("user".into(), Value::String(user.clone()));
        }
        if let Some(password) = &resolved.password {
            options.insert("pass".into(), Value::String(password.expose().to_string()));
        }

        let driver = self.runtime.driver().clone();
        let handle = driver.create_connection(&resolved.uri, &options).await?;
        self.runtime.record_driver(driver);
        self.logger
            .debug(format!("opened connection '{}' ({})", resolved.name, handle.uri()));

        let connection = Arc::new(Connection::new(resolved.name.clone(), handle));
        connections.insert(resolved.name, connection.clone());
        Ok(connection)
    }

    /// Look up an open connection. `None` means the configured default.
    pub async fn get_connection(&self, name: Option<&str>) -> Result<Arc<Connection>, AppError> {
        let default = self.default_connection_name();
        let connections = self.connections.lock().await;
        match name {
            Some(n) if n != default => connections
                .get(n)
                .cloned()
                .ok_or_else(|| AppError::ConnectionNotFound(n.to_string())),
            _ => connections.get(&default).cloned().ok_or(AppError::NoConnections),
        }
    }

    /// Names of the connections opened by this request.
    pub async fn connection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// The model for schema `name` on `connection` (default when `None`), bound on first access.
    pub async fn model(&self, name: &str, connection: Option<&str>) -> Result<ModelRef<'_>, AppError> {
        let conn = self.get_connection(connection).await?;
        let rebindable = match connection {
            None => true,
            Some(c) => c == self.default_connection_name(),
        };

        let model = {
            let mut models = conn.models.lock().unwrap_or_else(|e| e.into_inner());
            match models.get(name) {
                Some(m) => m.clone(),
                None => {
                    let schema = self
                        .schemas
                        .get(name)
                        .cloned()
                        .ok_or_else(|| AppError::SchemaNotFound(name.to_string()))?;
                    let model = Arc::new(Model::bind(schema, conn.name.clone(), conn.handle.clone()));
                    models.insert(name.to_string(), model.clone());
                    model
                }
            }
        };

        Ok(ModelRef {
            model,
            ctx: self,
            rebindable,
        })
    }
}

/// A bound model resolved through a request context.
///
/// Refs resolved against the default connection can be pivoted to another connection with
/// [`ModelRef::with`].
pub struct ModelRef<'a> {
    model: Arc<Model>,
    ctx: &'a RequestContext,
    rebindable: bool,
}

impl<'a> ModelRef<'a> {
    /// Same schema on connection `connection`, opening that connection with default parameters if needed.
    pub async fn with(&self, connection: &str) -> Result<ModelRef<'a>, AppError> {
        if !self.rebindable {
            return Err(AppError::NotRebindable {
                schema: self.model.name().to_string(),
                connection: self.model.connection_name().to_string(),
            });
        }
        if let Err(AppError::ConnectionNotFound(_)) = self.ctx.get_connection(Some(connection)).await {
            self.ctx.connect(Some(ConnectionParams::named(connection))).await?;
        }
        self.ctx.model(self.model.name(), Some(connection)).await
    }

    pub fn is_rebindable(&self) -> bool {
        self.rebindable
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn into_inner(self) -> Arc<Model> {
        self.model
    }
}

impl Deref for ModelRef<'_> {
    type Target = Model;

    fn deref(&self) -> &Model {
        &self.model
    }
}
