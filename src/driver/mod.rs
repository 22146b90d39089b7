//! Document driver abstraction: opens named connections and stores JSON documents by id.
//!
//! - [`MemoryDriver`] serves `mem://<database>` URIs.
//! - [`PgDriver`] serves `postgres://` URIs, one JSONB table per collection.
//! - [`UriDriver`] picks between them by URI scheme.

mod memory;
mod postgres;

pub use memory::{MemoryConnection, MemoryDriver};
pub use postgres::{ensure_database_exists, PgConnectionHandle, PgDriver};

use crate::error::DriverError;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::fmt::Debug;
use std::sync::Arc;

/// Options every connection starts from; caller options are merged on top.
pub fn default_driver_options() -> Map<String, Value> {
    let defaults = json!({
        "maxPoolSize": 5,
        "connectTimeoutMs": 10_000,
    });
    match defaults {
        Value::Object(m) => m,
        _ => Map::new(),
    }
}

#[async_trait]
pub trait Driver: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    async fn create_connection(
        &self,
        uri: &str,
        options: &Map<String, Value>,
    ) -> Result<Arc<dyn ConnectionHandle>, DriverError>;
}

/// A live connection. Documents are JSON objects keyed by a string id.
#[async_trait]
pub trait ConnectionHandle: Send + Sync + Debug {
    fn uri(&self) -> &str;

    fn is_live(&self) -> bool;

    /// Fails with [`DriverError::DocumentExists`] if the id is taken.
    async fn insert(&self, collection: &str, id: &str, document: Value) -> Result<(), DriverError>;

    /// Shallow-merge `patch` into the stored document as one atomic step and return the result.
    /// `None` when the id is absent.
    async fn merge(&self, collection: &str, id: &str, patch: Map<String, Value>) -> Result<Option<Value>, DriverError>;

    /// Returns whether a document was removed.
    async fn remove(&self, collection: &str, id: &str) -> Result<bool, DriverError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, DriverError>;

    /// Documents whose top-level fields equal every entry of `filter`, ordered by id.
    async fn find(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Value>, DriverError>;

    async fn count(&self, collection: &str, filter: &Map<String, Value>) -> Result<u64, DriverError>;

    async fn close(&self) -> Result<(), DriverError>;
}

/// Dispatches on the URI scheme: `mem://` and `postgres://` / `postgresql://`.
#[derive(Clone, Debug, Default)]
pub struct UriDriver {
    memory: MemoryDriver,
    postgres: PgDriver,
}

impl UriDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Driver for UriDriver {
    fn name(&self) -> &'static str {
        "uri"
    }

    async fn create_connection(
        &self,
        uri: &str,
        options: &Map<String, Value>,
    ) -> Result<Arc<dyn ConnectionHandle>, DriverError> {
        let scheme = uri.split_once("://").map(|(s, _)| s).unwrap_or("");
        match scheme {
            "mem" => self.memory.create_connection(uri, options).await,
            "postgres" | "postgresql" => self.postgres.create_connection(uri, options).await,
            _ => Err(DriverError::UnsupportedScheme(uri.to_string())),
        }
    }
}
