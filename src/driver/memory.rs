//! In-memory document storage for `mem://<database>` URIs.
//!
//! Connections to the same database name share one store, so data outlives a single request's
//! connection the way it would with a real server.

use crate::driver::{ConnectionHandle, Driver};
use crate::error::DriverError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

type CollectionMap = BTreeMap<String, Value>;
type StoreMap = HashMap<String, CollectionMap>;

#[derive(Clone, Debug, Default)]
pub struct MemoryDriver {
    databases: Arc<Mutex<HashMap<String, Arc<RwLock<StoreMap>>>>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn database(&self, name: &str) -> Arc<RwLock<StoreMap>> {
        let mut dbs = self.databases.lock().unwrap_or_else(|e| e.into_inner());
        dbs.entry(name.to_string()).or_default().clone()
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create_connection(
        &self,
        uri: &str,
        _options: &Map<String, Value>,
    ) -> Result<Arc<dyn ConnectionHandle>, DriverError> {
        let database = uri
            .strip_prefix("mem://")
            .ok_or_else(|| DriverError::UnsupportedScheme(uri.to_string()))?;
        let database = database.split(['/', '?']).next().unwrap_or("");
        let database = if database.is_empty() { "default" } else { database };
        Ok(Arc::new(MemoryConnection {
            uri: uri.to_string(),
            store: self.database(database),
            open: AtomicBool::new(true),
        }))
    }
}

#[derive(Debug)]
pub struct MemoryConnection {
    uri: String,
    store: Arc<RwLock<StoreMap>>,
    open: AtomicBool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DriverError::Connect {
                uri: self.uri.clone(),
                message: "connection closed".into(),
            })
        }
    }
}

fn matches_filter(doc: &Value, filter: &Map<String, Value>) -> bool {
    filter.iter().all(|(k, expected)| doc.get(k) == Some(expected))
}

#[async_trait]
impl ConnectionHandle for MemoryConnection {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn is_live(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn insert(&self, collection: &str, id: &str, document: Value) -> Result<(), DriverError> {
        self.ensure_open()?;
        let mut store = self.store.write().await;
        let docs = store.entry(collection.to_string()).or_default();
        if docs.contains_key(id) {
            return Err(DriverError::DocumentExists {
                id: id.to_string(),
                collection: collection.to_string(),
            });
        }
        docs.insert(id.to_string(), document);
        Ok(())
    }

    async fn merge(&self, collection: &str, id: &str, patch: Map<String, Value>) -> Result<Option<Value>, DriverError> {
        self.ensure_open()?;
        let mut store = self.store.write().await;
        let Some(slot) = store.get_mut(collection).and_then(|docs| docs.get_mut(id)) else {
            return Ok(None);
        };
        match slot {
            Value::Object(doc) => doc.extend(patch),
            _ => *slot = Value::Object(patch),
        }
        Ok(Some(slot.clone()))
    }

    async fn remove(&self, collection: &str, id: &str) -> Result<bool, DriverError> {
        self.ensure_open()?;
        let mut store = self.store.write().await;
        Ok(store
            .get_mut(collection)
            .map(|docs| docs.remove(id).is_some())
            .unwrap_or(false))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, DriverError> {
        self.ensure_open()?;
        let store = self.store.read().await;
        Ok(store.get(collection).and_then(|docs| docs.get(id)).cloned())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Value>, DriverError> {
        self.ensure_open()?;
        let store = self.store.read().await;
        let Some(docs) = store.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .values()
            .filter(|d| matches_filter(d, filter))
            .skip(skip as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count(&self, collection: &str, filter: &Map<String, Value>) -> Result<u64, DriverError> {
        self.ensure_open()?;
        let store = self.store.read().await;
        Ok(store
            .get(collection)
            .map(|docs| docs.values().filter(|d| matches_filter(d, filter)).count() as u64)
            .unwrap_or(0))
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}
