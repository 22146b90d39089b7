//! PostgreSQL document storage: one `(id TEXT, payload JSONB)` table per collection.

use crate::driver::{ConnectionHandle, Driver};
use crate::error::DriverError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Schema for collection tables, from the `schema` driver option. Default `public`.
const DEFAULT_SCHEMA: &str = "public";

/// Opens `postgres://` connections. Connections with the same URI and options share one pool.
#[derive(Clone, Debug, Default)]
pub struct PgDriver {
    stores: Arc<Mutex<HashMap<String, Arc<PgStore>>>>,
}

/// A pool and the collection tables already created through it.
#[derive(Debug)]
struct PgStore {
    pool: PgPool,
    schema: String,
    ensured: Mutex<HashSet<String>>,
}

impl PgStore {
    fn new(pool: PgPool, schema: &str) -> Self {
        PgStore {
            pool,
            schema: schema.to_string(),
            ensured: Mutex::new(HashSet::new()),
        }
    }
}

fn store_key(uri: &str, options: &Map<String, Value>) -> String {
    let sorted: BTreeMap<&String, &Value> = options.iter().collect();
    let options = serde_json::to_string(&sorted).unwrap_or_default();
    format!("{} {}", uri, options)
}

impl PgDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The pool for `uri` and `options`, opening it on first use or after it was closed.
    async fn store(&self, uri: &str, options: &Map<String, Value>) -> Result<Arc<PgStore>, DriverError> {
        let key = store_key(uri, options);
        let mut stores = self.stores.lock().await;
        if let Some(store) = stores.get(&key).filter(|s| !s.pool.is_closed()) {
            return Ok(store.clone());
        }
        let store = Arc::new(open_store(uri, options).await?);
        tracing::debug!(uri = %uri, "opened postgres pool");
        stores.insert(key, store.clone());
        Ok(store)
    }

    /// Close every pool this driver opened.
    pub async fn shutdown(&self) {
        let stores: Vec<_> = self.stores.lock().await.drain().map(|(_, s)| s).collect();
        for store in stores {
            store.pool.close().await;
        }
    }
}

fn option_u64(options: &Map<String, Value>, key: &str) -> Option<u64> {
    options.get(key).and_then(Value::as_u64)
}

fn option_bool(options: &Map<String, Value>, key: &str) -> bool {
    options.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn option_str<'a>(options: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    options.get(key).and_then(Value::as_str)
}

async fn open_store(uri: &str, options: &Map<String, Value>) -> Result<PgStore, DriverError> {
    let connect_err = |message: String| DriverError::Connect {
        uri: uri.to_string(),
        message,
    };
    let mut connect = PgConnectOptions::from_str(uri).map_err(|e| connect_err(e.to_string()))?;
    if let Some(user) = option_str(options, "user") {
        connect = connect.username(user);
    }
    if let Some(pass) = option_str(options, "pass") {
        connect = connect.password(pass);
    }
    let schema = option_str(options, "schema").unwrap_or(DEFAULT_SCHEMA);
    if !is_identifier(schema) {
        return Err(connect_err(format!("invalid schema name: {}", schema)));
    }
    if option_bool(options, "createDatabase") {
        ensure_database_exists(uri).await?;
    }

    let mut pool = PgPoolOptions::new();
    if let Some(max) = option_u64(options, "maxPoolSize") {
        pool = pool.max_connections(max as u32);
    }
    if let Some(ms) = option_u64(options, "connectTimeoutMs") {
        pool = pool.acquire_timeout(Duration::from_millis(ms));
    }
    let pool = pool
        .connect_with(connect.disable_statement_logging())
        .await
        .map_err(|e| connect_err(e.to_string()))?;

    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema)))
        .execute(&pool)
        .await?;
    Ok(PgStore::new(pool, schema))
}

#[async_trait]
impl Driver for PgDriver {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn create_connection(
        &self,
        uri: &str,
        options: &Map<String, Value>,
    ) -> Result<Arc<dyn ConnectionHandle>, DriverError> {
        let store = self.store(uri, options).await?;
        Ok(Arc::new(PgConnectionHandle {
            uri: uri.to_string(),
            store,
            open: AtomicBool::new(true),
        }))
    }
}

/// One named connection over a shared pool. Closing it leaves the pool to other connections.
#[derive(Debug)]
pub struct PgConnectionHandle {
    uri: String,
    store: Arc<PgStore>,
    open: AtomicBool,
}

impl PgConnectionHandle {
    pub fn pool(&self) -> &PgPool {
        &self.store.pool
    }

    fn live_pool(&self) -> Result<&PgPool, DriverError> {
        if self.is_live() {
            Ok(self.pool())
        } else {
            Err(DriverError::Connect {
                uri: self.uri.clone(),
                message: "connection closed".into(),
            })
        }
    }

    /// Qualified table for `collection`, creating it on first use of the pool.
    async fn table(&self, collection: &str) -> Result<String, DriverError> {
        if !is_identifier(collection) {
            return Err(DriverError::InvalidDocument(format!("invalid collection name: {}", collection)));
        }
        let pool = self.live_pool()?;
        let q_table = format!("{}.{}", quote_ident(&self.store.schema), quote_ident(collection));
        let mut ensured = self.store.ensured.lock().await;
        if !ensured.contains(collection) {
            let ddl = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    id TEXT PRIMARY KEY,
                    payload JSONB NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )
                "#,
                q_table
            );
            sqlx::query(&ddl).execute(pool).await?;
            ensured.insert(collection.to_string());
        }
        Ok(q_table)
    }
}

#[async_trait]
impl ConnectionHandle for PgConnectionHandle {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn is_live(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.store.pool.is_closed()
    }

    async fn insert(&self, collection: &str, id: &str, document: Value) -> Result<(), DriverError> {
        let table = self.table(collection).await?;
        let sql = format!("INSERT INTO {} (id, payload) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING", table);
        tracing::debug!(sql = %sql, "query");
        let done = sqlx::query(&sql).bind(id).bind(&document).execute(self.pool()).await?;
        if done.rows_affected() == 0 {
            return Err(DriverError::DocumentExists {
                id: id.to_string(),
                collection: collection.to_string(),
            });
        }
        Ok(())
    }

    async fn merge(&self, collection: &str, id: &str, patch: Map<String, Value>) -> Result<Option<Value>, DriverError> {
        let table = self.table(collection).await?;
        let sql = format!(
            "UPDATE {} SET payload = payload || $2, updated_at = NOW() WHERE id = $1 RETURNING payload",
            table
        );
        tracing::debug!(sql = %sql, "query");
        Ok(sqlx::query_scalar::<_, Value>(&sql)
            .bind(id)
            .bind(Value::Object(patch))
            .fetch_optional(self.pool())
            .await?)
    }

    async fn remove(&self, collection: &str, id: &str) -> Result<bool, DriverError> {
        let table = self.table(collection).await?;
        let sql = format!("DELETE FROM {} WHERE id = $1", table);
        tracing::debug!(sql = %sql, "query");
        let done = sqlx::query(&sql).bind(id).execute(self.pool()).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, DriverError> {
        let table = self.table(collection).await?;
        let sql = format!("SELECT payload FROM {} WHERE id = $1", table);
        tracing::debug!(sql = %sql, "query");
        Ok(sqlx::query_scalar::<_, Value>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Value>, DriverError> {
        let table = self.table(collection).await?;
        let sql = format!(
            "SELECT payload FROM {} WHERE payload @> $1 ORDER BY id LIMIT $2 OFFSET $3",
            table
        );
        tracing::debug!(sql = %sql, "query");
        Ok(sqlx::query_scalar::<_, Value>(&sql)
            .bind(Value::Object(filter.clone()))
            .bind(limit as i64)
            .bind(skip as i64)
            .fetch_all(self.pool())
            .await?)
    }

    async fn count(&self, collection: &str, filter: &Map<String, Value>) -> Result<u64, DriverError> {
        let table = self.table(collection).await?;
        let sql = format!("SELECT COUNT(*) FROM {} WHERE payload @> $1", table);
        tracing::debug!(sql = %sql, "query");
        let n: i64 = sqlx::query_scalar(&sql)
            .bind(Value::Object(filter.clone()))
            .fetch_one(self.pool())
            .await?;
        Ok(n.max(0) as u64)
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Runs on connect when the
/// `createDatabase` option is set.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), DriverError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = PgConnectOptions::from_str(&admin_url).map_err(|e| DriverError::Connect {
        uri: admin_url.clone(),
        message: e.to_string(),
    })?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), DriverError> {
    let (_, rest) = url
        .split_once("://")
        .ok_or_else(|| DriverError::UnsupportedScheme(url.to_string()))?;
    let Some(slash) = rest.find('/') else {
        return Ok((url.to_string(), String::new()));
    };
    let path_start = url.len() - rest.len() + slash + 1;
    let db_name = url[path_start..].split('?').next().unwrap_or("").trim();
    let admin_url = format!("{}postgres", &url[..path_start]);
    Ok((admin_url, db_name.to_string()))
}
