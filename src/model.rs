//! Bound model: a schema activated against one connection.

use crate::driver::ConnectionHandle;
use crate::error::AppError;
use crate::schema::SchemaDefinition;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const ID_FIELD: &str = "_id";
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";

#[derive(Debug)]
pub struct Model {
    schema: Arc<SchemaDefinition>,
    collection: String,
    connection: String,
    handle: Arc<dyn ConnectionHandle>,
}

impl Model {
    /// Bind `schema` to a live connection handle named `connection`.
    pub fn bind(schema: Arc<SchemaDefinition>, connection: impl Into<String>, handle: Arc<dyn ConnectionHandle>) -> Self {
        Model {
            collection: schema.collection_name(),
            schema,
            connection: connection.into(),
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &Arc<SchemaDefinition> {
        &self.schema
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn connection_name(&self) -> &str {
        &self.connection
    }

    pub fn handle(&self) -> &Arc<dyn ConnectionHandle> {
        &self.handle
    }

    pub async fn find(&self, filter: &Map<String, Value>, skip: u64, limit: u64) -> Result<Vec<Value>, AppError> {
        let docs = self.handle.find(&self.collection, filter, skip, limit).await?;
        Ok(docs.into_iter().map(|d| self.present(d)).collect())
    }

    pub async fn count(&self, filter: &Map<String, Value>) -> Result<u64, AppError> {
        Ok(self.handle.count(&self.collection, filter).await?)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Value>, AppError> {
        let doc = self.handle.get(&self.collection, id).await?;
        Ok(doc.map(|d| self.present(d)))
    }

    /// Insert a new document. A caller-supplied `_id` is kept; otherwise a UUID is assigned.
    pub async fn create(&self, mut body: Map<String, Value>) -> Result<Value, AppError> {
        let id = match body.get(ID_FIELD) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(_) => return Err(AppError::BadRequest(format!("{} must be a non-empty string", ID_FIELD))),
            None => uuid::Uuid::new_v4().to_string(),
        };
        body.insert(ID_FIELD.into(), Value::String(id.clone()));
        if self.schema.timestamps {
            let now = Value::String(chrono::Utc::now().to_rfc3339());
            body.insert(CREATED_AT.into(), now.clone());
            body.insert(UPDATED_AT.into(), now);
        }
        let doc = Value::Object(body);
        self.handle.insert(&self.collection, &id, doc.clone()).await?;
        Ok(self.present(doc))
    }

    /// Shallow-merge `patch` into the stored document. `_id` and `createdAt` cannot change.
    pub async fn update(&self, id: &str, mut patch: Map<String, Value>) -> Result<Option<Value>, AppError> {
        patch.remove(ID_FIELD);
        patch.remove(CREATED_AT);
        if self.schema.timestamps {
            patch.insert(UPDATED_AT.into(), Value::String(chrono::Utc::now().to_rfc3339()));
        }
        let merged = self.handle.merge(&self.collection, id, patch).await?;
        Ok(merged.map(|doc| self.present(doc)))
    }

    pub async fn delete(&self, id: &str) -> Result<bool, AppError> {
        Ok(self.handle.remove(&self.collection, id).await?)
    }

    /// Follow relationship field `field` of `doc` into `target`. One id yields a document (or null),
    /// an id array yields the documents that still exist.
    pub async fn find_related(&self, doc: &Value, field: &str, target: &Model) -> Result<Value, AppError> {
        match doc.get(field) {
            Some(Value::String(id)) => Ok(target.find_by_id(id).await?.unwrap_or(Value::Null)),
            Some(Value::Array(ids)) => {
                let mut out = Vec::with_capacity(ids.len());
                for id in ids.iter().filter_map(Value::as_str) {
                    if let Some(row) = target.find_by_id(id).await? {
                        out.push(row);
                    }
                }
                Ok(Value::Array(out))
            }
            _ => Ok(Value::Null),
        }
    }

    /// Strip hidden fields before a document leaves the API.
    pub fn present(&self, mut doc: Value) -> Value {
        if let Value::Object(map) = &mut doc {
            for field in &self.schema.hidden {
                map.remove(field);
            }
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{Driver, MemoryDriver};
    use serde_json::json;

    async fn model(schema: SchemaDefinition) -> Model {
        let handle = MemoryDriver::new().create_connection("mem://m", &Map::new()).await.unwrap();
        Model::bind(Arc::new(schema), "default", handle)
    }

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn create_assigns_id_and_timestamps() {
        let m = model(SchemaDefinition::new("User")).await;
        let doc = m.create(obj(json!({ "name": "ada" }))).await.unwrap();
        let id = doc[ID_FIELD].as_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
        assert_eq!(doc[CREATED_AT], doc[UPDATED_AT]);
        assert_eq!(m.collection(), "users");
    }

    #[tokio::test]
    async fn update_merges_and_protects_id() {
        let m = model(SchemaDefinition::new("User")).await;
        let doc = m.create(obj(json!({ "_id": "u1", "name": "ada", "age": 36 }))).await.unwrap();
        let updated = m
            .update("u1", obj(json!({ "_id": "other", "age": 37 })))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["_id"], json!("u1"));
        assert_eq!(updated["name"], json!("ada"));
        assert_eq!(updated["age"], json!(37));
        assert_eq!(updated[CREATED_AT], doc[CREATED_AT]);
        assert!(m.update("missing", Map::new()).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_keep_every_field() {
        let m = Arc::new(model(SchemaDefinition::new("Counter")).await);
        m.create(obj(json!({ "_id": "d1" }))).await.unwrap();

        let tasks: Vec<_> = (0..200)
            .map(|i| {
                let m = m.clone();
                tokio::spawn(async move {
                    let mut patch = Map::new();
                    patch.insert(format!("f{}", i), json!(i));
                    m.update("d1", patch).await.unwrap().unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let doc = m.find_by_id("d1").await.unwrap().unwrap();
        let fields = (0..200).filter(|i| doc.get(format!("f{}", i)).is_some()).count();
        assert_eq!(fields, 200);
    }

    #[tokio::test]
    async fn hidden_fields_are_stripped() {
        let m = model(SchemaDefinition::new("User").hide("password")).await;
        let doc = m.create(obj(json!({ "_id": "u1", "password": "x" }))).await.unwrap();
        assert!(doc.get("password").is_none());
        let stored = m.handle().get("users", "u1").await.unwrap().unwrap();
        assert_eq!(stored["password"], json!("x"));
    }

    #[tokio::test]
    async fn follows_single_and_many_relations() {
        let handle = MemoryDriver::new().create_connection("mem://rel", &Map::new()).await.unwrap();
        let tags = Model::bind(Arc::new(SchemaDefinition::new("Tag")), "default", handle.clone());
        let posts = Model::bind(Arc::new(SchemaDefinition::new("Post")), "default", handle);
        tags.create(obj(json!({ "_id": "t1", "label": "rust" }))).await.unwrap();

        let one = json!({ "tag": "t1" });
        assert_eq!(posts.find_related(&one, "tag", &tags).await.unwrap()["label"], json!("rust"));

        let many = json!({ "tags": ["t1", "gone"] });
        let rows = posts.find_related(&many, "tags", &tags).await.unwrap();
        assert_eq!(rows.as_array().map(Vec::len), Some(1));

        assert_eq!(posts.find_related(&one, "missing", &tags).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn rejects_non_string_id() {
        let m = model(SchemaDefinition::new("User")).await;
        assert!(matches!(m.create(obj(json!({ "_id": 5 }))).await, Err(AppError::BadRequest(_))));
    }
}
