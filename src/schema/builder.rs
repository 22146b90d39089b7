//! Schema-build collaborators: produce the name -> definition map the registry caches.

use crate::config::Config;
use crate::driver::Driver;
use crate::error::SchemaBuildError;
use crate::logger::Logger;
use crate::policy::resolve_policy_dir;
use crate::schema::{validate_schemas, SchemaDefinition, SchemaMap};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait SchemaBuilder: Send + Sync {
    async fn build(&self, driver: &dyn Driver, logger: &Logger, config: &Config) -> Result<SchemaMap, SchemaBuildError>;
}

/// Schemas supplied in memory.
#[derive(Clone, Debug, Default)]
pub struct StaticSchemaBuilder {
    schemas: Vec<SchemaDefinition>,
}

impl StaticSchemaBuilder {
    pub fn new(schemas: Vec<SchemaDefinition>) -> Self {
        StaticSchemaBuilder { schemas }
    }
}

#[async_trait]
impl SchemaBuilder for StaticSchemaBuilder {
    async fn build(&self, driver: &dyn Driver, logger: &Logger, _config: &Config) -> Result<SchemaMap, SchemaBuildError> {
        logger.debug(format!("building {} schemas for driver {}", self.schemas.len(), driver.name()));
        validate_schemas(self.schemas.clone())
    }
}

/// Reads every `*.json` file in a directory as one schema definition.
///
/// With policies enabled the configured policy directory must exist, otherwise the build fails with
/// [`SchemaBuildError::PolicyPathNotFound`]. Relative policy paths resolve against
/// [`Config::resolved_app_root`], the same root the policy engine loads from.
#[derive(Clone, Debug)]
pub struct DirSchemaBuilder {
    dir: PathBuf,
}

impl DirSchemaBuilder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirSchemaBuilder { dir: dir.into() }
    }
}

#[async_trait]
impl SchemaBuilder for DirSchemaBuilder {
    async fn build(&self, driver: &dyn Driver, logger: &Logger, config: &Config) -> Result<SchemaMap, SchemaBuildError> {
        let policy_dir = resolve_policy_dir(config).map_err(|source| SchemaBuildError::Io {
            path: PathBuf::from("."),
            source,
        })?;
        if let Some(policy_dir) = policy_dir {
            if !tokio::fs::try_exists(&policy_dir).await.unwrap_or(false) {
                return Err(SchemaBuildError::PolicyPathNotFound(policy_dir));
            }
        }

        let schemas = read_schema_dir(&self.dir).await?;
        logger.debug(format!(
            "loaded {} schemas from {} for driver {}",
            schemas.len(),
            self.dir.display(),
            driver.name()
        ));
        validate_schemas(schemas)
    }
}

async fn read_schema_dir(dir: &Path) -> Result<Vec<SchemaDefinition>, SchemaBuildError> {
    let io_err = |source| SchemaBuildError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| SchemaBuildError::Io { path: path.clone(), source })?;
        let schema: SchemaDefinition =
            serde_json::from_str(&raw).map_err(|source| SchemaBuildError::Parse { path: path.clone(), source })?;
        out.push(schema);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryDriver;
    use tracing::level_filters::LevelFilter;

    fn logger() -> Logger {
        Logger::new("test", LevelFilter::OFF)
    }

    #[tokio::test]
    async fn reads_json_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), r#"{ "name": "B" }"#).unwrap();
        std::fs::write(dir.path().join("a.json"), r#"{ "name": "A", "fields": { "b": { "type": "id", "ref": "B" } } }"#).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let map = DirSchemaBuilder::new(dir.path())
            .build(&MemoryDriver::new(), &logger(), &Config::default())
            .await
            .unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["A"].relations().next(), Some(("b", "B")));
    }

    #[tokio::test]
    async fn missing_policy_dir_is_typed() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            enable_policies: true,
            policy_path: "does-not-exist".into(),
            app_root: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        let err = DirSchemaBuilder::new(dir.path())
            .build(&MemoryDriver::new(), &logger(), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaBuildError::PolicyPathNotFound(p) if p == dir.path().join("does-not-exist")));
    }

    #[tokio::test]
    async fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{").unwrap();
        let err = DirSchemaBuilder::new(dir.path())
            .build(&MemoryDriver::new(), &logger(), &Config::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaBuildError::Parse { .. }));
    }
}
