//! Runtime-owned schema registry: built once, then a read-through cache shared by every request.

use crate::config::Config;
use crate::driver::Driver;
use crate::error::SchemaBuildError;
use crate::logger::Logger;
use crate::schema::{SchemaBuilder, SchemaMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Outcome of [`SchemaRegistry::resolve`].
#[derive(Debug)]
pub enum Resolved {
    /// Registry was already generated; nothing was built.
    Cached(Arc<SchemaMap>),
    Built(Arc<SchemaMap>),
    /// Build failed on a missing policy path. Carries the cause; the registry stays ungenerated.
    Degraded(SchemaBuildError),
}

impl Resolved {
    /// Schemas to generate routes for; empty when degraded.
    pub fn schemas(&self) -> Arc<SchemaMap> {
        match self {
            Resolved::Cached(m) | Resolved::Built(m) => m.clone(),
            Resolved::Degraded(_) => Arc::new(SchemaMap::new()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Resolved::Degraded(_))
    }
}

#[derive(Debug, Default)]
pub struct SchemaRegistry {
    // Held across the build so concurrent first calls build exactly once.
    generated: Mutex<Option<Arc<SchemaMap>>>,
    builds: AtomicUsize,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached map, or build it with `builder` on first use.
    pub async fn resolve(
        &self,
        builder: &dyn SchemaBuilder,
        driver: &dyn Driver,
        logger: &Logger,
        config: &Config,
    ) -> Result<Resolved, SchemaBuildError> {
        let mut slot = self.generated.lock().await;
        if let Some(existing) = slot.as_ref() {
            logger.debug("schemas already generated, reusing registry");
            return Ok(Resolved::Cached(existing.clone()));
        }

        self.builds.fetch_add(1, Ordering::SeqCst);
        match builder.build(driver, logger, config).await {
            Ok(map) => {
                logger.info(format!("generated {} schemas", map.len()));
                let map = Arc::new(map);
                *slot = Some(map.clone());
                Ok(Resolved::Built(map))
            }
            Err(SchemaBuildError::PolicyPathNotFound(path)) => {
                logger.error(format!(
                    "policy directory {} does not exist; create it or set `policyPath` (with `absolutePolicyPath` for absolute paths). Continuing without generated schemas.",
                    path.display()
                ));
                Ok(Resolved::Degraded(SchemaBuildError::PolicyPathNotFound(path)))
            }
            Err(e) => Err(e),
        }
    }

    /// Current registry contents, if generated.
    pub async fn current(&self) -> Option<Arc<SchemaMap>> {
        self.generated.lock().await.clone()
    }

    pub async fn is_generated(&self) -> bool {
        self.generated.lock().await.is_some()
    }

    /// Drop the cached map so the next resolve rebuilds.
    pub async fn invalidate(&self) {
        *self.generated.lock().await = None;
    }

    /// Number of times the build collaborator has been invoked.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}
