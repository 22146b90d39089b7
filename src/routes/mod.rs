//! Route generation collaborators: per-schema generators and the custom-route hook.

pub mod common;
pub mod crud;

pub use common::common_routes;
pub use crud::CrudRoutes;

use crate::config::Config;
use crate::driver::Driver;
use crate::error::PluginError;
use crate::host::Host;
use crate::logger::Logger;
use crate::schema::{SchemaDefinition, SchemaMap};
use crate::state::AppState;
use async_trait::async_trait;
use std::sync::Arc;

/// Wires the endpoints for one schema. `schemas` is the full map, for relationship targets.
#[async_trait]
pub trait RouteGenerator: Send + Sync {
    async fn generate(
        &self,
        host: &mut Host,
        state: &AppState,
        schema: &Arc<SchemaDefinition>,
        schemas: &Arc<SchemaMap>,
    ) -> Result<(), PluginError>;
}

/// Application-specific endpoints, invoked once after every schema's routes are generated.
#[async_trait]
pub trait CustomRoutes: Send + Sync {
    async fn generate(
        &self,
        host: &mut Host,
        driver: &Arc<dyn Driver>,
        logger: &Logger,
        config: &Config,
    ) -> Result<(), PluginError>;
}

#[async_trait]
impl<F> CustomRoutes for F
where
    F: Fn(&mut Host, &Arc<dyn Driver>, &Logger, &Config) -> Result<(), PluginError> + Send + Sync,
{
    async fn generate(
        &self,
        host: &mut Host,
        driver: &Arc<dyn Driver>,
        logger: &Logger,
        config: &Config,
    ) -> Result<(), PluginError> {
        self(host, driver, logger, config)
    }
}

/// No custom endpoints.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCustomRoutes;

#[async_trait]
impl CustomRoutes for NoCustomRoutes {
    async fn generate(&self, _: &mut Host, _: &Arc<dyn Driver>, _: &Logger, _: &Config) -> Result<(), PluginError> {
        Ok(())
    }
}
