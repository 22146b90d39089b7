//! Process-wide runtime (config, registry, driver) and the state shared by generated routes.

use crate::config::{Config, SharedConfig};
use crate::driver::{Driver, UriDriver};
use crate::logger::{Logger, LoggerFactory};
use crate::schema::SchemaRegistry;
use crate::validation::Validator;
use std::sync::{Arc, RwLock};

/// Owner of the shared mutable state: one per process, passed by `Arc` to everything that needs it.
#[derive(Debug)]
pub struct Runtime {
    config: SharedConfig,
    loggers: LoggerFactory,
    registry: SchemaRegistry,
    driver: Arc<dyn Driver>,
    /// Set by the first connection opened through this runtime.
    active_driver: RwLock<Option<Arc<dyn Driver>>>,
}

impl Runtime {
    pub fn new(config: Config) -> Arc<Self> {
        Self::with_driver(config, Arc::new(UriDriver::new()))
    }

    pub fn with_driver(config: Config, driver: Arc<dyn Driver>) -> Arc<Self> {
        let config = SharedConfig::new(config);
        Arc::new(Runtime {
            loggers: LoggerFactory::new(config.clone()),
            config,
            registry: SchemaRegistry::new(),
            driver,
            active_driver: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn loggers(&self) -> &LoggerFactory {
        &self.loggers
    }

    pub fn logger(&self, label: &str) -> Logger {
        self.loggers.get_logger(label)
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn record_driver(&self, driver: Arc<dyn Driver>) {
        let mut slot = self.active_driver.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(driver);
    }

    /// Driver recorded by the most recent connect, for subsystems initialized after registration.
    pub fn active_driver(&self) -> Option<Arc<dyn Driver>> {
        self.active_driver.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// State handed to generated routes.
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<Runtime>,
    pub validator: Arc<dyn Validator>,
}
