//! HTTP handlers for generated schema routes.

pub mod crud;
pub use crud::SchemaRoute;
