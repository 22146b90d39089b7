//! Request extractors for generated handlers.

pub mod context;

pub use context::{ConnectionName, Ctx, CONNECTION_HEADER};
