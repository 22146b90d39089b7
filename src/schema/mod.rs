//! Schema definitions, the build collaborators, and the registry that caches their output.

pub mod types;
pub mod validator;
pub mod builder;
pub mod registry;

pub use types::*;
pub use validator::*;
pub use builder::*;
pub use registry::*;
