pub mod types;
pub mod merge;
pub mod loader;

pub use types::*;
pub use merge::*;
