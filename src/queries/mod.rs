//! Query definitions and the registry that owns them

pub mod definition;
pub mod registry;

pub use definition::{QueryDefinition, DEFAULT_TIMEOUT_SECS};
pub use registry::{parse_definitions, QueryRegistry, RegistryError};

/// Built-in definitions, in the same format as a definitions file
pub const DEFAULT_QUERIES: &str = include_str!("defaults.ini");
