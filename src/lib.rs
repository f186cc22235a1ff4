pub mod builder;
pub mod catalog;
pub mod http;

// Re-export commonly used items
pub use builder::build_app;
pub use catalog::{CatalogConfig, CatalogError, CatalogService, CatalogStorage, NodeId, NodeInput, NodeKind};
