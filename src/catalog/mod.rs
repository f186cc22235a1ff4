mod aggregation;
mod propagation;
mod service;
mod storage;
mod types;


pub use aggregation::{PriceAggregate, Subtree};
pub use service::{CatalogService, SALES_WINDOW_HOURS};
pub use storage::{CatalogConfig, CatalogStorage};
pub use types::{CatalogError, Node, NodeId, NodeInput, NodeKind, NodeView};
