//! HTTP interface
//!
//! A thin view over [`crate::catalog::CatalogService`]:
//! - [`types`] - request/response bodies and the timestamp wire format
//! - [`transport`] - Axum router and handlers

pub mod transport;
pub mod types;

pub use transport::{catalog_router, CatalogHttpState};
pub use types::{ApiError, ErrorBody, ShopUnit, ShopUnitImport, ShopUnitImportRequest};
