//! App builder - constructs a fully wired catalog service and router
//!
//! This module is used by both the main binary and the integration tests.

use std::sync::Arc;

use axum::Router;

use crate::catalog::{CatalogConfig, CatalogError, CatalogService, CatalogStorage};
use crate::http::catalog_router;

/// Open storage, build the service and mount it on a router.
///
/// The service is returned alongside the router so callers can drive the core
/// directly without going through HTTP.
pub async fn build_app(config: CatalogConfig) -> Result<(Router, Arc<CatalogService>), CatalogError> {
    let storage = Arc::new(CatalogStorage::new(config).await?);
    let service = Arc::new(CatalogService::new(storage));
    Ok((catalog_router(service.clone()), service))
}
