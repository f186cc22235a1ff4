//! HTTP transport
//!
//! Axum routes over [`CatalogService`]. Every failure is answered with an
//! [`ErrorBody`]: 404 for unknown ids, 400 for anything the request got wrong.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};

use super::types::{
    timestamp, ApiError, ErrorBody, SalesQuery, ShopUnit, ShopUnitImportRequest,
};
use crate::catalog::{CatalogService, NodeId, NodeInput};

/// Shared state for catalog HTTP handlers
#[derive(Clone)]
pub struct CatalogHttpState {
    pub service: Arc<CatalogService>,
}

/// Create an Axum router for the catalog endpoints
pub fn catalog_router(service: Arc<CatalogService>) -> Router {
    let state = CatalogHttpState { service };

    Router::new()
        .route("/imports", post(handle_import))
        .route("/nodes/:id", get(handle_get_node))
        .route("/delete/:id", delete(handle_delete))
        .route("/sales", get(handle_sales))
        .with_state(state)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Validation(detail) => {
                tracing::warn!(detail = %detail, "Rejected request");
                StatusCode::BAD_REQUEST
            }
            ApiError::Conflict(detail) => {
                tracing::warn!(detail = %detail, "Conflicting write");
                StatusCode::CONFLICT
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail = %detail, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ErrorBody {
            code: status.as_u16(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn parse_id(raw: &str) -> Result<NodeId, ApiError> {
    NodeId::parse_str(raw).map_err(ApiError::Validation)
}

/// Handle POST /imports
async fn handle_import(
    State(state): State<CatalogHttpState>,
    payload: Result<Json<ShopUnitImportRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;

    let Some(items) = request.items else {
        return Ok(StatusCode::OK);
    };

    let items: Vec<NodeInput> = items.into_iter().map(NodeInput::from).collect();
    tracing::debug!(items = items.len(), "Import request received");

    state
        .service
        .import_batch(items, request.update_date)
        .await?;

    Ok(StatusCode::OK)
}

/// Handle GET /nodes/{id}
async fn handle_get_node(
    State(state): State<CatalogHttpState>,
    Path(id): Path<String>,
) -> Result<Json<ShopUnit>, ApiError> {
    let id = parse_id(&id)?;
    let view = state.service.get_by_id(&id).await?;
    Ok(Json(ShopUnit::from(view)))
}

/// Handle DELETE /delete/{id}
async fn handle_delete(
    State(state): State<CatalogHttpState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    state.service.delete_by_id(&id).await?;
    Ok(StatusCode::OK)
}

/// Handle GET /sales?date=...
async fn handle_sales(
    State(state): State<CatalogHttpState>,
    query: Option<Query<SalesQuery>>,
) -> Result<Json<Vec<ShopUnit>>, ApiError> {
    let Some(Query(query)) = query else {
        return Err(ApiError::Validation("Missing date parameter".to_string()));
    };
    let as_of = timestamp::parse(&query.date)
        .map_err(|e| ApiError::Validation(format!("Invalid date {}: {}", query.date, e)))?;

    let items = state
        .service
        .updated_offers(as_of)
        .await?
        .into_iter()
        .map(ShopUnit::from)
        .collect();

    Ok(Json(items))
}
