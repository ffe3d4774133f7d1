//! HTTP Request Handlers for Node Management
//!
//! Axum route handlers that expose the node registry: list and inspect
//! nodes with live usage, enable a worker, disable a worker with optional
//! cancellation of its tasks.

use super::registry::NodeRegistry;
use super::types::Node;
use crate::store::StoreError;

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ListNodesQuery {
    pub active: Option<bool>,
}

/// `GET /v1/nodes` — all nodes with live usage attached.
pub async fn handle_list_nodes(
    Extension(registry): Extension<Arc<NodeRegistry>>,
    Query(query): Query<ListNodesQuery>,
) -> Json<Vec<Node>> {
    Json(registry.list_with_usage(query.active))
}

/// `POST /v1/nodes` — enable a worker node.
pub async fn handle_enable_node(
    Extension(registry): Extension<Arc<NodeRegistry>>,
    Json(node): Json<Node>,
) -> (StatusCode, Json<serde_json::Value>) {
    match registry.enable(node).await {
        Ok(node) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "host": node.host })),
        ),
        Err(e) => {
            tracing::error!("Unable to enable node: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        }
    }
}

/// `GET /v1/nodes/{host}` — one node with live usage.
pub async fn handle_get_node(
    Extension(registry): Extension<Arc<NodeRegistry>>,
    Path(host): Path<String>,
) -> Result<Json<Node>, StatusCode> {
    match registry.get_with_usage(&host) {
        Ok(node) => Ok(Json(node)),
        Err(StoreError::NotFound(_)) => {
            tracing::warn!("Node {} not found", host);
            Err(StatusCode::NOT_FOUND)
        }
        Err(e) => {
            tracing::error!("Unable to get node {}: {}", host, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// `POST /v1/nodes/{host}:disable` — disable a node. The request body is a
/// bare boolean: whether to cancel and re-queue the node's tasks.
///
/// Axum's router cannot express the literal `{host}:disable` segment, so the
/// route matches the whole segment and the action suffix is split off here.
pub async fn handle_node_action(
    Extension(registry): Extension<Arc<NodeRegistry>>,
    Path(host_action): Path<String>,
    Json(cancel): Json<bool>,
) -> StatusCode {
    let Some((host, action)) = host_action.split_once(':') else {
        return StatusCode::NOT_FOUND;
    };
    if action != "disable" {
        tracing::warn!("Unknown node action: {}", action);
        return StatusCode::NOT_FOUND;
    }

    match registry.disable(host, cancel).await {
        Ok(()) => StatusCode::OK,
        Err(StoreError::NotFound(_)) => {
            tracing::warn!("Node {} not found", host);
            StatusCode::NOT_FOUND
        }
        Err(e) => {
            tracing::error!("Unable to disable node {}: {}", host, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
