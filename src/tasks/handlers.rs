//! HTTP Request Handlers for the TES Surface
//!
//! Axum route handlers translating GA4GH TES requests into task-service
//! calls. The list endpoint accepts repeated `state` and `node` parameters,
//! which axum's form-encoded `Query` extractor cannot represent, so the raw
//! query string is parsed here.

use super::protocol::{CancelTaskResponse, CreateTaskResponse, ListTasksResponse, ServiceInfo};
use super::service::{TaskError, TaskService};
use super::types::{State, Task, View};
use crate::store::StoreError;

use axum::extract::{Path, RawQuery};
use axum::http::StatusCode;
use axum::{Extension, Json};
use std::sync::Arc;

/// `POST /ga4gh/tes/v1/tasks` — submit a task.
pub async fn handle_create_task(
    Extension(service): Extension<Arc<TaskService>>,
    Json(task): Json<Task>,
) -> (StatusCode, Json<serde_json::Value>) {
    match service.create(task) {
        Ok(task) => (
            StatusCode::CREATED,
            Json(serde_json::to_value(CreateTaskResponse { id: task.id }).unwrap_or_default()),
        ),
        Err(e @ TaskError::InvalidExecutors(_)) => {
            tracing::warn!("Rejected task submission: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        }
        Err(e) => {
            tracing::error!("Unable to create task: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        }
    }
}

/// `GET /ga4gh/tes/v1/tasks/{id}` — fetch one task.
pub async fn handle_get_task(
    Extension(service): Extension<Arc<TaskService>>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Json<Task>, StatusCode> {
    let params = parse_query(query.as_deref().unwrap_or(""));
    let view = first_value(&params, "view")
        .and_then(|v| v.parse::<View>().ok())
        .unwrap_or(View::Full);

    match service.get(&id, view) {
        Ok(task) => Ok(Json(task)),
        Err(TaskError::Store(StoreError::NotFound(_))) => {
            tracing::warn!("Task {} not found", id);
            Err(StatusCode::NOT_FOUND)
        }
        Err(e) => {
            tracing::error!("Unable to get task {}: {}", id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// `GET /ga4gh/tes/v1/tasks` — list tasks with filters and pagination.
pub async fn handle_list_tasks(
    Extension(service): Extension<Arc<TaskService>>,
    RawQuery(query): RawQuery,
) -> Json<ListTasksResponse> {
    let params = parse_query(query.as_deref().unwrap_or(""));

    let name_prefix = first_value(&params, "name_prefix");
    let page_size = first_value(&params, "page_size").and_then(|v| v.parse().ok());
    let page_token = first_value(&params, "page_token");
    let view = first_value(&params, "view")
        .and_then(|v| v.parse::<View>().ok())
        .unwrap_or_default();

    let states: Vec<State> = params
        .iter()
        .filter(|(k, _)| k == "state")
        .filter_map(|(_, v)| v.parse().ok())
        .collect();
    let hosts: Vec<String> = params
        .iter()
        .filter(|(k, _)| k == "node")
        .map(|(_, v)| v.clone())
        .collect();

    Json(service.list(
        name_prefix.as_deref(),
        page_size,
        page_token.as_deref(),
        view,
        &states,
        &hosts,
    ))
}

/// `POST /ga4gh/tes/v1/tasks/{id}:cancel` — cancel a task.
///
/// The TES cancel URL puts the action in the same path segment as the id, so
/// the route matches the whole segment and the suffix is split off here.
pub async fn handle_task_action(
    Extension(service): Extension<Arc<TaskService>>,
    Path(id_action): Path<String>,
) -> (StatusCode, Json<CancelTaskResponse>) {
    let Some((id, action)) = id_action.split_once(':') else {
        return (StatusCode::NOT_FOUND, Json(CancelTaskResponse::default()));
    };
    if action != "cancel" {
        tracing::warn!("Unknown task action: {}", action);
        return (StatusCode::NOT_FOUND, Json(CancelTaskResponse::default()));
    }

    match service.cancel(id).await {
        Ok(()) => (StatusCode::OK, Json(CancelTaskResponse::default())),
        Err(TaskError::Store(StoreError::NotFound(_))) => {
            tracing::warn!("Task {} not found", id);
            (StatusCode::NOT_FOUND, Json(CancelTaskResponse::default()))
        }
        Err(e) => {
            tracing::error!("Unable to cancel task {}: {}", id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CancelTaskResponse::default()),
            )
        }
    }
}

/// `GET /ga4gh/tes/v1/service-info` — service metadata.
pub async fn handle_service_info(
    Extension(service): Extension<Arc<TaskService>>,
) -> Json<ServiceInfo> {
    Json(service.service_info.clone())
}

/// Splits a raw query string into ordered key/value pairs, decoding the
/// form-encoding escapes that can appear in TES filter values.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (percent_decode(k), percent_decode(v)),
            None => (percent_decode(pair), String::new()),
        })
        .collect()
}

fn first_value(params: &[(String, String)], key: &str) -> Option<String> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                match (
                    bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                    bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
                ) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi * 16 + lo) as u8);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
