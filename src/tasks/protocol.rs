//! TES API Contracts
//!
//! Route constants and request/response bodies of the GA4GH Task Execution
//! Service surface plus the node-management endpoints.

use super::types::Task;
use serde::{Deserialize, Serialize};

// --- API Endpoints ---

/// Task collection: POST to create, GET to list.
pub const ENDPOINT_TASKS: &str = "/ga4gh/tes/v1/tasks";
/// Single task: GET to fetch; POST with an `:cancel` suffix to cancel.
pub const ENDPOINT_TASK: &str = "/ga4gh/tes/v1/tasks/:id";
/// Service metadata document.
pub const ENDPOINT_SERVICE_INFO: &str = "/ga4gh/tes/v1/service-info";
/// Node collection: POST to enable, GET to list.
pub const ENDPOINT_NODES: &str = "/v1/nodes";
/// Single node: GET to fetch; POST with a `:disable` suffix to disable.
pub const ENDPOINT_NODE: &str = "/v1/nodes/:host";

// --- Pagination ---

pub const DEFAULT_PAGE_SIZE: usize = 256;
pub const MAX_PAGE_SIZE: usize = 2048;

// --- Bodies ---

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTaskResponse {
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListTasksResponse {
    pub tasks: Vec<Task>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Cancellation returns an empty JSON object on success.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CancelTaskResponse {}

/// Information about the service: storage details, documentation pointers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub doc: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub storage: Vec<String>,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            name: "tes-fleet".to_string(),
            doc: "Distributed task execution service for containerized genomics workflows."
                .to_string(),
            storage: vec!["NFS".to_string()],
        }
    }
}
