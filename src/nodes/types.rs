use serde::{Deserialize, Serialize};

fn default_port() -> u16 {
    50051
}

/// A computing node that accepts and executes tasks. It has administrative
/// resource caps (`cpu_cores`, `ram_gb`), the resources the worker itself
/// identified at enable time, and real-time allocated resources (`usage`).
/// Host is its unique identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub active: bool,

    #[serde(default)]
    pub cpu_cores: i32,
    #[serde(default)]
    pub ram_gb: f64,

    #[serde(default)]
    pub identified_cpu_cores: i32,
    #[serde(default)]
    pub identified_ram_gb: f64,

    /// Live allocated resources, recomputed from active tasks on every read
    /// that needs it. Never persisted as part of the node record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl Node {
    /// Full worker address with RPC port.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Amount of computing resources already allocated to tasks on a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub tasks: usize,
    pub cpu_cores: i32,
    pub ram_gb: f64,
}
