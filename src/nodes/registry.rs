use super::types::{Node, Usage};
use crate::rpc::client::{container_spec, WorkerClient};
use crate::store::{MemoryStore, StoreError};
use crate::tasks::types::{Resources, State, Task};

use std::collections::HashMap;
use std::sync::Arc;

/// Failure to place a task on the fleet.
#[derive(Debug, thiserror::Error)]
pub enum PlacementError {
    /// No node is enabled; there is nowhere to place anything.
    #[error("no active nodes")]
    NoActiveNodes,
    /// Active nodes exist but none has enough free resources.
    #[error("no active node has enough free resources: cpu={cpu_cores} ram={ram_gb:.2}GB")]
    NoEnoughResources { cpu_cores: i32, ram_gb: f64 },
}

/// Registry of worker nodes: enable/disable lifecycle, usage aggregation and
/// the best-fit placement decision.
pub struct NodeRegistry {
    store: Arc<MemoryStore>,
    client: Arc<dyn WorkerClient>,
}

impl NodeRegistry {
    pub fn new(store: Arc<MemoryStore>, client: Arc<dyn WorkerClient>) -> Arc<Self> {
        Arc::new(Self { store, client })
    }

    /// Enables a node, fetching what the worker identifies on its own host.
    /// Administrative caps of zero, or caps exceeding the identified values,
    /// are clamped down to the identified resources.
    pub async fn enable(&self, mut node: Node) -> anyhow::Result<Node> {
        let info = self
            .client
            .get_info(&node.address())
            .await
            .map_err(|e| anyhow::anyhow!("unable to reach worker {}: {}", node.address(), e))?;

        if node.cpu_cores > info.identified_cpu_cores {
            tracing::warn!(
                "Node {} capped at {} CPU cores but worker identified {}; clamping down",
                node.host,
                node.cpu_cores,
                info.identified_cpu_cores
            );
        }
        if node.cpu_cores == 0 || node.cpu_cores > info.identified_cpu_cores {
            node.cpu_cores = info.identified_cpu_cores;
        }

        if node.ram_gb > info.identified_ram_gb {
            tracing::warn!(
                "Node {} capped at {:.2}GB RAM but worker identified {:.2}GB; clamping down",
                node.host,
                node.ram_gb,
                info.identified_ram_gb
            );
        }
        if node.ram_gb == 0.0 || node.ram_gb > info.identified_ram_gb {
            node.ram_gb = info.identified_ram_gb;
        }

        node.identified_cpu_cores = info.identified_cpu_cores;
        node.identified_ram_gb = info.identified_ram_gb;
        node.active = true;
        node.usage = None;

        self.store.add_node(node.clone());
        tracing::info!(
            "Node {} enabled with {} CPU cores and {:.2}GB RAM",
            node.host,
            node.cpu_cores,
            node.ram_gb
        );
        Ok(node)
    }

    /// Disables a node so it is never selected for placement again. With
    /// `cancel` set, the node's active tasks are stopped best-effort and put
    /// back in the queue; that fan-out runs detached and this call returns
    /// before it completes.
    pub async fn disable(&self, host: &str, cancel: bool) -> Result<(), StoreError> {
        let mut node = self.store.get_node(host)?;
        node.active = false;
        node.usage = None;
        self.store.update_node(node.clone())?;
        tracing::info!("Node {} disabled", host);

        if cancel {
            let store = self.store.clone();
            let client = self.client.clone();
            tokio::spawn(async move {
                cancel_node_tasks(store, client, node).await;
            });
        }
        Ok(())
    }

    /// Recomputes live usage for the given nodes from the tasks currently
    /// assigned to them in INITIALIZING or RUNNING state. Purely derived;
    /// nothing is persisted.
    pub fn update_usage(&self, nodes: &mut [Node]) {
        let tasks = self
            .store
            .tasks_in_states(&[State::Initializing, State::Running]);

        let mut usage: HashMap<String, Usage> = HashMap::new();
        for task in &tasks {
            let entry = usage.entry(task.host.clone()).or_default();
            entry.tasks += 1;
            entry.cpu_cores += task.resources.cpu_cores;
            entry.ram_gb += task.resources.ram_gb;
        }

        for node in nodes {
            node.usage = Some(usage.remove(&node.host).unwrap_or_default());
        }
    }

    /// Selects a node with enough free resources for the requested task.
    ///
    /// Among feasible nodes the one with the least remaining free capacity
    /// after placement wins (best-fit); ties break by lexicographic host so
    /// the behavior stays deterministic and testable.
    pub fn request(&self, resources: &Resources) -> Result<Node, PlacementError> {
        let mut nodes = self.store.list_nodes(Some(true));
        if nodes.is_empty() {
            return Err(PlacementError::NoActiveNodes);
        }

        self.update_usage(&mut nodes);

        let mut best: Option<(f64, Node)> = None;
        for node in nodes {
            let usage = node.usage.clone().unwrap_or_default();
            let free_cpu = node.cpu_cores - usage.cpu_cores - resources.cpu_cores;
            let free_ram = node.ram_gb - usage.ram_gb - resources.ram_gb;
            if free_cpu < 0 || free_ram < 0.0 {
                continue;
            }

            let remaining = free_cpu as f64 + free_ram;
            let tighter = match &best {
                None => true,
                Some((best_remaining, best_node)) => {
                    remaining < *best_remaining
                        || (remaining == *best_remaining && node.host < best_node.host)
                }
            };
            if tighter {
                best = Some((remaining, node));
            }
        }

        best.map(|(_, node)| node)
            .ok_or(PlacementError::NoEnoughResources {
                cpu_cores: resources.cpu_cores,
                ram_gb: resources.ram_gb,
            })
    }

    /// Returns a node with its usage attached, for the HTTP surface.
    pub fn get_with_usage(&self, host: &str) -> Result<Node, StoreError> {
        let mut node = self.store.get_node(host)?;
        self.update_usage(std::slice::from_mut(&mut node));
        Ok(node)
    }

    /// All nodes with usage attached, optionally filtered by active flag.
    pub fn list_with_usage(&self, active: Option<bool>) -> Vec<Node> {
        let mut nodes = self.store.list_nodes(active);
        self.update_usage(&mut nodes);
        nodes
    }
}

/// Stops and re-queues every active task assigned to a disabled node. Stop
/// failures are logged and do not block the re-queue: the worker may be
/// gone entirely, and container ids are per-task, so a later duplicate stop
/// is harmless.
pub(crate) async fn cancel_node_tasks(
    store: Arc<MemoryStore>,
    client: Arc<dyn WorkerClient>,
    node: Node,
) {
    let tasks: Vec<Task> = store
        .tasks_in_states(&[State::Initializing, State::Running, State::Paused])
        .into_iter()
        .filter(|t| t.host == node.host)
        .collect();

    for mut task in tasks {
        if let Err(e) = client
            .stop_container(&node.address(), &container_spec(&task))
            .await
        {
            tracing::warn!(
                "Unable to stop container for task {} on {}: {}",
                task.id,
                node.host,
                e
            );
        }

        task.requeue();
        match store.update_task(task.clone()) {
            Ok(()) => tracing::info!("Task {} re-queued after node {} disabled", task.id, node.host),
            Err(e) => tracing::error!("Unable to re-queue task {}: {}", task.id, e),
        }
    }
}
