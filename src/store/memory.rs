use crate::nodes::types::Node;
use crate::tasks::types::{State, Task, View};

use dashmap::DashMap;

/// Failure of a store operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Concurrent in-memory store of task and node records.
///
/// All operations are safe under concurrent calls from the scheduler work
/// units and the HTTP handlers. Single-row reads observe a consistent row;
/// multi-row scans are not snapshot-consistent, which the callers tolerate.
pub struct MemoryStore {
    tasks: DashMap<String, Task>,
    nodes: DashMap<String, Node>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
            nodes: DashMap::new(),
        }
    }

    /// Inserts a new task. The id must be unique.
    pub fn save_task(&self, task: Task) -> Result<(), StoreError> {
        if self.tasks.contains_key(&task.id) {
            return Err(StoreError::Conflict(format!(
                "task {} already exists",
                task.id
            )));
        }
        self.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    pub fn get_task(&self, id: &str) -> Result<Task, StoreError> {
        self.tasks
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(format!("task {}", id)))
    }

    /// Atomically replaces a task record by id.
    pub fn update_task(&self, task: Task) -> Result<(), StoreError> {
        match self.tasks.get_mut(&task.id) {
            Some(mut entry) => {
                *entry.value_mut() = task;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("task {}", task.id))),
        }
    }

    /// Lists tasks matching the intersection of the given filters, ordered by
    /// creation time then id. `limit == 0` means no limit. The view selector
    /// controls field projection.
    pub fn list_tasks(
        &self,
        limit: usize,
        skip: usize,
        view: View,
        name_prefix: Option<&str>,
        hosts: Option<&[String]>,
        states: Option<&[State]>,
    ) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|entry| {
                let t = entry.value();
                if let Some(prefix) = name_prefix {
                    if !t.name.starts_with(prefix) {
                        return false;
                    }
                }
                if let Some(hosts) = hosts {
                    if !hosts.is_empty() && !hosts.contains(&t.host) {
                        return false;
                    }
                }
                if let Some(states) = states {
                    if !states.is_empty() && !states.contains(&t.state) {
                        return false;
                    }
                }
                true
            })
            .map(|entry| entry.value().clone())
            .collect();

        tasks.sort_by(|a, b| {
            a.creation_time
                .cmp(&b.creation_time)
                .then_with(|| a.id.cmp(&b.id))
        });

        let take = if limit == 0 { usize::MAX } else { limit };
        tasks
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|t| project_view(t, view))
            .collect()
    }

    /// Convenience scan by state set with full projection, used by the
    /// scheduler phases and the usage aggregation.
    pub fn tasks_in_states(&self, states: &[State]) -> Vec<Task> {
        self.list_tasks(0, 0, View::Full, None, None, Some(states))
    }

    pub fn list_nodes(&self, active: Option<bool>) -> Vec<Node> {
        let mut nodes: Vec<Node> = self
            .nodes
            .iter()
            .filter(|entry| active.map_or(true, |a| entry.value().active == a))
            .map(|entry| entry.value().clone())
            .collect();
        nodes.sort_by(|a, b| a.host.cmp(&b.host));
        nodes
    }

    pub fn get_node(&self, host: &str) -> Result<Node, StoreError> {
        self.nodes
            .get(host)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(format!("node {}", host)))
    }

    /// Idempotent upsert keyed by host.
    pub fn add_node(&self, node: Node) {
        self.nodes.insert(node.host.clone(), node);
    }

    pub fn update_node(&self, node: Node) -> Result<(), StoreError> {
        match self.nodes.get_mut(&node.host) {
            Some(mut entry) => {
                *entry.value_mut() = node;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("node {}", node.host))),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies the view projection to a task record.
///
/// MINIMAL keeps only id and state. BASIC drops the bulky fields: executor
/// stdout/stderr and system logs. FULL passes everything through.
pub fn project_view(task: Task, view: View) -> Task {
    match view {
        View::Minimal => Task {
            id: task.id,
            state: task.state,
            ..Task::default()
        },
        View::Basic => {
            let mut task = task;
            for log in &mut task.logs {
                log.system_logs.clear();
                for exec_log in &mut log.executor_logs {
                    exec_log.stdout.clear();
                    exec_log.stderr.clear();
                }
            }
            task
        }
        View::Full => task,
    }
}
