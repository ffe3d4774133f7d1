use crate::nodes::registry::{NodeRegistry, PlacementError};
use crate::nodes::types::Node;
use crate::rpc::client::{container_spec, RpcError, WorkerClient};
use crate::store::MemoryStore;
use crate::tasks::types::{ExecutorLog, Metrics, State, Task, TaskLog};

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Cap on concurrent RPCs against a single worker, so a large fleet of tasks
/// on one node cannot overrun the worker's connection limits.
const PER_NODE_CONNECTION_LIMIT: usize = 32;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// The task-lifecycle driver. One instance per controller process.
pub struct Scheduler {
    store: Arc<MemoryStore>,
    client: Arc<dyn WorkerClient>,
    registry: Arc<NodeRegistry>,
    interval: Duration,
    permits: DashMap<String, Arc<Semaphore>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<MemoryStore>,
        client: Arc<dyn WorkerClient>,
        registry: Arc<NodeRegistry>,
        interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            client,
            registry,
            interval,
            permits: DashMap::new(),
        })
    }

    /// Spawns the tick loop and returns.
    pub fn start(self: Arc<Self>) {
        tracing::info!("Starting scheduler (tick every {:?})", self.interval);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            loop {
                interval.tick().await;
                self.tick().await;
            }
        });
    }

    /// One full iteration of the three phases. Public so tests can drive the
    /// loop deterministically.
    ///
    /// The phase work lists are snapshotted up front: a task placed in phase
    /// 1 is not run until the next tick, which guarantees that no task id has
    /// work units in two phases of the same tick.
    pub async fn tick(&self) {
        let queued = self.store.tasks_in_states(&[State::Queued]);
        let initializing = self.store.tasks_in_states(&[State::Initializing]);
        let running = self.store.tasks_in_states(&[State::Running]);

        self.initialize_tasks(queued).await;
        self.run_tasks(initializing).await;
        self.check_tasks(running).await;
    }

    /// Phase 1: match queued tasks to nodes.
    ///
    /// Placement is sequential on purpose: each successful placement is
    /// persisted before the next request, so usage aggregation observes it
    /// and cannot hand out the same capacity twice.
    async fn initialize_tasks(&self, queued: Vec<Task>) {
        for mut task in queued {
            match self.registry.request(&task.resources) {
                Ok(node) => {
                    task.host = node.host.clone();
                    task.state = State::Initializing;
                    task.logs.push(TaskLog {
                        start_time: Some(Utc::now()),
                        ..TaskLog::default()
                    });
                    if let Err(e) = self.store.update_task(task.clone()) {
                        tracing::error!("Unable to update task {}: {}", task.id, e);
                        continue;
                    }
                    tracing::info!("Task {} initialized on {}", task.id, node.host);
                }
                Err(PlacementError::NoActiveNodes) => {
                    // Nowhere to place anything; the rest of the queue can wait.
                    tracing::warn!("No active nodes");
                    return;
                }
                Err(PlacementError::NoEnoughResources { .. }) => {
                    // Capacity may free up; try again next tick.
                    continue;
                }
            }
        }
    }

    /// Phase 2: start containers for initializing tasks, concurrently.
    async fn run_tasks(&self, initializing: Vec<Task>) {
        let mut units = JoinSet::new();
        for task in initializing {
            let Some(node) = self.load_node(&task) else {
                continue;
            };
            let store = self.store.clone();
            let client = self.client.clone();
            let permits = self.node_permits(&node.host);
            units.spawn(async move {
                let _permit = permits.acquire_owned().await;
                run_task(store, client, task, node).await;
            });
        }
        while units.join_next().await.is_some() {}
    }

    /// Phase 3: poll running tasks, concurrently.
    async fn check_tasks(&self, running: Vec<Task>) {
        let mut units = JoinSet::new();
        for task in running {
            let Some(node) = self.load_node(&task) else {
                continue;
            };
            let store = self.store.clone();
            let client = self.client.clone();
            let permits = self.node_permits(&node.host);
            units.spawn(async move {
                let _permit = permits.acquire_owned().await;
                check_task(store, client, task, node).await;
            });
        }
        while units.join_next().await.is_some() {}
    }

    fn load_node(&self, task: &Task) -> Option<Node> {
        match self.store.get_node(&task.host) {
            Ok(node) => Some(node),
            Err(e) => {
                tracing::error!("Unable to get node for task {}: {}", task.id, e);
                None
            }
        }
    }

    fn node_permits(&self, host: &str) -> Arc<Semaphore> {
        self.permits
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(PER_NODE_CONNECTION_LIMIT)))
            .clone()
    }
}

/// Starts the container of one initializing task.
///
/// A network failure leaves the task as it is: the worker may never have
/// received the request, and the same container id is retried next tick. A
/// logical failure is terminal.
async fn run_task(
    store: Arc<MemoryStore>,
    client: Arc<dyn WorkerClient>,
    mut task: Task,
    node: Node,
) {
    match client
        .run_container(&node.address(), &container_spec(&task))
        .await
    {
        Ok(()) => {
            task.state = State::Running;
            task.metrics = Some(Metrics::default());
            tracing::info!("Task {} running on {}", task.id, node.host);
        }
        Err(RpcError::Network(e)) => {
            tracing::warn!("Network error running task {} on {}: {}", task.id, node.host, e);
        }
        Err(RpcError::Logical(e)) => {
            task.state = State::SystemError;
            if let Some(log) = task.current_log_mut() {
                log.system_logs = vec![e.clone()];
            }
            task.close_log(Utc::now());
            tracing::error!("Unable to run task {} on {}: {}", task.id, node.host, e);
        }
    }

    if let Err(e) = store.update_task(task.clone()) {
        tracing::error!("Unable to update task {}: {}", task.id, e);
    }
}

/// Polls the container of one running task and reaps it when it exits.
async fn check_task(
    store: Arc<MemoryStore>,
    client: Arc<dyn WorkerClient>,
    mut task: Task,
    node: Node,
) {
    match client
        .check_container(&node.address(), &container_spec(&task))
        .await
    {
        Ok(state) if state.running => {
            let metrics = task.metrics.get_or_insert_with(Metrics::default);
            // cpu_time and memory only ever grow; cpu_percent is a gauge.
            metrics.cpu_time = metrics.cpu_time.max(state.cpu_time);
            metrics.memory_bytes = metrics.memory_bytes.max(state.memory);
            metrics.cpu_percentage = state.cpu_percent;
        }
        Ok(state) => {
            task.state = if state.exit_code == 0 {
                State::Complete
            } else {
                State::ExecutorError
            };
            if let Some(log) = task.current_log_mut() {
                log.executor_logs = vec![ExecutorLog {
                    start_time: state.start,
                    end_time: state.end,
                    stdout: state.stdout,
                    stderr: state.stderr,
                    exit_code: state.exit_code,
                }];
            }
            task.close_log(Utc::now());
            tracing::info!(
                "Task {} finished on {} with state {}",
                task.id,
                node.host,
                task.state
            );
        }
        Err(RpcError::Network(e)) => {
            tracing::warn!(
                "Network error checking task {} on {}: {}",
                task.id,
                node.host,
                e
            );
        }
        Err(RpcError::Logical(e)) => {
            task.state = State::SystemError;
            if let Some(log) = task.current_log_mut() {
                log.system_logs.push(e.clone());
            }
            task.close_log(Utc::now());
            tracing::error!("Unable to check task {} on {}: {}", task.id, node.host, e);
        }
    }

    if let Err(e) = store.update_task(task.clone()) {
        tracing::error!("Unable to update task {}: {}", task.id, e);
    }
}
