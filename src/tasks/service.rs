use super::protocol::{ListTasksResponse, ServiceInfo, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use super::types::{State, Task, View};
use crate::rpc::client::{container_spec, WorkerClient};
use crate::store::{MemoryStore, StoreError};

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Failure of a task-service operation. Validation failures surface as 400,
/// store lookups as 404, everything else as 500.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("exactly one executor is required, got {0}")]
    InvalidExecutors(usize),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Task-facing operations of the controller: create, fetch, list, cancel.
pub struct TaskService {
    store: Arc<MemoryStore>,
    client: Arc<dyn WorkerClient>,
    pub service_info: ServiceInfo,
}

impl TaskService {
    pub fn new(store: Arc<MemoryStore>, client: Arc<dyn WorkerClient>) -> Arc<Self> {
        Arc::new(Self {
            store,
            client,
            service_info: ServiceInfo::default(),
        })
    }

    /// Accepts a submitted task: validates the executor count, assigns a
    /// fresh id, stamps the creation time and queues it.
    pub fn create(&self, mut task: Task) -> Result<Task, TaskError> {
        if task.executors.len() != 1 {
            return Err(TaskError::InvalidExecutors(task.executors.len()));
        }

        task.id = Uuid::new_v4().to_string();
        task.state = State::Queued;
        task.creation_time = Some(Utc::now());
        task.host.clear();
        task.logs = Vec::new();
        task.metrics = None;
        if task.resources.cpu_cores < 1 {
            task.resources.cpu_cores = 1;
        }

        self.store.save_task(task.clone())?;
        tracing::info!("Task {} created", task.id);
        Ok(task)
    }

    pub fn get(&self, id: &str, view: View) -> Result<Task, TaskError> {
        let task = self.store.get_task(id)?;
        Ok(crate::store::memory::project_view(task, view))
    }

    /// Lists tasks with TES pagination: `page_token` is the opaque offset of
    /// the next page; a full page yields a token for the one after.
    pub fn list(
        &self,
        name_prefix: Option<&str>,
        page_size: Option<usize>,
        page_token: Option<&str>,
        view: View,
        states: &[State],
        hosts: &[String],
    ) -> ListTasksResponse {
        let page_size = page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let skip: usize = page_token.and_then(|t| t.parse().ok()).unwrap_or(0);

        let states = (!states.is_empty()).then_some(states);
        let hosts = (!hosts.is_empty()).then_some(hosts);

        let tasks = self
            .store
            .list_tasks(page_size, skip, view, name_prefix, hosts, states);

        let next_page_token = (tasks.len() == page_size).then(|| (skip + page_size).to_string());
        ListTasksResponse {
            tasks,
            next_page_token,
        }
    }

    /// Cancels a task. Canceling a task already in a terminal state is a
    /// no-op. Tasks without a container yet are flipped directly; active
    /// containers get a best-effort stop RPC first, and the task is marked
    /// CANCELED regardless of the RPC outcome.
    pub async fn cancel(&self, id: &str) -> Result<(), TaskError> {
        let mut task = self.store.get_task(id)?;

        if !task.is_active() {
            return Ok(());
        }

        if matches!(task.state, State::Queued | State::Initializing) {
            task.state = State::Canceled;
            task.close_log(Utc::now());
            self.store.update_task(task)?;
            tracing::info!("Task {} canceled", id);
            return Ok(());
        }

        // RUNNING or PAUSED: there is (or was) a container on the node.
        let node = self.store.get_node(&task.host)?;
        if let Err(e) = self
            .client
            .stop_container(&node.address(), &container_spec(&task))
            .await
        {
            tracing::warn!(
                "Unable to stop container for task {} on {}: {}",
                id,
                task.host,
                e
            );
        }

        task.state = State::Canceled;
        task.close_log(Utc::now());
        self.store.update_task(task)?;
        tracing::info!("Task {} canceled", id);
        Ok(())
    }
}
