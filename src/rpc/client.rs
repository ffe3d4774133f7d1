use super::protocol::{
    read_frame, write_frame, Container, ContainerState, Volume, WorkerInfo, WorkerRequest,
    WorkerResponse,
};
use crate::tasks::types::Task;

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Deadline for run/check/stop calls.
pub const CALL_DEADLINE: Duration = Duration::from_secs(30);
/// Deadline for the cheap info call used during node enable.
pub const INFO_DEADLINE: Duration = Duration::from_secs(10);

/// Failure of a worker call, split into the two categories the scheduler
/// reacts to differently. A `Network` error means the worker may never have
/// seen the request and the call is retried on a later tick; a `Logical`
/// error means the worker ran the operation and reported failure, which is
/// terminal for the task.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("network error: {0}")]
    Network(String),
    #[error("{0}")]
    Logical(String),
}

/// Controller-side view of a worker. Implemented by the TCP client below and
/// by in-process fakes in tests.
#[async_trait]
pub trait WorkerClient: Send + Sync {
    async fn get_info(&self, address: &str) -> Result<WorkerInfo, RpcError>;
    async fn run_container(&self, address: &str, container: &Container) -> Result<(), RpcError>;
    async fn check_container(
        &self,
        address: &str,
        container: &Container,
    ) -> Result<ContainerState, RpcError>;
    async fn stop_container(&self, address: &str, container: &Container) -> Result<(), RpcError>;
}

/// Maps a task to the container spec shipped to its worker. The task id is
/// the container id, so every placement attempt targets the same container
/// name and stop/check stay idempotent per task.
pub fn container_spec(task: &Task) -> Container {
    let executor = task.executors.first().cloned().unwrap_or_default();
    Container {
        id: task.id.clone(),
        image: executor.image,
        command: executor.command,
        work_dir: executor.workdir,
        env: executor.env,
        inputs: task
            .inputs
            .iter()
            .map(|i| Volume {
                host_path: i.url.clone(),
                container_path: i.path.clone(),
            })
            .collect(),
        outputs: task
            .outputs
            .iter()
            .map(|o| Volume {
                host_path: o.url.clone(),
                container_path: o.path.clone(),
            })
            .collect(),
    }
}

/// TCP client speaking the framed worker protocol. Dials per call; worker
/// calls are infrequent enough that connection reuse buys nothing over the
/// simplicity of a fresh stream.
pub struct RpcClient;

impl RpcClient {
    pub fn new() -> Self {
        Self
    }

    async fn call(
        &self,
        address: &str,
        request: WorkerRequest,
        deadline: Duration,
    ) -> Result<WorkerResponse, RpcError> {
        let exchange = async {
            let mut stream = TcpStream::connect(address).await?;
            write_frame(&mut stream, &request).await?;
            read_frame::<_, WorkerResponse>(&mut stream).await
        };

        let response = match timeout(deadline, exchange).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(RpcError::Network(e.to_string())),
            Err(_) => {
                return Err(RpcError::Network(format!(
                    "deadline of {:?} exceeded calling {}",
                    deadline, address
                )))
            }
        };

        match response {
            WorkerResponse::Error(message) => Err(RpcError::Logical(message)),
            other => Ok(other),
        }
    }
}

impl Default for RpcClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerClient for RpcClient {
    async fn get_info(&self, address: &str) -> Result<WorkerInfo, RpcError> {
        match self.call(address, WorkerRequest::GetInfo, INFO_DEADLINE).await? {
            WorkerResponse::Info(info) => Ok(info),
            other => Err(RpcError::Logical(format!(
                "unexpected response to GetInfo: {:?}",
                other
            ))),
        }
    }

    async fn run_container(&self, address: &str, container: &Container) -> Result<(), RpcError> {
        match self
            .call(
                address,
                WorkerRequest::RunContainer(container.clone()),
                CALL_DEADLINE,
            )
            .await?
        {
            WorkerResponse::Ack => Ok(()),
            other => Err(RpcError::Logical(format!(
                "unexpected response to RunContainer: {:?}",
                other
            ))),
        }
    }

    async fn check_container(
        &self,
        address: &str,
        container: &Container,
    ) -> Result<ContainerState, RpcError> {
        match self
            .call(
                address,
                WorkerRequest::CheckContainer(container.clone()),
                CALL_DEADLINE,
            )
            .await?
        {
            WorkerResponse::State(state) => Ok(state),
            other => Err(RpcError::Logical(format!(
                "unexpected response to CheckContainer: {:?}",
                other
            ))),
        }
    }

    async fn stop_container(&self, address: &str, container: &Container) -> Result<(), RpcError> {
        match self
            .call(
                address,
                WorkerRequest::StopContainer(container.clone()),
                CALL_DEADLINE,
            )
            .await?
        {
            WorkerResponse::Ack => Ok(()),
            other => Err(RpcError::Logical(format!(
                "unexpected response to StopContainer: {:?}",
                other
            ))),
        }
    }
}
