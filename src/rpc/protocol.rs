use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame. Container logs are the largest payload;
/// anything beyond this is a protocol violation, not data.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Requests the controller sends to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerRequest {
    GetInfo,
    RunContainer(Container),
    CheckContainer(Container),
    StopContainer(Container),
}

/// Responses a worker sends back. `Error` carries a logical failure: the
/// worker was reachable and answered, but the operation failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerResponse {
    Info(WorkerInfo),
    Ack,
    State(ContainerState),
    Error(String),
}

/// Computing resources of a worker: administrative caps and what the worker
/// identified on its own host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub cpu_cores: i32,
    pub ram_gb: f64,
    pub identified_cpu_cores: i32,
    pub identified_ram_gb: f64,
}

/// Everything a worker needs to run one container for one task. The id is
/// the task id and doubles as the container name, which makes reaping and
/// stopping idempotent per task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub image: String,
    pub command: Vec<String>,
    pub work_dir: String,
    pub env: HashMap<String, String>,
    pub inputs: Vec<Volume>,
    pub outputs: Vec<Volume>,
}

/// A host path made available inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub host_path: String,
    pub container_path: String,
}

/// Observed state of a container, as reported by `CheckContainer`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerState {
    pub running: bool,
    pub exited: bool,
    pub exit_code: i32,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub stdout: String,
    pub stderr: String,
    pub cpu_time: u64,
    pub cpu_percent: f64,
    pub memory: u64,
}

/// Writes one length-prefixed bincode frame.
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = bincode::serialize(msg)?;
    if payload.len() > MAX_FRAME_LEN {
        anyhow::bail!("frame of {} bytes exceeds limit", payload.len());
    }
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed bincode frame.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_LEN {
        anyhow::bail!("frame of {} bytes exceeds limit", len);
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(bincode::deserialize(&buf)?)
}
