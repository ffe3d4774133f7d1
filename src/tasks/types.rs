use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a task.
///
/// `Queued` tasks wait for placement. `Initializing` tasks have a node
/// assigned but no container yet. `Running` tasks have a live container.
/// The four terminal states are never left. `Paused` is accepted in filters
/// and cancellation but the controller itself never transitions into it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    #[default]
    Queued,
    Initializing,
    Running,
    Paused,
    Complete,
    ExecutorError,
    SystemError,
    Canceled,
}

impl State {
    /// Active tasks occupy (or are about to occupy) resources on a node.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            State::Queued | State::Initializing | State::Running | State::Paused
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            State::Complete | State::ExecutorError | State::SystemError | State::Canceled
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Queued => "QUEUED",
            State::Initializing => "INITIALIZING",
            State::Running => "RUNNING",
            State::Paused => "PAUSED",
            State::Complete => "COMPLETE",
            State::ExecutorError => "EXECUTOR_ERROR",
            State::SystemError => "SYSTEM_ERROR",
            State::Canceled => "CANCELED",
        };
        f.write_str(name)
    }
}

impl FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(State::Queued),
            "INITIALIZING" => Ok(State::Initializing),
            "RUNNING" => Ok(State::Running),
            "PAUSED" => Ok(State::Paused),
            "COMPLETE" => Ok(State::Complete),
            "EXECUTOR_ERROR" => Ok(State::ExecutorError),
            "SYSTEM_ERROR" => Ok(State::SystemError),
            "CANCELED" => Ok(State::Canceled),
            other => Err(format!("unknown task state: {}", other)),
        }
    }
}

/// Field projection applied when returning tasks.
///
/// `Minimal` returns only id and state. `Basic` omits stdout/stderr of
/// executor logs and system logs. `Full` returns every field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum View {
    #[default]
    Minimal,
    Basic,
    Full,
}

impl FromStr for View {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MINIMAL" | "" => Ok(View::Minimal),
            "BASIC" => Ok(View::Basic),
            "FULL" => Ok(View::Full),
            other => Err(format!("unknown view: {}", other)),
        }
    }
}

/// Computing resources requested by a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resources {
    #[serde(default)]
    pub cpu_cores: i32,
    #[serde(default)]
    pub ram_gb: f64,
}

/// A single command execution inside a container image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Executor {
    pub image: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub workdir: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// File or directory made available inside the container, read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Input {
    pub url: String,
    pub path: String,
}

/// File or directory written by the container, read-write on the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Output {
    pub url: String,
    pub path: String,
}

/// Log of a single executor run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorLog {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub exit_code: i32,
}

/// Log of one placement attempt. A task re-queued after its node is disabled
/// starts over with a fresh entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLog {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub system_logs: Vec<String>,
    #[serde(default)]
    pub executor_logs: Vec<ExecutorLog>,
}

/// Best-effort resource metrics sampled while the container runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub cpu_time: u64,
    pub cpu_percentage: f64,
    pub memory_bytes: u64,
}

/// A computational task submitted through the TES API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub state: State,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default)]
    pub executors: Vec<Executor>,
    #[serde(default)]
    pub inputs: Vec<Input>,
    #[serde(default)]
    pub outputs: Vec<Output>,
    /// Hostname of the worker currently or last assigned. Empty while queued;
    /// preserved in terminal states as post-mortem evidence.
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub logs: Vec<TaskLog>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
}

impl Task {
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// The log entry of the current placement attempt.
    pub fn current_log_mut(&mut self) -> Option<&mut TaskLog> {
        self.logs.last_mut()
    }

    /// Stamps `end_time` on the open log entry, if any.
    pub fn close_log(&mut self, now: DateTime<Utc>) {
        if let Some(log) = self.logs.last_mut() {
            log.end_time = Some(now);
        }
    }

    /// Resets the task to the queue after its node was disabled. Host, logs
    /// and metrics are cleared so the next placement starts clean.
    pub fn requeue(&mut self) {
        self.state = State::Queued;
        self.host.clear();
        self.logs.clear();
        self.metrics = None;
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task {} {} {}", self.id, self.state, self.host)
    }
}
