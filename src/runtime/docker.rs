use super::mounts::bind_mounts;
use crate::rpc::protocol::{Container, ContainerState};

use anyhow::{Context, Result};
use bollard::container::{
    Config, CreateContainerOptions, LogsOptions, RemoveContainerOptions, StartContainerOptions,
    StatsOptions,
};
use bollard::image::CreateImageOptions;
use bollard::secret::{HostConfig, Mount, MountTypeEnum};
use bollard::Docker;
use chrono::{DateTime, Utc};
use futures_util::stream::StreamExt;

/// Wrapper around the local Docker engine. One container per task; the task
/// id is the container name, which keeps stop and remove idempotent.
pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    /// Connects to the local Docker daemon socket.
    pub fn connect() -> Result<Self> {
        let client = Docker::connect_with_unix_defaults()
            .context("unable to connect to the Docker daemon")?;
        Ok(Self { client })
    }

    /// Pulls an image, draining the progress stream. Callers treat failure
    /// as non-fatal: the image may already be present locally.
    pub async fn pull(&self, image: &str) -> Result<()> {
        let mut stream = self.client.create_image(
            Some(CreateImageOptions {
                from_image: image.to_string(),
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(progress) = stream.next().await {
            progress.context("image pull failed")?;
        }
        Ok(())
    }

    /// Creates and starts the container for a task.
    pub async fn run(&self, container: &Container) -> Result<()> {
        let env: Vec<String> = container
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let mounts: Vec<Mount> = bind_mounts(&container.inputs, &container.outputs)
            .into_iter()
            .map(|m| Mount {
                typ: Some(MountTypeEnum::BIND),
                source: Some(m.host_path),
                target: Some(m.container_path),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();

        let config = Config {
            image: Some(container.image.clone()),
            cmd: Some(container.command.clone()),
            working_dir: (!container.work_dir.is_empty()).then(|| container.work_dir.clone()),
            env: Some(env),
            host_config: Some(HostConfig {
                mounts: Some(mounts),
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: container.id.clone(),
            ..Default::default()
        };

        let created = self
            .client
            .create_container(Some(options), config)
            .await
            .context("unable to create container")?;

        self.client
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .context("unable to start container")?;

        Ok(())
    }

    /// Inspects a container. Running containers also get a resource sample;
    /// exited ones report exit code, timestamps and collected output.
    pub async fn check(&self, id: &str) -> Result<ContainerState> {
        let inspected = self
            .client
            .inspect_container(id, None)
            .await
            .context("unable to inspect container")?;

        let engine_state = inspected.state.unwrap_or_default();
        let running = engine_state.running.unwrap_or(false);

        let mut state = ContainerState {
            running,
            exited: !running,
            ..Default::default()
        };

        if running {
            let (cpu_percent, cpu_time, memory) = self.sample_usage(id).await;
            state.cpu_percent = cpu_percent;
            state.cpu_time = cpu_time;
            state.memory = memory;
        } else {
            state.exit_code = engine_state.exit_code.unwrap_or(0) as i32;
            state.start = engine_state
                .started_at
                .as_deref()
                .and_then(parse_docker_time);
            state.end = engine_state
                .finished_at
                .as_deref()
                .and_then(parse_docker_time);
            let (stdout, stderr) = self.collect_logs(id).await;
            state.stdout = stdout;
            state.stderr = stderr;
        }

        Ok(state)
    }

    pub async fn stop(&self, id: &str) -> Result<()> {
        self.client
            .stop_container(id, None)
            .await
            .context("unable to stop container")?;
        Ok(())
    }

    /// Force-removes a container. Best-effort: a missing container is fine.
    pub async fn remove(&self, id: &str) {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.client.remove_container(id, Some(options)).await {
            Ok(()) => tracing::info!("Container {} removed", id),
            Err(e) => tracing::warn!("Unable to remove container {}: {}", id, e),
        }
    }

    /// One stats sample: cpu percentage over the last window, cumulative cpu
    /// time and current memory usage. Failures degrade to zeros; metrics are
    /// best-effort by contract.
    async fn sample_usage(&self, id: &str) -> (f64, u64, u64) {
        let options = StatsOptions {
            stream: false,
            one_shot: false,
        };
        let mut stream = self.client.stats(id, Some(options));

        let stats = match stream.next().await {
            Some(Ok(stats)) => stats,
            Some(Err(e)) => {
                tracing::warn!("Unable to get stats for container {}: {}", id, e);
                return (0.0, 0, 0);
            }
            None => return (0.0, 0, 0),
        };

        let cpu_delta = stats.cpu_stats.cpu_usage.total_usage as f64
            - stats.precpu_stats.cpu_usage.total_usage as f64;
        let system_delta = stats.cpu_stats.system_cpu_usage.unwrap_or(0) as f64
            - stats.precpu_stats.system_cpu_usage.unwrap_or(0) as f64;
        let online_cpus = stats.cpu_stats.online_cpus.unwrap_or(0) as f64;

        let mut cpu_percent = if system_delta > 0.0 {
            (cpu_delta / system_delta) * online_cpus * 100.0
        } else {
            0.0
        };
        if !cpu_percent.is_finite() {
            cpu_percent = 0.0;
        }

        let memory = stats.memory_stats.usage.unwrap_or(0);
        (cpu_percent, stats.cpu_stats.cpu_usage.total_usage, memory)
    }

    /// Gathers full stdout and stderr of an exited container.
    async fn collect_logs(&self, id: &str) -> (String, String) {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        };
        let mut stream = self.client.logs(id, Some(options));

        let mut stdout = String::new();
        let mut stderr = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bollard::container::LogOutput::StdOut { message }) => {
                    stdout.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(bollard::container::LogOutput::StdErr { message }) => {
                    stderr.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Unable to read logs of container {}: {}", id, e);
                    break;
                }
            }
        }
        (stdout, stderr)
    }
}

/// Docker reports RFC 3339 timestamps, with `0001-01-01T00:00:00Z` standing
/// in for "never".
fn parse_docker_time(value: &str) -> Option<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(value).ok()?;
    let parsed = parsed.with_timezone(&Utc);
    (parsed.timestamp() > 0).then_some(parsed)
}
