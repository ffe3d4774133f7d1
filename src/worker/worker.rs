use crate::rpc::protocol::{WorkerInfo, WorkerRequest, WorkerResponse};
use crate::runtime::DockerRuntime;

use anyhow::Result;
use sysinfo::System;

/// The service behind a worker's RPC port.
pub struct WorkerService {
    info: WorkerInfo,
    runtime: DockerRuntime,
}

/// Resolves the caps a worker advertises from its configuration and what it
/// identified on the host. Caps of zero fall back to the identified values;
/// caps above them are kept but warned about, since the operator may know
/// better than a cgroup-limited probe. Clamping is the controller's call at
/// enable time, not the worker's.
pub fn resolve_caps(
    cpu_cores: i32,
    ram_gb: f64,
    identified_cpu_cores: i32,
    identified_ram_gb: f64,
) -> (i32, f64) {
    let cpu_cores = if cpu_cores == 0 {
        identified_cpu_cores
    } else {
        if cpu_cores > identified_cpu_cores {
            tracing::warn!(
                "Configured with {} CPU cores but only {} identified",
                cpu_cores,
                identified_cpu_cores
            );
        }
        cpu_cores
    };

    let ram_gb = if ram_gb == 0.0 {
        identified_ram_gb
    } else {
        if ram_gb > identified_ram_gb {
            tracing::warn!(
                "Configured with {:.2}GB RAM but only {:.2}GB identified",
                ram_gb,
                identified_ram_gb
            );
        }
        ram_gb
    };

    (cpu_cores, ram_gb)
}

impl WorkerService {
    /// Connects to the container engine and identifies the host's resources.
    pub fn new(cpu_cores: i32, ram_gb: f64) -> Result<Self> {
        let runtime = DockerRuntime::connect()?;

        let system = System::new_all();
        let identified_cpu_cores = system.cpus().len() as i32;
        let identified_ram_gb = system.total_memory() as f64 / 1e9;

        let (cpu_cores, ram_gb) =
            resolve_caps(cpu_cores, ram_gb, identified_cpu_cores, identified_ram_gb);

        Ok(Self {
            info: WorkerInfo {
                cpu_cores,
                ram_gb,
                identified_cpu_cores,
                identified_ram_gb,
            },
            runtime,
        })
    }

    pub fn info(&self) -> &WorkerInfo {
        &self.info
    }

    /// Dispatches one RPC request. Logical failures are reported in the
    /// response payload; only transport problems surface as dropped frames.
    pub async fn handle(&self, request: WorkerRequest) -> WorkerResponse {
        match request {
            WorkerRequest::GetInfo => WorkerResponse::Info(self.info.clone()),
            WorkerRequest::RunContainer(container) => {
                // A failed pull is not fatal: the image may already exist
                // locally, and the create below fails loudly if it does not.
                if let Err(e) = self.runtime.pull(&container.image).await {
                    tracing::warn!("Unable to pull image {}: {}", container.image, e);
                }

                match self.runtime.run(&container).await {
                    Ok(()) => {
                        tracing::info!(
                            "Running container {} from image {}",
                            container.id,
                            container.image
                        );
                        WorkerResponse::Ack
                    }
                    Err(e) => {
                        tracing::error!("Unable to run container {}: {:#}", container.id, e);
                        WorkerResponse::Error(format!("{:#}", e))
                    }
                }
            }
            WorkerRequest::CheckContainer(container) => {
                match self.runtime.check(&container.id).await {
                    Ok(state) => {
                        if state.exited {
                            tracing::info!(
                                "Container {} exited with code {}",
                                container.id,
                                state.exit_code
                            );
                            self.runtime.remove(&container.id).await;
                        }
                        WorkerResponse::State(state)
                    }
                    Err(e) => {
                        tracing::error!("Unable to check container {}: {:#}", container.id, e);
                        WorkerResponse::Error(format!("{:#}", e))
                    }
                }
            }
            WorkerRequest::StopContainer(container) => {
                match self.runtime.stop(&container.id).await {
                    Ok(()) => {
                        tracing::info!("Container {} stopped", container.id);
                        self.runtime.remove(&container.id).await;
                        WorkerResponse::Ack
                    }
                    Err(e) => {
                        tracing::error!("Unable to stop container {}: {:#}", container.id, e);
                        WorkerResponse::Error(format!("{:#}", e))
                    }
                }
            }
        }
    }
}
