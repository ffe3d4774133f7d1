use axum::routing::{get, post};
use axum::{Extension, Router};
use tes_fleet::nodes::handlers::{
    handle_enable_node, handle_get_node, handle_list_nodes, handle_node_action,
};
use tes_fleet::nodes::NodeRegistry;
use tes_fleet::rpc::client::RpcClient;
use tes_fleet::rpc::server;
use tes_fleet::scheduler::scheduler::DEFAULT_TICK_INTERVAL;
use tes_fleet::scheduler::Scheduler;
use tes_fleet::store::MemoryStore;
use tes_fleet::tasks::handlers::{
    handle_create_task, handle_get_task, handle_list_tasks, handle_service_info,
    handle_task_action,
};
use tes_fleet::tasks::protocol::{
    ENDPOINT_NODE, ENDPOINT_NODES, ENDPOINT_SERVICE_INFO, ENDPOINT_TASK, ENDPOINT_TASKS,
};
use tes_fleet::tasks::TaskService;
use tes_fleet::worker::WorkerService;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} controller --bind <addr:port> [--interval <secs>]", args[0]);
        eprintln!("       {} worker --bind <addr:port> [--cpu-cores <n>] [--ram-gb <gb>]", args[0]);
        std::process::exit(1);
    }

    let role = args[1].clone();

    let mut bind_addr: Option<SocketAddr> = None;
    let mut interval = DEFAULT_TICK_INTERVAL;
    let mut cpu_cores: i32 = 0;
    let mut ram_gb: f64 = 0.0;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" => {
                bind_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--interval" => {
                interval = Duration::from_secs(args[i + 1].parse()?);
                i += 2;
            }
            "--cpu-cores" => {
                cpu_cores = args[i + 1].parse()?;
                i += 2;
            }
            "--ram-gb" => {
                ram_gb = args[i + 1].parse()?;
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let bind_addr = bind_addr.expect("--bind is required");

    match role.as_str() {
        "controller" => run_controller(bind_addr, interval).await,
        "worker" => run_worker(bind_addr, cpu_cores, ram_gb).await,
        other => {
            eprintln!("Unknown role: {} (expected controller or worker)", other);
            std::process::exit(1);
        }
    }
}

async fn run_controller(bind_addr: SocketAddr, interval: Duration) -> anyhow::Result<()> {
    tracing::info!("Starting controller on {}", bind_addr);

    let store = Arc::new(MemoryStore::new());
    let client = Arc::new(RpcClient::new());
    let registry = NodeRegistry::new(store.clone(), client.clone());
    let tasks = TaskService::new(store.clone(), client.clone());

    let scheduler = Scheduler::new(store.clone(), client, registry.clone(), interval);
    scheduler.start();

    let app = Router::new()
        // TES surface
        .route(ENDPOINT_TASKS, post(handle_create_task).get(handle_list_tasks))
        .route(ENDPOINT_TASK, get(handle_get_task).post(handle_task_action))
        .route(ENDPOINT_SERVICE_INFO, get(handle_service_info))
        // Node management
        .route(ENDPOINT_NODES, get(handle_list_nodes).post(handle_enable_node))
        .route(ENDPOINT_NODE, get(handle_get_node).post(handle_node_action))
        .layer(Extension(registry))
        .layer(Extension(tasks));

    tracing::info!("HTTP server listening on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn run_worker(bind_addr: SocketAddr, cpu_cores: i32, ram_gb: f64) -> anyhow::Result<()> {
    let worker = Arc::new(WorkerService::new(cpu_cores, ram_gb)?);
    let info = worker.info();
    tracing::info!(
        "Starting worker on {} with {} CPU cores and {:.2}GB RAM",
        bind_addr,
        info.cpu_cores,
        info.ram_gb
    );

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    server::serve(listener, worker).await;

    Ok(())
}
