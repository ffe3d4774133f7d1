use super::protocol::{read_frame, write_frame, WorkerRequest};
use crate::worker::WorkerService;

use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

/// Accept loop of the worker RPC surface. One task per connection; a
/// connection serves frames until the peer closes it.
pub async fn serve(listener: TcpListener, worker: Arc<WorkerService>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tracing::debug!("Accepted connection from {}", peer);
                let worker = worker.clone();
                tokio::spawn(async move {
                    handle_connection(stream, worker).await;
                });
            }
            Err(e) => {
                tracing::warn!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_connection(mut stream: TcpStream, worker: Arc<WorkerService>) {
    loop {
        let request: WorkerRequest = match read_frame(&mut stream).await {
            Ok(request) => request,
            // EOF or a broken frame; either way the conversation is over.
            Err(_) => return,
        };

        let response = worker.handle(request).await;

        // Logical failures travel back as a payload, never by dropping the
        // connection: a dropped connection would be indistinguishable from
        // a network failure on the controller side.
        if let Err(e) = write_frame(&mut stream, &response).await {
            tracing::warn!("Failed to write response frame: {}", e);
            return;
        }
    }
}
