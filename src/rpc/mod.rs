//! Worker RPC Module
//!
//! The wire contract between the controller and its workers: a framed binary
//! protocol over TCP. Each frame is a 4-byte big-endian length prefix
//! followed by a bincode-encoded message.
//!
//! ## Submodules
//! - **`protocol`**: message types (requests, responses, container spec) and
//!   the frame codec.
//! - **`client`**: the controller-side client. Every call carries a deadline
//!   and the result distinguishes network failures (connection refused,
//!   timeout, broken frame) from logical worker errors, because the scheduler
//!   reacts differently to the two.
//! - **`server`**: the worker-side accept loop dispatching requests to the
//!   worker service.

pub mod client;
pub mod protocol;
pub mod server;

#[cfg(test)]
mod tests;

pub use client::{container_spec, RpcClient, RpcError, WorkerClient};
