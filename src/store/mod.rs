//! State Store Module
//!
//! The single source of truth for task and node records. Every state change
//! made by the scheduler, the task service or the node registry goes through
//! this store; no scheduling state is kept anywhere else between ticks.
//!
//! ## Core Concepts
//! - **Tables**: two concurrent maps, task-id -> task and host -> node.
//! - **Queries**: tasks are listed by state set and host set with pagination,
//!   nodes by active flag.
//! - **Projection**: a view selector controls which task fields are returned
//!   (MINIMAL, BASIC or FULL).

pub mod memory;

#[cfg(test)]
mod tests;

pub use memory::{MemoryStore, StoreError};
