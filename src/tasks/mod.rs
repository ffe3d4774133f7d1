//! Task Module
//!
//! The task data model, the task service and the TES HTTP surface.
//!
//! ## Responsibilities
//! - **`types`**: the task record, its state machine vocabulary and the view
//!   projection selector.
//! - **`service`**: validate/create, fetch, list and cancel tasks, enforcing
//!   the task-state invariants. Cancellation is the one side channel allowed
//!   to shortcut the scheduler's state machine.
//! - **`protocol`**: request/response bodies and route constants of the
//!   GA4GH TES API.
//! - **`handlers`**: axum handlers translating HTTP to service calls.

pub mod handlers;
pub mod protocol;
pub mod service;
pub mod types;


pub use service::{TaskError, TaskService};
