//! Scheduler Module
//!
//! The controller's monitor loop. Each tick runs three sequential phases:
//!
//! 1. **Initialize**: queued tasks are matched to a node by the placement
//!    policy and stamped `INITIALIZING`.
//! 2. **Run**: initializing tasks get their container started on the
//!    assigned worker and become `RUNNING`.
//! 3. **Check**: running tasks are polled; live ones update metrics, exited
//!    ones are reaped into a terminal state.
//!
//! Within phases 2 and 3 the per-task work units run concurrently, each
//! bounded by the RPC deadline and a per-node connection limit, and the tick
//! joins them before moving on. Every state change goes through the store,
//! which is what makes the loop safe to restart.

pub mod scheduler;


pub use scheduler::Scheduler;
