// src/registry/mod.rs

//! Capability registry and the fixpoint run loop.
//!
//! - [`task_info`] holds initializer metadata and lifecycle state.
//! - [`state`] is the synchronous registry (providers, provided set, pending
//!   set, gate state) with no locking and no IO.
//! - [`scheduler`] wraps the state in a shared handle, invokes actions and
//!   drives passes until nothing new becomes runnable.

pub mod scheduler;
pub mod state;
pub mod task_info;

pub use scheduler::{Scheduler, TaskContext};
pub use state::{FailureHandler, GateState};
pub use task_info::{TaskId, TaskRunState};
