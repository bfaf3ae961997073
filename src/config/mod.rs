// src/config/mod.rs

//! Configuration for initdag.
//!
//! Responsibilities:
//! - Scheduler knobs (`options.rs`).
//! - The TOML-backed plan model used by the CLI (`model.rs`).
//! - Loading a plan from disk (`loader.rs`).
//! - Validating plan invariants such as unique providers and an acyclic
//!   dependency graph (`validate.rs`).

pub mod loader;
pub mod model;
pub mod options;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{ConfigSection, PlanFile, RawPlanFile, ReadySection, TaskConfig};
pub use options::SchedulerOptions;
