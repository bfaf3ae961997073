// src/errors.rs

//! Crate-wide error type and result alias.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::types::Capability;

#[derive(Error, Debug)]
pub enum InitdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Duplicated provider for capability '{0}'")]
    DuplicateProvider(Capability),

    #[error("Readiness gate already armed")]
    AlreadyArmed,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Initialization failed: {0}")]
    TaskFailed(TaskFailure),

    #[error("Cycle detected in plan: {0}")]
    DagCycle(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A failed initializer, as reported to the failure handler and the gate.
///
/// The error is shared so that the handler can log it and the gate can still
/// hand it to the caller.
#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub provides: Vec<Capability>,
    pub error: Arc<anyhow::Error>,
}

impl TaskFailure {
    pub fn new(provides: Vec<Capability>, error: anyhow::Error) -> Self {
        Self {
            provides,
            error: Arc::new(error),
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {:#}", self.provides, self.error)
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, InitdagError>;
