// src/config/options.rs

use std::time::Duration;

use crate::config::model::ConfigSection;

/// Runtime knobs of a [`Scheduler`](crate::registry::Scheduler).
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// How often the readiness gate re-checks the pending set.
    pub poll_interval: Duration,
    /// Prefix of synthesized tokens for initializers that provide nothing.
    pub anonymous_prefix: String,
    /// Number of random hex characters after the prefix.
    pub anonymous_len: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            anonymous_prefix: "anonymous_".to_string(),
            anonymous_len: 12,
        }
    }
}

impl From<&ConfigSection> for SchedulerOptions {
    fn from(section: &ConfigSection) -> Self {
        Self {
            poll_interval: Duration::from_millis(section.poll_interval_ms),
            ..Self::default()
        }
    }
}
