// src/config/validate.rs

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{PlanFile, RawPlanFile};
use crate::errors::{InitdagError, Result};

impl TryFrom<RawPlanFile> for PlanFile {
    type Error = InitdagError;

    fn try_from(raw: RawPlanFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_plan(&raw)?;
        Ok(PlanFile::new_unchecked(raw.config, raw.task, raw.ready))
    }
}

fn validate_raw_plan(plan: &RawPlanFile) -> Result<()> {
    ensure_has_tasks(plan)?;
    validate_global_config(plan)?;
    validate_tasks(plan)?;
    let providers = collect_providers(plan)?;
    validate_dependencies(plan, &providers)?;
    validate_dag(plan, &providers)?;
    Ok(())
}

fn ensure_has_tasks(plan: &RawPlanFile) -> Result<()> {
    if plan.task.is_empty() {
        return Err(InitdagError::ConfigError(
            "plan must contain at least one [[task]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(plan: &RawPlanFile) -> Result<()> {
    if plan.config.poll_interval_ms == 0 {
        return Err(InitdagError::ConfigError(
            "[config].poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_tasks(plan: &RawPlanFile) -> Result<()> {
    for (idx, task) in plan.task.iter().enumerate() {
        if task.cmd.trim().is_empty() {
            return Err(InitdagError::ConfigError(format!(
                "task #{} ('{}') has an empty `cmd`",
                idx + 1,
                task.display_name()
            )));
        }
        for token in task.provides.iter().chain(task.depends.iter()) {
            if token.trim().is_empty() {
                return Err(InitdagError::ConfigError(format!(
                    "task '{}' has a blank capability name",
                    task.display_name()
                )));
            }
        }
        if let Some(own) = task.depends.iter().find(|d| task.provides.contains(d)) {
            return Err(InitdagError::ConfigError(format!(
                "task '{}' cannot depend on its own capability '{}'",
                task.display_name(),
                own
            )));
        }
    }
    if let Some(ready) = &plan.ready {
        if ready.cmd.trim().is_empty() {
            return Err(InitdagError::ConfigError(
                "[ready].cmd must not be empty".to_string(),
            ));
        }
    }
    Ok(())
}

/// Map every provided token to the index of its task.
fn collect_providers(plan: &RawPlanFile) -> Result<HashMap<&str, usize>> {
    let mut providers = HashMap::new();
    for (idx, task) in plan.task.iter().enumerate() {
        for token in &task.provides {
            if let Some(prev) = providers.insert(token.as_str(), idx) {
                return Err(InitdagError::ConfigError(format!(
                    "capability '{}' is provided by both '{}' and '{}'",
                    token,
                    plan.task[prev].display_name(),
                    task.display_name()
                )));
            }
        }
    }
    Ok(providers)
}

fn validate_dependencies(plan: &RawPlanFile, providers: &HashMap<&str, usize>) -> Result<()> {
    for task in plan.task.iter() {
        for dep in task.depends.iter() {
            if !providers.contains_key(dep.as_str()) {
                return Err(InitdagError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' (no task provides it)",
                    task.display_name(),
                    dep
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(plan: &RawPlanFile, providers: &HashMap<&str, usize>) -> Result<()> {
    // Edge direction: provider -> dependent.
    let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();

    for idx in 0..plan.task.len() {
        graph.add_node(idx);
    }

    for (idx, task) in plan.task.iter().enumerate() {
        for dep in task.depends.iter() {
            if let Some(&provider) = providers.get(dep.as_str()) {
                graph.add_edge(provider, idx, ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(InitdagError::DagCycle(format!(
            "cycle detected in plan involving task '{}'",
            plan.task[cycle.node_id()].display_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{ConfigSection, TaskConfig};

    fn task(provides: &[&str], depends: &[&str]) -> TaskConfig {
        TaskConfig {
            name: None,
            provides: provides.iter().map(|s| s.to_string()).collect(),
            depends: depends.iter().map(|s| s.to_string()).collect(),
            cmd: "true".to_string(),
        }
    }

    fn plan(tasks: Vec<TaskConfig>) -> RawPlanFile {
        RawPlanFile {
            config: ConfigSection::default(),
            task: tasks,
            ready: None,
        }
    }

    #[test]
    fn valid_chain_passes() {
        let raw = plan(vec![task(&["b"], &["a"]), task(&["a"], &[])]);
        assert!(PlanFile::try_from(raw).is_ok());
    }

    #[test]
    fn anonymous_task_without_provides_is_allowed() {
        let raw = plan(vec![task(&[], &[])]);
        assert!(PlanFile::try_from(raw).is_ok());
    }

    #[test]
    fn self_dependency_is_rejected() {
        let raw = plan(vec![task(&["a"], &["a"])]);
        let err = PlanFile::try_from(raw).unwrap_err();
        assert!(matches!(err, InitdagError::ConfigError(ref m) if m.contains("its own")));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let mut raw = plan(vec![task(&["a"], &[])]);
        raw.config.poll_interval_ms = 0;
        assert!(matches!(
            PlanFile::try_from(raw),
            Err(InitdagError::ConfigError(_))
        ));
    }

    #[test]
    fn three_task_cycle_is_reported() {
        let raw = plan(vec![
            task(&["a"], &["c"]),
            task(&["b"], &["a"]),
            task(&["c"], &["b"]),
        ]);
        assert!(matches!(
            PlanFile::try_from(raw),
            Err(InitdagError::DagCycle(_))
        ));
    }
}
