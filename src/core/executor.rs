//! Sequential task execution.

use crate::config;
use crate::ledger::Ledger;
use crate::log_status;
use crate::paths::EngineContext;
use crate::process::StepResult;
use crate::step;
use crate::task::Task;

/// Outcome of executing one task.
///
/// Explicit tri-state instead of the ambiguous empty-results signal: an
/// aborted task is distinguishable from a task that legitimately had zero
/// steps.
#[derive(Debug)]
pub enum TaskOutcome {
    /// Every step ran. `degraded` is set when any step reported an error.
    Completed {
        results: Vec<StepResult>,
        degraded: bool,
    },
    /// Configuration resolution failed or a step raised a fatal error.
    /// No results are surfaced; the task is all-or-nothing.
    Aborted { reason: String },
}

impl TaskOutcome {
    pub fn is_aborted(&self) -> bool {
        matches!(self, TaskOutcome::Aborted { .. })
    }
}

/// Run all steps of one task in declared order.
///
/// Configuration is resolved once per task; an empty resolution aborts
/// before any step runs. The first fatal step error aborts the task and
/// discards the results collected so far.
pub fn execute_task(
    ctx: &EngineContext,
    ledger: &Ledger,
    task: &Task,
    run_id: &str,
) -> TaskOutcome {
    log_status!("task", "Executing task '{}' ({})", task.name, task.resource);

    let configuration = config::resolve(&ctx.layout, &task.resource, &task.environment);
    if configuration.is_empty() {
        log_status!(
            "task",
            "No configuration for resource '{}' in environment '{}'; aborting task '{}'",
            task.resource,
            task.environment,
            task.name
        );
        return TaskOutcome::Aborted {
            reason: format!(
                "Configuration missing for resource '{}' in environment '{}'",
                task.resource, task.environment
            ),
        };
    }

    let mut results = Vec::with_capacity(task.steps.len());
    for step in &task.steps {
        match step::run_step(ctx, ledger, task, step, &configuration, run_id) {
            Ok(result) => results.push(result),
            Err(e) => {
                log_status!(
                    "task",
                    "Step '{}' failed fatally in task '{}': {}",
                    step.name,
                    task.name,
                    e
                );
                return TaskOutcome::Aborted {
                    reason: e.to_string(),
                };
            }
        }
    }

    let degraded = results.iter().any(StepResult::is_error);
    TaskOutcome::Completed { results, degraded }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::RunAction;
    use crate::paths::WorkspaceLayout;
    use crate::task::Step;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn context(root: &std::path::Path) -> EngineContext {
        let root = root.to_string_lossy();
        EngineContext::new(
            WorkspaceLayout::new(&root, &root, &root, &root),
            Duration::from_secs(30),
        )
    }

    fn shell_step(name: &str, script: &str) -> Step {
        Step {
            name: name.to_string(),
            action_type: "shell".to_string(),
            action_script: Some(script.to_string()),
            action_template: None,
            use_template: false,
            action_config: None,
        }
    }

    fn seed_config(ctx: &EngineContext, resource: &str, environment: &str) {
        fs::create_dir_all(ctx.layout.environments_root.join(resource)).unwrap();
        fs::write(ctx.layout.global_env_file(environment), "region: us-east-1\n").unwrap();
        fs::write(
            ctx.layout.resource_env_file(resource, environment),
            "instance: t3.micro\n",
        )
        .unwrap();
    }

    fn task_with_steps(steps: Vec<Step>) -> Task {
        Task {
            name: "task1".to_string(),
            resource: "res1".to_string(),
            environment: "np".to_string(),
            task_type: "infrastructure".to_string(),
            steps,
        }
    }

    #[test]
    fn empty_configuration_aborts_before_any_step() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path());
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.insert_run("run-1", "widget", RunAction::Build).unwrap();

        let task = task_with_steps(vec![shell_step("deploy", "deploy.sh")]);
        let outcome = execute_task(&ctx, &ledger, &task, "run-1");
        assert!(outcome.is_aborted());
        assert!(ledger.steps_for_run("run-1").unwrap().is_empty());
    }

    #[test]
    fn fatal_step_error_discards_collected_results() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path());
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.insert_run("run-1", "widget", RunAction::Build).unwrap();
        seed_config(&ctx, "res1", "np");

        let res_dir = ctx.layout.resource_dir("res1");
        fs::create_dir_all(&res_dir).unwrap();
        fs::write(res_dir.join("first.sh.tpl"), "echo one\n").unwrap();
        // second.sh.tpl intentionally absent: fatal template error

        let task = task_with_steps(vec![
            shell_step("first", "first.sh"),
            shell_step("second", "second.sh"),
        ]);
        let outcome = execute_task(&ctx, &ledger, &task, "run-1");
        assert!(outcome.is_aborted());

        // The step that did run is still recorded in the ledger, but the
        // task surfaces nothing.
        assert_eq!(ledger.steps_for_run("run-1").unwrap().len(), 1);
    }

    #[test]
    fn completed_task_reports_degraded_when_a_step_errors() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path());
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.insert_run("run-1", "widget", RunAction::Build).unwrap();
        seed_config(&ctx, "res1", "np");

        let res_dir = ctx.layout.resource_dir("res1");
        fs::create_dir_all(&res_dir).unwrap();
        fs::write(res_dir.join("good.sh.tpl"), "echo fine\n").unwrap();
        fs::write(res_dir.join("bad.sh.tpl"), "exit 2\n").unwrap();

        let task = task_with_steps(vec![
            shell_step("good", "good.sh"),
            shell_step("bad", "bad.sh"),
        ]);
        match execute_task(&ctx, &ledger, &task, "run-1") {
            TaskOutcome::Completed { results, degraded } => {
                assert_eq!(results.len(), 2);
                assert!(degraded);
            }
            TaskOutcome::Aborted { reason } => panic!("unexpected abort: {}", reason),
        }
    }
}
