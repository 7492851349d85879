//! Unbuild orchestration.
//!
//! Mirror of the build controller with teardown semantics: only
//! infrastructure-type tasks are destroyed, the run lock is scoped to
//! action=unbuild, the run id can be reused from the prior build so
//! teardown steps stay traceable, and a fully clean teardown deletes the
//! run row instead of leaving a success record.

use uuid::Uuid;

use crate::build::{finalize_run, RunOutcome, UNBUILD_ERROR_MSG, UNBUILD_SUCCESS_MSG};
use crate::config;
use crate::error::{ErrorCode, Result};
use crate::ledger::{Ledger, RunAction, RunStatus};
use crate::log_status;
use crate::paths::{template_for, EngineContext};
use crate::process::{self, StepResult};
use crate::task::{self, Task, DESTROY_SCRIPT};
use crate::template;

const DESTROY_STEP_NAME: &str = "destroy";

/// Unbuild a component: destroy every infrastructure task in declared order.
pub fn run(
    ctx: &EngineContext,
    ledger: &Ledger,
    component: &str,
    use_db: bool,
) -> Result<RunOutcome> {
    log_status!("unbuild", "Starting unbuild for component '{}'", component);

    let Some(tasks) = task::load_tasks(&ctx.layout, component) else {
        return Ok(RunOutcome::error(
            component,
            format!("Task file {}.yml not found", component),
            "",
            Vec::new(),
        ));
    };

    // Lock is scoped to action=unbuild; a concurrent build does not block.
    if let Some(active) = ledger.find_started(component, RunAction::Unbuild)? {
        log_status!(
            "unbuild",
            "Unbuild already in progress for '{}' (run {})",
            component,
            active.id
        );
        return Ok(RunOutcome::error(
            component,
            format!(
                "An unbuild for component '{}' is already in progress",
                component
            ),
            active.id,
            Vec::new(),
        ));
    }

    let prior = ledger.latest_run(component)?;
    if use_db && prior.is_none() {
        return Ok(RunOutcome::error(
            component,
            format!("No build record found for component {}", component),
            "",
            Vec::new(),
        ));
    }

    let run_id = match (use_db, prior) {
        (true, Some(prior)) => {
            // Reuse the build's run id so destroy steps land next to the
            // original build steps.
            log_status!("unbuild", "Reusing run id {} from prior record", prior.id);
            if let Err(e) = ledger.restart_run_for_unbuild(&prior.id) {
                if e.code == ErrorCode::RunAlreadyInProgress {
                    return Ok(RunOutcome::error(
                        component,
                        format!(
                            "An unbuild for component '{}' is already in progress",
                            component
                        ),
                        prior.id,
                        Vec::new(),
                    ));
                }
                return Err(e);
            }
            prior.id
        }
        _ => {
            let run_id = Uuid::new_v4().to_string();
            if let Err(e) = ledger.insert_run(&run_id, component, RunAction::Unbuild) {
                if e.code == ErrorCode::RunAlreadyInProgress {
                    let active_id = ledger
                        .find_started(component, RunAction::Unbuild)?
                        .map(|run| run.id)
                        .unwrap_or_default();
                    return Ok(RunOutcome::error(
                        component,
                        format!(
                            "An unbuild for component '{}' is already in progress",
                            component
                        ),
                        active_id,
                        Vec::new(),
                    ));
                }
                return Err(e);
            }
            run_id
        }
    };

    let mut attempted: Vec<String> = Vec::new();
    let mut results: Vec<StepResult> = Vec::new();
    let mut overall_error = false;

    for task in &tasks {
        // Only infrastructure can be destroyed; other task types are
        // skipped without producing a result.
        if !task.is_infrastructure() {
            log_status!(
                "unbuild",
                "Skipping non-infrastructure task '{}'",
                task.name
            );
            continue;
        }
        attempted.push(task.name.clone());
        let result = match destroy_task(ctx, ledger, task, &run_id) {
            Ok(result) => result,
            Err(e) => {
                // Best-effort: do not leave the row wedged in `started`.
                let _ = ledger.update_run(&run_id, RunStatus::Error, &attempted);
                return Err(e);
            }
        };
        overall_error |= result.is_error();
        results.push(result);
    }

    if overall_error {
        finalize_run(ledger, &run_id, RunStatus::Error, &attempted)?;
        log_status!("unbuild", "Unbuild for '{}' failed", component);
        return Ok(RunOutcome::error(
            component,
            UNBUILD_ERROR_MSG,
            run_id,
            results,
        ));
    }

    // Clean teardown leaves no residual run row.
    if let Err(e) = ledger.delete_run(&run_id) {
        let _ = ledger.update_run(&run_id, RunStatus::Error, &attempted);
        return Err(e);
    }
    log_status!("unbuild", "Unbuild for '{}' completed cleanly", component);
    Ok(RunOutcome::success(
        component,
        UNBUILD_SUCCESS_MSG,
        run_id,
        results,
    ))
}

/// Destroy one resource: render the destroy template when present, then
/// execute the destroy script. A missing script becomes an `error` result,
/// not an exception.
fn destroy_task(
    ctx: &EngineContext,
    ledger: &Ledger,
    task: &Task,
    run_id: &str,
) -> Result<StepResult> {
    let resource_dir = ctx.layout.resource_dir(&task.resource);
    let script_path = resource_dir.join(DESTROY_SCRIPT);
    let template_path = template_for(&script_path);

    let configuration = config::resolve(&ctx.layout, &task.resource, &task.environment);

    if template_path.exists() {
        template::materialize(&template_path, &script_path, &configuration, true)?;
    } else {
        log_status!(
            "unbuild",
            "No destroy template for resource '{}'; using existing {} if available",
            task.resource,
            DESTROY_SCRIPT
        );
    }

    let result = process::run(&task.resource, &script_path, run_id, ctx.step_timeout);
    ledger.insert_step(run_id, &task.name, DESTROY_STEP_NAME, &result)?;
    Ok(result)
}
