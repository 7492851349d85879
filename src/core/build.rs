//! Build orchestration.
//!
//! Top-level state machine for a build run: acquire the per-component run
//! lock, execute tasks in declared order, persist every step outcome as it
//! happens, finalize the run status, release the lock by finalizing.

use serde::Serialize;
use uuid::Uuid;

use crate::error::{ErrorCode, Result};
use crate::executor::{self, TaskOutcome};
use crate::ledger::{Ledger, RunAction, RunStatus};
use crate::log_status;
use crate::paths::EngineContext;
use crate::process::StepResult;
use crate::task;

pub const BUILD_SUCCESS_MSG: &str = "Build process completed successfully";
pub const BUILD_ERROR_MSG: &str = "Build process failed";
pub const UNBUILD_SUCCESS_MSG: &str = "Unbuild process completed successfully";
pub const UNBUILD_ERROR_MSG: &str = "Unbuild process failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

/// The result of one build or unbuild orchestration.
///
/// `run_id` is the empty string when the rejection happened before any run
/// row was created.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub component: String,
    pub status: OutcomeStatus,
    pub message: String,
    pub run_id: String,
    pub results: Vec<StepResult>,
}

impl RunOutcome {
    pub fn error(
        component: &str,
        message: impl Into<String>,
        run_id: impl Into<String>,
        results: Vec<StepResult>,
    ) -> Self {
        Self {
            component: component.to_string(),
            status: OutcomeStatus::Error,
            message: message.into(),
            run_id: run_id.into(),
            results,
        }
    }

    pub fn success(
        component: &str,
        message: impl Into<String>,
        run_id: impl Into<String>,
        results: Vec<StepResult>,
    ) -> Self {
        Self {
            component: component.to_string(),
            status: OutcomeStatus::Success,
            message: message.into(),
            run_id: run_id.into(),
            results,
        }
    }
}

/// Finalize the run row. If the ledger write fails, make a best-effort
/// attempt to mark the run `error` so the started-run lock cannot stay
/// wedged, then propagate the original failure.
pub(crate) fn finalize_run(
    ledger: &Ledger,
    run_id: &str,
    status: RunStatus,
    attempted: &[String],
) -> Result<()> {
    if let Err(e) = ledger.update_run(run_id, status, attempted) {
        if status != RunStatus::Error {
            let _ = ledger.update_run(run_id, RunStatus::Error, attempted);
        }
        return Err(e);
    }
    Ok(())
}

/// Build a component: execute every declared task in order.
///
/// Business-rule rejections (run already active, task file missing) come
/// back as `error` outcomes, not as `Err`; only ledger failures propagate.
pub fn run(ctx: &EngineContext, ledger: &Ledger, component: &str) -> Result<RunOutcome> {
    log_status!("build", "Starting build for component '{}'", component);

    // Concurrency gate: a single in-flight build per component. The
    // pre-check supplies the active run id for the message; the unique
    // index on started runs is the authoritative lock.
    if let Some(active) = ledger.find_started(component, RunAction::Build)? {
        log_status!(
            "build",
            "Build already in progress for '{}' (run {})",
            component,
            active.id
        );
        return Ok(RunOutcome::error(
            component,
            format!("Build for component '{}' is already in progress", component),
            active.id,
            Vec::new(),
        ));
    }

    let Some(tasks) = task::load_tasks(&ctx.layout, component) else {
        return Ok(RunOutcome::error(
            component,
            format!("Task file {}.yml not found", component),
            "",
            Vec::new(),
        ));
    };

    let run_id = Uuid::new_v4().to_string();
    if let Err(e) = ledger.insert_run(&run_id, component, RunAction::Build) {
        if e.code == ErrorCode::RunAlreadyInProgress {
            // Lost the insert race to a concurrent request.
            let active_id = ledger
                .find_started(component, RunAction::Build)?
                .map(|run| run.id)
                .unwrap_or_default();
            return Ok(RunOutcome::error(
                component,
                format!("Build for component '{}' is already in progress", component),
                active_id,
                Vec::new(),
            ));
        }
        return Err(e);
    }

    let mut attempted: Vec<String> = Vec::new();
    let mut results: Vec<StepResult> = Vec::new();
    let mut overall_error = false;

    for task in &tasks {
        attempted.push(task.name.clone());
        match executor::execute_task(ctx, ledger, task, &run_id) {
            TaskOutcome::Aborted { reason } => {
                log_status!("build", "Task '{}' aborted: {}", task.name, reason);
                finalize_run(ledger, &run_id, RunStatus::Error, &attempted)?;
                return Ok(RunOutcome::error(
                    component,
                    format!("{}: {}", BUILD_ERROR_MSG, reason),
                    run_id,
                    results,
                ));
            }
            TaskOutcome::Completed {
                results: task_results,
                degraded,
            } => {
                // Step-level errors degrade the run but do not stop the
                // remaining tasks.
                overall_error |= degraded;
                results.extend(task_results);
            }
        }
    }

    let (status, message) = if overall_error {
        (RunStatus::Error, BUILD_ERROR_MSG)
    } else {
        (RunStatus::Success, BUILD_SUCCESS_MSG)
    };
    finalize_run(ledger, &run_id, status, &attempted)?;
    log_status!(
        "build",
        "Build for '{}' finished with status {}",
        component,
        status.as_str()
    );

    Ok(RunOutcome {
        component: component.to_string(),
        status: if overall_error {
            OutcomeStatus::Error
        } else {
            OutcomeStatus::Success
        },
        message: message.to_string(),
        run_id,
        results,
    })
}
