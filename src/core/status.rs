//! Run status reporting.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::ledger::{Ledger, RunAction, RunStatus, StepRecord};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub run_id: String,
    pub component: String,
    pub action: RunAction,
    pub status: RunStatus,
    pub steps: Vec<StepRecord>,
}

/// Report the state of a component's runs.
///
/// The single `started` run wins if one exists (build or unbuild);
/// otherwise the most recent run by timestamp. Steps come back ordered by
/// recorded timestamp ascending.
pub fn get_status(ledger: &Ledger, component: &str) -> Result<StatusReport> {
    let run = match ledger.find_any_started(component)? {
        Some(run) => run,
        None => ledger
            .latest_run(component)?
            .ok_or_else(|| Error::run_not_found(component))?,
    };

    let steps = ledger.steps_for_run(&run.id)?;
    Ok(StatusReport {
        run_id: run.id,
        component: run.component,
        action: run.action,
        status: run.status,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::process::{StepResult, StepStatus};

    fn step(resource: &str, run_id: &str) -> StepResult {
        StepResult {
            resource: resource.to_string(),
            status: StepStatus::Success,
            message: "OK".to_string(),
            run_id: run_id.to_string(),
        }
    }

    #[test]
    fn no_run_ever_recorded_is_a_typed_not_found() {
        let ledger = Ledger::open_in_memory().unwrap();
        let err = get_status(&ledger, "ghost").unwrap_err();
        assert_eq!(err.code, ErrorCode::RunNotFound);
    }

    #[test]
    fn started_run_is_preferred_over_newer_finished_ones() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.insert_run("done-run", "widget", RunAction::Build).unwrap();
        ledger.update_run("done-run", RunStatus::Success, &[]).unwrap();
        ledger.insert_run("live-run", "widget", RunAction::Unbuild).unwrap();

        let report = get_status(&ledger, "widget").unwrap();
        assert_eq!(report.run_id, "live-run");
        assert_eq!(report.status, RunStatus::Started);
        assert_eq!(report.action, RunAction::Unbuild);
    }

    #[test]
    fn falls_back_to_most_recent_run_with_ordered_steps() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.insert_run("run-1", "widget", RunAction::Build).unwrap();
        ledger
            .insert_step("run-1", "task1", "first", &step("res1", "run-1"))
            .unwrap();
        ledger
            .insert_step("run-1", "task1", "second", &step("res1", "run-1"))
            .unwrap();
        ledger
            .update_run("run-1", RunStatus::Success, &["task1".to_string()])
            .unwrap();

        let report = get_status(&ledger, "widget").unwrap();
        assert_eq!(report.run_id, "run-1");
        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.steps.len(), 2);
        assert_eq!(report.steps[0].step_name, "first");
        assert_eq!(report.steps[1].step_name, "second");
    }
}
