//! The run ledger: persisted record of runs and step outcomes.
//!
//! One row per build/unbuild attempt, one row per executed step. The ledger
//! is also the cross-process coordination point: a partial unique index over
//! started runs guarantees at most one active run per (component, action),
//! closing the check-then-insert race at the database level.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::process::{StepResult, StepStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunAction {
    Build,
    Unbuild,
}

impl RunAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunAction::Build => "build",
            RunAction::Unbuild => "unbuild",
        }
    }

    pub fn parse(s: &str) -> RunAction {
        match s {
            "unbuild" => RunAction::Unbuild,
            _ => RunAction::Build,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Started,
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Started => "started",
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> RunStatus {
        match s {
            "started" => RunStatus::Started,
            "success" => RunStatus::Success,
            _ => RunStatus::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: String,
    pub component: String,
    pub action: RunAction,
    pub status: RunStatus,
    pub created_at: String,
    pub tasks: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub id: i64,
    pub run_id: String,
    pub task_name: String,
    pub step_name: String,
    pub resource: String,
    pub status: StepStatus,
    pub message: String,
    pub created_at: String,
}

pub struct Ledger {
    conn: Connection,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS runs (
    id         TEXT PRIMARY KEY,
    component  TEXT NOT NULL,
    action     TEXT NOT NULL,
    status     TEXT NOT NULL,
    created_at TEXT NOT NULL,
    tasks      TEXT NOT NULL DEFAULT '[]'
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_runs_active
    ON runs(component, action) WHERE status = 'started';

CREATE TABLE IF NOT EXISTS steps (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id     TEXT NOT NULL,
    task_name  TEXT NOT NULL,
    step_name  TEXT NOT NULL,
    resource   TEXT NOT NULL,
    status     TEXT NOT NULL,
    message    TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_steps_run ON steps(run_id, created_at);
";

impl Ledger {
    pub fn open(path: &Path) -> Result<Ledger> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Ledger> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Ledger> {
        conn.execute_batch(SCHEMA)?;
        Ok(Ledger { conn })
    }

    fn now() -> String {
        chrono::Utc::now().to_rfc3339()
    }

    /// Insert a fresh run row in `started` state.
    ///
    /// The unique index rejects a second started row for the same component
    /// and action; the violation surfaces as `run.already_in_progress`.
    pub fn insert_run(&self, id: &str, component: &str, action: RunAction) -> Result<()> {
        self.conn.execute(
            "INSERT INTO runs (id, component, action, status, created_at, tasks)
             VALUES (?1, ?2, ?3, 'started', ?4, '[]')",
            params![id, component, action.as_str(), Self::now()],
        )?;
        Ok(())
    }

    /// Finalize a run: status plus the list of task names processed.
    pub fn update_run(&self, run_id: &str, status: RunStatus, tasks: &[String]) -> Result<()> {
        let tasks_json = serde_json::to_string(tasks)
            .map_err(|e| Error::internal_json(e.to_string(), Some("serialize task list".into())))?;
        let changed = self.conn.execute(
            "UPDATE runs SET status = ?1, tasks = ?2 WHERE id = ?3",
            params![status.as_str(), tasks_json, run_id],
        )?;
        if changed == 0 {
            return Err(Error::ledger(
                "update_run",
                format!("no run row with id {}", run_id),
            ));
        }
        Ok(())
    }

    /// Repoint an existing run row at a new unbuild attempt, reusing its id
    /// so teardown steps stay traceable against the original build.
    pub fn restart_run_for_unbuild(&self, run_id: &str) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE runs SET action = 'unbuild', status = 'started', created_at = ?1, tasks = '[]'
             WHERE id = ?2",
            params![Self::now(), run_id],
        )?;
        if changed == 0 {
            return Err(Error::ledger(
                "restart_run_for_unbuild",
                format!("no run row with id {}", run_id),
            ));
        }
        Ok(())
    }

    /// Remove a run and its step history (clean-teardown policy).
    ///
    /// Both deletes commit together; a failure on either side rolls the
    /// whole removal back so a run row can never outlive its steps.
    pub fn delete_run(&self, run_id: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM steps WHERE run_id = ?1", params![run_id])?;
        tx.execute("DELETE FROM runs WHERE id = ?1", params![run_id])?;
        tx.commit()?;
        Ok(())
    }

    pub fn find_started(&self, component: &str, action: RunAction) -> Result<Option<Run>> {
        self.conn
            .query_row(
                "SELECT id, component, action, status, created_at, tasks FROM runs
                 WHERE component = ?1 AND action = ?2 AND status = 'started'
                 ORDER BY created_at DESC LIMIT 1",
                params![component, action.as_str()],
                row_to_run,
            )
            .optional()
            .map_err(Error::from)
    }

    /// Any started run for the component, newest first, regardless of action.
    pub fn find_any_started(&self, component: &str) -> Result<Option<Run>> {
        self.conn
            .query_row(
                "SELECT id, component, action, status, created_at, tasks FROM runs
                 WHERE component = ?1 AND status = 'started'
                 ORDER BY created_at DESC LIMIT 1",
                params![component],
                row_to_run,
            )
            .optional()
            .map_err(Error::from)
    }

    pub fn latest_run(&self, component: &str) -> Result<Option<Run>> {
        self.conn
            .query_row(
                "SELECT id, component, action, status, created_at, tasks FROM runs
                 WHERE component = ?1 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                params![component],
                row_to_run,
            )
            .optional()
            .map_err(Error::from)
    }

    pub fn insert_step(
        &self,
        run_id: &str,
        task_name: &str,
        step_name: &str,
        result: &StepResult,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO steps (run_id, task_name, step_name, resource, status, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run_id,
                task_name,
                step_name,
                result.resource,
                result.status.as_str(),
                result.message,
                Self::now()
            ],
        )?;
        Ok(())
    }

    /// Step history for a run, ordered by recorded timestamp ascending.
    pub fn steps_for_run(&self, run_id: &str) -> Result<Vec<StepRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, task_name, step_name, resource, status, message, created_at
             FROM steps WHERE run_id = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(StepRecord {
                id: row.get(0)?,
                run_id: row.get(1)?,
                task_name: row.get(2)?,
                step_name: row.get(3)?,
                resource: row.get(4)?,
                status: StepStatus::parse(&row.get::<_, String>(5)?),
                message: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// Count of run rows for a component (used by tests and diagnostics).
    pub fn run_count(&self, component: &str) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM runs WHERE component = ?1",
                params![component],
                |row| row.get(0),
            )
            .map_err(Error::from)
    }
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<Run> {
    let tasks_json: String = row.get(5)?;
    Ok(Run {
        id: row.get(0)?,
        component: row.get(1)?,
        action: RunAction::parse(&row.get::<_, String>(2)?),
        status: RunStatus::parse(&row.get::<_, String>(3)?),
        created_at: row.get(4)?,
        tasks: serde_json::from_str(&tasks_json).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn result(resource: &str, status: StepStatus, message: &str, run_id: &str) -> StepResult {
        StepResult {
            resource: resource.to_string(),
            status,
            message: message.to_string(),
            run_id: run_id.to_string(),
        }
    }

    #[test]
    fn insert_and_find_started_run() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.insert_run("run-1", "widget", RunAction::Build).unwrap();

        let run = ledger.find_started("widget", RunAction::Build).unwrap().unwrap();
        assert_eq!(run.id, "run-1");
        assert_eq!(run.status, RunStatus::Started);
        assert!(ledger.find_started("widget", RunAction::Unbuild).unwrap().is_none());
    }

    #[test]
    fn second_started_run_for_same_action_is_rejected() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.insert_run("run-1", "widget", RunAction::Build).unwrap();

        let err = ledger
            .insert_run("run-2", "widget", RunAction::Build)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RunAlreadyInProgress);

        // The lock is per action: an unbuild row is fine alongside a build.
        ledger.insert_run("run-3", "widget", RunAction::Unbuild).unwrap();
    }

    #[test]
    fn finalized_run_frees_the_lock() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.insert_run("run-1", "widget", RunAction::Build).unwrap();
        ledger
            .update_run("run-1", RunStatus::Success, &["task1".to_string()])
            .unwrap();

        ledger.insert_run("run-2", "widget", RunAction::Build).unwrap();
        let run = ledger.latest_run("widget").unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Started);
    }

    #[test]
    fn update_run_records_task_list() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.insert_run("run-1", "widget", RunAction::Build).unwrap();
        ledger
            .update_run(
                "run-1",
                RunStatus::Error,
                &["task1".to_string(), "task2".to_string()],
            )
            .unwrap();

        let run = ledger.latest_run("widget").unwrap().unwrap();
        assert_eq!(run.tasks, vec!["task1", "task2"]);
        assert_eq!(run.status, RunStatus::Error);
    }

    #[test]
    fn steps_come_back_in_recorded_order() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.insert_run("run-1", "widget", RunAction::Build).unwrap();
        ledger
            .insert_step("run-1", "task1", "first", &result("res1", StepStatus::Success, "OK", "run-1"))
            .unwrap();
        ledger
            .insert_step("run-1", "task1", "second", &result("res1", StepStatus::Error, "boom", "run-1"))
            .unwrap();

        let steps = ledger.steps_for_run("run-1").unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step_name, "first");
        assert_eq!(steps[1].step_name, "second");
        assert_eq!(steps[1].status, StepStatus::Error);
    }

    #[test]
    fn delete_run_removes_row_and_step_history() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.insert_run("run-1", "widget", RunAction::Unbuild).unwrap();
        ledger
            .insert_step("run-1", "task1", "destroy", &result("res1", StepStatus::Success, "", "run-1"))
            .unwrap();

        ledger.delete_run("run-1").unwrap();
        assert_eq!(ledger.run_count("widget").unwrap(), 0);
        assert!(ledger.steps_for_run("run-1").unwrap().is_empty());
    }

    #[test]
    fn delete_run_rolls_back_when_the_run_row_cannot_be_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let ledger = Ledger::open(&path).unwrap();
        ledger.insert_run("run-1", "widget", RunAction::Unbuild).unwrap();
        ledger
            .insert_step("run-1", "task1", "destroy", &result("res1", StepStatus::Success, "", "run-1"))
            .unwrap();

        // Make the runs delete fail behind the ledger's back.
        let saboteur = rusqlite::Connection::open(&path).unwrap();
        saboteur
            .execute_batch(
                "CREATE TRIGGER deny_run_delete BEFORE DELETE ON runs
                 BEGIN SELECT RAISE(ABORT, 'denied'); END;",
            )
            .unwrap();

        assert!(ledger.delete_run("run-1").is_err());
        // The steps delete rolled back together with the failed run delete.
        assert_eq!(ledger.steps_for_run("run-1").unwrap().len(), 1);
        assert_eq!(ledger.run_count("widget").unwrap(), 1);
    }

    #[test]
    fn restart_run_for_unbuild_reuses_the_row() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.insert_run("run-1", "widget", RunAction::Build).unwrap();
        ledger.update_run("run-1", RunStatus::Success, &[]).unwrap();

        ledger.restart_run_for_unbuild("run-1").unwrap();
        let run = ledger.latest_run("widget").unwrap().unwrap();
        assert_eq!(run.action, RunAction::Unbuild);
        assert_eq!(run.status, RunStatus::Started);
    }
}
