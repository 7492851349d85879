use clap::Args;
use serde::Serialize;

use stackhand::build::{self, OutcomeStatus, RunOutcome};

use super::{CmdResult, WorkspaceArgs};

#[derive(Args)]
pub struct BuildArgs {
    /// Component to build (names the task list)
    pub component: String,

    #[command(flatten)]
    pub workspace: WorkspaceArgs,
}

#[derive(Serialize)]
pub struct BuildOutput {
    pub command: String,
    #[serde(flatten)]
    pub outcome: RunOutcome,
}

pub fn run(args: BuildArgs, _global: &super::GlobalArgs) -> CmdResult<BuildOutput> {
    let ctx = args.workspace.context();
    let ledger = args.workspace.open_ledger()?;

    let outcome = build::run(&ctx, &ledger, &args.component)?;
    let exit_code = match outcome.status {
        OutcomeStatus::Success => 0,
        OutcomeStatus::Error => 1,
    };

    Ok((
        BuildOutput {
            command: "build".to_string(),
            outcome,
        },
        exit_code,
    ))
}
