use clap::Args;
use serde::Serialize;

use stackhand::build::{OutcomeStatus, RunOutcome};
use stackhand::unbuild;

use super::{CmdResult, WorkspaceArgs};

#[derive(Args)]
pub struct UnbuildArgs {
    /// Component to unbuild
    pub component: String,

    /// Reuse the prior build's run id from the ledger; fails when no build
    /// record exists
    #[arg(long)]
    pub use_db: bool,

    #[command(flatten)]
    pub workspace: WorkspaceArgs,
}

#[derive(Serialize)]
pub struct UnbuildOutput {
    pub command: String,
    #[serde(flatten)]
    pub outcome: RunOutcome,
}

pub fn run(args: UnbuildArgs, _global: &super::GlobalArgs) -> CmdResult<UnbuildOutput> {
    let ctx = args.workspace.context();
    let ledger = args.workspace.open_ledger()?;

    let outcome = unbuild::run(&ctx, &ledger, &args.component, args.use_db)?;
    let exit_code = match outcome.status {
        OutcomeStatus::Success => 0,
        OutcomeStatus::Error => 1,
    };

    Ok((
        UnbuildOutput {
            command: "unbuild".to_string(),
            outcome,
        },
        exit_code,
    ))
}
