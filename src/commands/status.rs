use clap::Args;
use serde::Serialize;

use stackhand::status::{self, StatusReport};

use super::{CmdResult, WorkspaceArgs};

#[derive(Args)]
pub struct StatusArgs {
    /// Component to report on
    pub component: String,

    #[command(flatten)]
    pub workspace: WorkspaceArgs,
}

#[derive(Serialize)]
pub struct StatusOutput {
    pub command: String,
    #[serde(flatten)]
    pub report: StatusReport,
}

pub fn run(args: StatusArgs, _global: &super::GlobalArgs) -> CmdResult<StatusOutput> {
    let ledger = args.workspace.open_ledger()?;
    let report = status::get_status(&ledger, &args.component)?;

    Ok((
        StatusOutput {
            command: "status".to_string(),
            report,
        },
        0,
    ))
}
