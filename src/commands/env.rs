use clap::Args;
use serde::Serialize;

use stackhand::environment::{self, EnvironmentReport};

use super::{CmdResult, WorkspaceArgs};

#[derive(Args)]
pub struct EnvArgs {
    /// Component whose merged environment to preview
    pub component: String,

    #[command(flatten)]
    pub workspace: WorkspaceArgs,
}

#[derive(Serialize)]
pub struct EnvOutput {
    pub command: String,
    #[serde(flatten)]
    pub report: EnvironmentReport,
}

pub fn run(args: EnvArgs, _global: &super::GlobalArgs) -> CmdResult<EnvOutput> {
    let layout = args.workspace.layout();
    let report = environment::get_environment(&layout, &args.component)?;

    Ok((
        EnvOutput {
            command: "env".to_string(),
            report,
        },
        0,
    ))
}
