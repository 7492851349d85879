use clap::Args;
use std::path::Path;
use std::time::Duration;

use stackhand::ledger::Ledger;
use stackhand::paths::{EngineContext, WorkspaceLayout, DEFAULT_STEP_TIMEOUT_SECS};

pub type CmdResult<T> = stackhand::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

/// Shared resolution-root and ledger arguments.
///
/// Empty roots default to the current working directory; every path is
/// tilde-expanded.
#[derive(Args, Debug)]
pub struct WorkspaceArgs {
    /// Root containing the environments/ folder
    #[arg(long, default_value = "")]
    pub env_root: String,

    /// Root containing the resources/ folder
    #[arg(long, default_value = "")]
    pub resource_root: String,

    /// Root containing the tasks/ folder
    #[arg(long, default_value = "")]
    pub task_root: String,

    /// Root containing the shared templates/ folder
    #[arg(long, default_value = "")]
    pub template_root: String,

    /// Path to the run ledger database
    #[arg(long, default_value = "stackhand.db")]
    pub ledger: String,

    /// Hard timeout for each script execution, in seconds
    #[arg(long, default_value_t = DEFAULT_STEP_TIMEOUT_SECS)]
    pub timeout_secs: u64,
}

impl WorkspaceArgs {
    pub fn layout(&self) -> WorkspaceLayout {
        WorkspaceLayout::new(
            &self.env_root,
            &self.resource_root,
            &self.task_root,
            &self.template_root,
        )
    }

    pub fn context(&self) -> EngineContext {
        EngineContext::new(self.layout(), Duration::from_secs(self.timeout_secs))
    }

    pub fn open_ledger(&self) -> stackhand::Result<Ledger> {
        let path = shellexpand::tilde(&self.ledger).into_owned();
        Ledger::open(Path::new(&path))
    }
}

pub mod build;
pub mod env;
pub mod status;
pub mod unbuild;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (stackhand::Result<serde_json::Value>, i32) {
    crate::tty::status("stackhand is working...");

    match command {
        crate::Commands::Build(args) => dispatch!(args, global, build),
        crate::Commands::Unbuild(args) => dispatch!(args, global, unbuild),
        crate::Commands::Status(args) => dispatch!(args, global, status),
        crate::Commands::Env(args) => dispatch!(args, global, env),
    }
}
