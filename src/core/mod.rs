// Public modules
pub mod build;
pub mod config;
pub mod environment;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod paths;
pub mod process;
pub mod status;
pub mod step;
pub mod task;
pub mod template;
pub mod unbuild;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
pub use ledger::{Ledger, Run, RunAction, RunStatus, StepRecord};
pub use paths::{EngineContext, WorkspaceLayout};
pub use process::{StepResult, StepStatus};
pub use task::{ActionKind, Step, Task};
