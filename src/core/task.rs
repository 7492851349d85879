//! Task and step declarations.
//!
//! A component is declared as an ordered YAML list of tasks at
//! `<tasks>/<component>.yml`; each task carries an ordered list of steps.
//! Declarations are immutable at execution time.

use serde::{Deserialize, Serialize};

use crate::log_status;
use crate::paths::WorkspaceLayout;

/// Task type tag marking a task as destroyable infrastructure.
pub const INFRASTRUCTURE_TYPE: &str = "infrastructure";

// Fixed artifact and script names shared by the infrastructure kinds.
pub const DEPLOY_CFN_TEMPLATE: &str = "cfn.yml";
pub const DEPLOY_TERRAFORM_TEMPLATE: &str = "resources.tf";
pub const DEPLOY_CFN_SCRIPT: &str = "deploy_cfn.sh";
pub const DEPLOY_TERRAFORM_SCRIPT: &str = "deploy_terraform.sh";
pub const DESTROY_SCRIPT: &str = "destroy.sh";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub resource: String,
    pub environment: String,
    #[serde(rename = "type", default)]
    pub task_type: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Task {
    pub fn is_infrastructure(&self) -> bool {
        self.task_type == INFRASTRUCTURE_TYPE
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(rename = "type", default = "default_action_type")]
    pub action_type: String,
    #[serde(default)]
    pub action_script: Option<String>,
    #[serde(default)]
    pub action_template: Option<String>,
    #[serde(default)]
    pub use_template: bool,
    #[serde(default)]
    pub action_config: Option<String>,
}

fn default_action_type() -> String {
    "shell".to_string()
}

impl Step {
    pub fn kind(&self) -> ActionKind {
        ActionKind::classify(&self.action_type)
    }
}

/// Dispatch classification for a step's action type.
///
/// The type tag is an open string; anything unrecognized (including plain
/// `shell`) dispatches as `Custom` using the step's own script and template
/// names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Cloudformation,
    Terraform,
    CustomCloudformation,
    CustomTerraform,
    Custom,
}

impl ActionKind {
    pub fn classify(action_type: &str) -> ActionKind {
        match action_type {
            "cloudformation" => ActionKind::Cloudformation,
            "terraform" => ActionKind::Terraform,
            "custom-cloudformation" => ActionKind::CustomCloudformation,
            "custom-terraform" => ActionKind::CustomTerraform,
            _ => ActionKind::Custom,
        }
    }

    /// The four kinds that render a deploy artifact and accept step config.
    pub fn is_infrastructure(&self) -> bool {
        !matches!(self, ActionKind::Custom)
    }
}

/// Load the ordered task list for a component.
///
/// `None` is a valid "not found" outcome: the file may be absent, empty, or
/// unparseable. The orchestrator treats all three as "component has no task
/// list".
pub fn load_tasks(layout: &WorkspaceLayout, component: &str) -> Option<Vec<Task>> {
    let path = layout.task_file(component);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(_) => {
            log_status!("tasks", "Task file {} not found", path.display());
            return None;
        }
    };

    match serde_yml::from_str::<Vec<Task>>(&raw) {
        Ok(tasks) if tasks.is_empty() => None,
        Ok(tasks) => Some(tasks),
        Err(e) => {
            log_status!("tasks", "Malformed task file {}: {}", path.display(), e);
            None
        }
    }
}
