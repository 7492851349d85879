//! Workspace layout resolution.
//!
//! The four resolution roots arrive per invocation (CLI flags or API call)
//! and are frozen into a `WorkspaceLayout` up front. Nothing downstream
//! mutates paths; every engine function borrows the layout.

use std::path::{Path, PathBuf};
use std::time::Duration;

const ENVIRONMENTS_FOLDER: &str = "environments";
const RESOURCES_FOLDER: &str = "resources";
const TASKS_FOLDER: &str = "tasks";
const TEMPLATES_FOLDER: &str = "templates";

pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 600;

/// Template files carry this suffix; rendering strips it.
pub const TEMPLATE_SUFFIX: &str = ".tpl";

#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    pub environments_root: PathBuf,
    pub resources_root: PathBuf,
    pub tasks_root: PathBuf,
    pub templates_root: PathBuf,
}

impl WorkspaceLayout {
    /// Build the layout from operator-supplied roots.
    ///
    /// Each root is tilde-expanded and suffixed with the fixed folder name
    /// for its kind. An empty root means the current working directory.
    pub fn new(env_root: &str, resource_root: &str, task_root: &str, template_root: &str) -> Self {
        Self {
            environments_root: expand_root(env_root).join(ENVIRONMENTS_FOLDER),
            resources_root: expand_root(resource_root).join(RESOURCES_FOLDER),
            tasks_root: expand_root(task_root).join(TASKS_FOLDER),
            templates_root: expand_root(template_root).join(TEMPLATES_FOLDER),
        }
    }

    pub fn task_file(&self, component: &str) -> PathBuf {
        self.tasks_root.join(format!("{}.yml", component))
    }

    pub fn resource_dir(&self, resource: &str) -> PathBuf {
        self.resources_root.join(resource)
    }

    pub fn global_env_file(&self, environment: &str) -> PathBuf {
        self.environments_root.join(format!("{}.yml", environment))
    }

    pub fn resource_env_file(&self, resource: &str, environment: &str) -> PathBuf {
        self.environments_root
            .join(resource)
            .join(format!("{}.yml", environment))
    }

    pub fn shared_template(&self, name: &str) -> PathBuf {
        self.templates_root.join(format!("{}{}", name, TEMPLATE_SUFFIX))
    }
}

fn expand_root(root: &str) -> PathBuf {
    if root.is_empty() {
        return PathBuf::from(".");
    }
    PathBuf::from(shellexpand::tilde(root).into_owned())
}

/// Template path for a file inside a resource directory.
pub fn template_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(TEMPLATE_SUFFIX);
    path.with_file_name(name)
}

/// Immutable per-invocation engine configuration.
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub layout: WorkspaceLayout,
    pub step_timeout: Duration,
}

impl EngineContext {
    pub fn new(layout: WorkspaceLayout, step_timeout: Duration) -> Self {
        Self {
            layout,
            step_timeout,
        }
    }
}
