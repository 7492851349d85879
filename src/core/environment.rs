//! Merged-environment preview.
//!
//! Resolves the same configuration the engine would hand to each task,
//! including the step-level config documents pulled in by `use_template`,
//! without rendering or executing anything. Useful for debugging a
//! component's effective variables before a build.

use serde::Serialize;
use std::collections::HashMap;

use crate::config;
use crate::error::{Error, Result};
use crate::paths::WorkspaceLayout;
use crate::task;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentReport {
    pub component: String,
    pub environment: HashMap<String, String>,
}

/// Compute the merged environment a build of `component` would see.
///
/// Later tasks overwrite earlier ones on key collision, matching the
/// order-dependent behavior of task execution.
pub fn get_environment(layout: &WorkspaceLayout, component: &str) -> Result<EnvironmentReport> {
    let tasks =
        task::load_tasks(layout, component).ok_or_else(|| Error::task_file_not_found(component))?;

    let mut merged = HashMap::new();
    for task in &tasks {
        let resolved = config::resolve(layout, &task.resource, &task.environment);
        merged = config::merge(merged, resolved);

        for step in &task.steps {
            if !step.use_template {
                continue;
            }
            if let Some(config_name) = &step.action_config {
                let config_path = layout.resource_dir(&task.resource).join(config_name);
                merged = config::merge(merged, config::load_yaml_map(&config_path));
            }
        }
    }

    Ok(EnvironmentReport {
        component: component.to_string(),
        environment: merged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_task_file_is_not_found() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_string_lossy();
        let layout = WorkspaceLayout::new(&root, &root, &root, &root);

        let err = get_environment(&layout, "ghost").unwrap_err();
        assert_eq!(err.code, ErrorCode::TaskFileNotFound);
    }

    #[test]
    fn folds_task_config_and_step_config_documents() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_string_lossy();
        let layout = WorkspaceLayout::new(&root, &root, &root, &root);

        fs::create_dir_all(&layout.tasks_root).unwrap();
        fs::write(
            layout.task_file("widget"),
            concat!(
                "- name: task1\n",
                "  resource: res1\n",
                "  environment: np\n",
                "  steps:\n",
                "    - name: deploy\n",
                "      type: cloudformation\n",
                "      use_template: true\n",
                "      action_config: stack.yml\n",
            ),
        )
        .unwrap();
        fs::create_dir_all(layout.environments_root.join("res1")).unwrap();
        fs::write(layout.global_env_file("np"), "region: us-east-1\n").unwrap();
        fs::write(layout.resource_env_file("res1", "np"), "instance: t3.micro\n").unwrap();
        let res_dir = layout.resource_dir("res1");
        fs::create_dir_all(&res_dir).unwrap();
        fs::write(res_dir.join("stack.yml"), "size: large\nregion: eu-west-1\n").unwrap();

        let report = get_environment(&layout, "widget").unwrap();
        assert_eq!(report.environment.get("instance").unwrap(), "t3.micro");
        assert_eq!(report.environment.get("size").unwrap(), "large");
        // Step config overwrites the task-level value.
        assert_eq!(report.environment.get("region").unwrap(), "eu-west-1");
    }
}
