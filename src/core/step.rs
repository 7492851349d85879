//! Step dispatch.
//!
//! Decides which template(s) to render and which script to execute for a
//! step, by action kind:
//!
//! - `cloudformation` / `terraform`: shared deploy-script template and the
//!   fixed artifact name for the type, rendered from the shared templates
//!   folder into the resource directory.
//! - `custom-cloudformation` / `custom-terraform`: the step's own script
//!   template from the resource directory, fixed artifact name.
//! - anything else (including `shell`): the step's own script and template
//!   names, both from the resource directory.
//!
//! Missing templates and missing step config files are fatal; everything
//! the script itself does wrong comes back as an `error` StepResult.

use std::path::PathBuf;

use crate::config::{self, ResolvedConfig};
use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::log_status;
use crate::paths::{template_for, EngineContext};
use crate::process::{self, StepResult};
use crate::task::{
    ActionKind, Step, Task, DEPLOY_CFN_SCRIPT, DEPLOY_CFN_TEMPLATE, DEPLOY_TERRAFORM_SCRIPT,
    DEPLOY_TERRAFORM_TEMPLATE,
};
use crate::template;

struct StepPlan {
    script_template: PathBuf,
    script_path: PathBuf,
    artifact_name: Option<String>,
    artifact_is_shared: bool,
}

fn plan(ctx: &EngineContext, task: &Task, step: &Step) -> Result<StepPlan> {
    let resource_dir = ctx.layout.resource_dir(&task.resource);

    let own_script = || -> Result<&str> {
        step.action_script.as_deref().ok_or_else(|| {
            Error::validation_invalid_argument(
                "action_script",
                format!("Step '{}' has no action_script", step.name),
                Some(task.resource.clone()),
            )
        })
    };

    let plan = match step.kind() {
        ActionKind::Cloudformation => StepPlan {
            script_template: ctx.layout.shared_template(DEPLOY_CFN_SCRIPT),
            script_path: resource_dir.join(DEPLOY_CFN_SCRIPT),
            artifact_name: Some(DEPLOY_CFN_TEMPLATE.to_string()),
            artifact_is_shared: true,
        },
        ActionKind::Terraform => StepPlan {
            script_template: ctx.layout.shared_template(DEPLOY_TERRAFORM_SCRIPT),
            script_path: resource_dir.join(DEPLOY_TERRAFORM_SCRIPT),
            artifact_name: Some(DEPLOY_TERRAFORM_TEMPLATE.to_string()),
            artifact_is_shared: true,
        },
        ActionKind::CustomCloudformation => {
            let script = own_script()?;
            StepPlan {
                script_template: template_for(&resource_dir.join(script)),
                script_path: resource_dir.join(script),
                artifact_name: Some(DEPLOY_CFN_TEMPLATE.to_string()),
                artifact_is_shared: false,
            }
        }
        ActionKind::CustomTerraform => {
            let script = own_script()?;
            StepPlan {
                script_template: template_for(&resource_dir.join(script)),
                script_path: resource_dir.join(script),
                artifact_name: Some(DEPLOY_TERRAFORM_TEMPLATE.to_string()),
                artifact_is_shared: false,
            }
        }
        ActionKind::Custom => {
            let script = own_script()?;
            StepPlan {
                script_template: template_for(&resource_dir.join(script)),
                script_path: resource_dir.join(script),
                artifact_name: step.action_template.clone(),
                artifact_is_shared: false,
            }
        }
    };
    Ok(plan)
}

/// Render, execute, and record one step.
///
/// Fatal template/config failures propagate as typed errors for the task
/// executor to catch; process-level failures are data in the result.
pub fn run_step(
    ctx: &EngineContext,
    ledger: &Ledger,
    task: &Task,
    step: &Step,
    configuration: &ResolvedConfig,
    run_id: &str,
) -> Result<StepResult> {
    let resource_dir = ctx.layout.resource_dir(&task.resource);
    let plan = plan(ctx, task, step)?;
    let kind = step.kind();

    log_status!(
        "step",
        "Dispatching step '{}' ({}) for resource '{}'",
        step.name,
        step.action_type,
        task.resource
    );

    // The action script is always rendered fresh; a missing script template
    // is fatal for the step.
    template::materialize(&plan.script_template, &plan.script_path, configuration, true)?;

    // Infrastructure kinds optionally render a deploy artifact, folding in
    // the step's own config document before substitution.
    let render_artifact = match kind {
        k if k.is_infrastructure() => step.use_template,
        _ => plan.artifact_name.is_some(),
    };

    if render_artifact {
        if let Some(artifact_name) = &plan.artifact_name {
            let mut effective = configuration.clone();
            if kind.is_infrastructure() {
                if let Some(config_name) = &step.action_config {
                    let config_path = resource_dir.join(config_name);
                    if !config_path.exists() {
                        return Err(Error::step_config_missing(
                            config_path.display().to_string(),
                            task.resource.clone(),
                        ));
                    }
                    effective = config::merge(effective, config::load_yaml_map(&config_path));
                }
            }

            let artifact_template = if plan.artifact_is_shared {
                ctx.layout.shared_template(artifact_name)
            } else {
                template_for(&resource_dir.join(artifact_name))
            };
            template::materialize(
                &artifact_template,
                &resource_dir.join(artifact_name),
                &effective,
                false,
            )?;
        }
    }

    let result = process::run(&task.resource, &plan.script_path, run_id, ctx.step_timeout);
    ledger.insert_step(run_id, &task.name, &step.name, &result)?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::ledger::RunAction;
    use crate::paths::WorkspaceLayout;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn context(root: &std::path::Path) -> EngineContext {
        let root = root.to_string_lossy();
        EngineContext::new(
            WorkspaceLayout::new(&root, &root, &root, &root),
            Duration::from_secs(30),
        )
    }

    fn config(pairs: &[(&str, &str)]) -> ResolvedConfig {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn task(resource: &str, steps: Vec<Step>) -> Task {
        Task {
            name: "task1".to_string(),
            resource: resource.to_string(),
            environment: "np".to_string(),
            task_type: "infrastructure".to_string(),
            steps,
        }
    }

    fn shell_step(script: &str) -> Step {
        Step {
            name: "deploy".to_string(),
            action_type: "shell".to_string(),
            action_script: Some(script.to_string()),
            action_template: None,
            use_template: false,
            action_config: None,
        }
    }

    #[test]
    fn shell_step_renders_and_executes_resource_script() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path());
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.insert_run("run-1", "widget", RunAction::Build).unwrap();

        let res_dir = ctx.layout.resource_dir("res1");
        fs::create_dir_all(&res_dir).unwrap();
        fs::write(res_dir.join("deploy.sh.tpl"), "echo {{region}}\n").unwrap();

        let task = task("res1", vec![]);
        let result = run_step(
            &ctx,
            &ledger,
            &task,
            &shell_step("deploy.sh"),
            &config(&[("region", "us-east-1")]),
            "run-1",
        )
        .unwrap();

        assert!(!result.is_error());
        assert_eq!(result.message.trim(), "us-east-1");

        let steps = ledger.steps_for_run("run-1").unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].step_name, "deploy");
        assert_eq!(steps[0].resource, "res1");
    }

    #[test]
    fn missing_script_template_is_fatal() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path());
        let ledger = Ledger::open_in_memory().unwrap();
        let task = task("res1", vec![]);

        let err = run_step(
            &ctx,
            &ledger,
            &task,
            &shell_step("deploy.sh"),
            &config(&[]),
            "run-1",
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::TemplateMissing);
        // No step row is recorded for a step that never ran.
        assert!(ledger.steps_for_run("run-1").unwrap().is_empty());
    }

    #[test]
    fn cloudformation_step_uses_shared_templates_and_merges_step_config() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path());
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.insert_run("run-1", "widget", RunAction::Build).unwrap();

        let res_dir = ctx.layout.resource_dir("res1");
        fs::create_dir_all(&res_dir).unwrap();
        fs::create_dir_all(&ctx.layout.templates_root).unwrap();
        fs::write(
            ctx.layout.shared_template(DEPLOY_CFN_SCRIPT),
            "echo deploying {{stack}}\n",
        )
        .unwrap();
        fs::write(
            ctx.layout.shared_template(DEPLOY_CFN_TEMPLATE),
            "Stack: {{stack}}\nSize: {{size}}\n",
        )
        .unwrap();
        fs::write(res_dir.join("stack.yml"), "size: large\n").unwrap();

        let step = Step {
            name: "deploy-cfn".to_string(),
            action_type: "cloudformation".to_string(),
            action_script: None,
            action_template: None,
            use_template: true,
            action_config: Some("stack.yml".to_string()),
        };
        let task = task("res1", vec![]);

        let result = run_step(&ctx, &ledger, &task, &step, &config(&[("stack", "core")]), "run-1").unwrap();
        assert!(!result.is_error());

        // Artifact rendered into the resource directory with merged config.
        let artifact = fs::read_to_string(res_dir.join(DEPLOY_CFN_TEMPLATE)).unwrap();
        assert_eq!(artifact, "Stack: core\nSize: large\n");
        // Script rendered from the shared folder into the resource directory.
        assert!(res_dir.join(DEPLOY_CFN_SCRIPT).exists());
    }

    #[test]
    fn declared_but_missing_step_config_is_fatal() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path());
        let ledger = Ledger::open_in_memory().unwrap();

        let res_dir = ctx.layout.resource_dir("res1");
        fs::create_dir_all(&res_dir).unwrap();
        fs::create_dir_all(&ctx.layout.templates_root).unwrap();
        fs::write(ctx.layout.shared_template(DEPLOY_CFN_SCRIPT), "echo hi\n").unwrap();

        let step = Step {
            name: "deploy-cfn".to_string(),
            action_type: "cloudformation".to_string(),
            action_script: None,
            action_template: None,
            use_template: true,
            action_config: Some("absent.yml".to_string()),
        };
        let task = task("res1", vec![]);

        let err = run_step(&ctx, &ledger, &task, &step, &config(&[]), "run-1").unwrap_err();
        assert_eq!(err.code, ErrorCode::StepConfigMissing);
    }

    #[test]
    fn custom_terraform_uses_own_script_but_fixed_artifact() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path());
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.insert_run("run-1", "widget", RunAction::Build).unwrap();

        let res_dir = ctx.layout.resource_dir("res1");
        fs::create_dir_all(&res_dir).unwrap();
        fs::write(res_dir.join("apply.sh.tpl"), "echo applying\n").unwrap();
        fs::write(
            res_dir.join("resources.tf.tpl"),
            "variable \"region\" { default = \"{{region}}\" }\n",
        )
        .unwrap();

        let step = Step {
            name: "apply".to_string(),
            action_type: "custom-terraform".to_string(),
            action_script: Some("apply.sh".to_string()),
            action_template: None,
            use_template: true,
            action_config: None,
        };
        let task = task("res1", vec![]);

        let result = run_step(
            &ctx,
            &ledger,
            &task,
            &step,
            &config(&[("region", "us-east-1")]),
            "run-1",
        )
        .unwrap();
        assert!(!result.is_error());
        let artifact = fs::read_to_string(res_dir.join("resources.tf")).unwrap();
        assert!(artifact.contains("us-east-1"));
    }

    #[test]
    fn failing_script_is_data_not_an_error() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path());
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.insert_run("run-1", "widget", RunAction::Build).unwrap();

        let res_dir = ctx.layout.resource_dir("res1");
        fs::create_dir_all(&res_dir).unwrap();
        fs::write(res_dir.join("deploy.sh.tpl"), "echo nope >&2\nexit 1\n").unwrap();

        let task = task("res1", vec![]);
        let result = run_step(
            &ctx,
            &ledger,
            &task,
            &shell_step("deploy.sh"),
            &config(&[]),
            "run-1",
        )
        .unwrap();
        assert!(result.is_error());
        assert_eq!(result.message.trim(), "nope");

        let steps = ledger.steps_for_run("run-1").unwrap();
        assert_eq!(steps.len(), 1);
        assert!(matches!(steps[0].status, crate::process::StepStatus::Error));
    }
}
