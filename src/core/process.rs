//! Script execution.
//!
//! This is the single place where host-process failures are normalized into
//! data: missing scripts, spawn errors, non-zero exits, and timeouts all
//! come back as an `error` StepResult. Nothing raises past this boundary.

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::log_status;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Error,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Success => "success",
            StepStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> StepStatus {
        match s {
            "success" => StepStatus::Success,
            _ => StepStatus::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub resource: String,
    pub status: StepStatus,
    pub message: String,
    pub run_id: String,
}

impl StepResult {
    pub fn error(resource: &str, message: impl Into<String>, run_id: &str) -> Self {
        Self {
            resource: resource.to_string(),
            status: StepStatus::Error,
            message: message.into(),
            run_id: run_id.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == StepStatus::Error
    }
}

/// Execute a rendered script and capture its outcome.
///
/// Zero exit yields `success` with stdout as message; non-zero yields
/// `error` with stderr. The child is killed once `timeout` expires.
pub fn run(resource: &str, script_path: &Path, run_id: &str, timeout: Duration) -> StepResult {
    if !script_path.exists() {
        log_status!(
            "exec",
            "Script {} does not exist for resource {}",
            script_path.display(),
            resource
        );
        return StepResult::error(
            resource,
            format!("Script path {} does not exist", script_path.display()),
            run_id,
        );
    }

    log_status!("exec", "Running {} for {}", script_path.display(), resource);

    let child = Command::new("bash")
        .arg(script_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();

    let mut child = match child {
        Ok(child) => child,
        Err(e) => return StepResult::error(resource, e.to_string(), run_id),
    };

    // Drain the pipes on threads so a chatty script can't deadlock the
    // try_wait poll loop on a full pipe buffer.
    let stdout_handle = spawn_reader(child.stdout.take());
    let stderr_handle = spawn_reader(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Ok(status),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    break Err(format!(
                        "Script {} timed out after {}s",
                        script_path.display(),
                        timeout.as_secs()
                    ));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => break Err(e.to_string()),
        }
    };

    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();

    match status {
        Ok(status) if status.success() => StepResult {
            resource: resource.to_string(),
            status: StepStatus::Success,
            message: stdout,
            run_id: run_id.to_string(),
        },
        Ok(_) => StepResult::error(resource, stderr, run_id),
        Err(message) => StepResult::error(resource, message, run_id),
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    source: Option<R>,
) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut source) = source {
            let _ = source.read_to_string(&mut buf);
        }
        buf
    })
}
