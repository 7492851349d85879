use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ValidationInvalidArgument,

    TaskFileNotFound,
    RunNotFound,

    TemplateMissing,
    StepConfigMissing,

    RunAlreadyInProgress,
    LedgerFailure,

    InternalIoError,
    InternalJsonError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::TaskFileNotFound => "task.file_not_found",
            ErrorCode::RunNotFound => "run.not_found",

            ErrorCode::TemplateMissing => "template.missing",
            ErrorCode::StepConfigMissing => "step.config_missing",

            ErrorCode::RunAlreadyInProgress => "run.already_in_progress",
            ErrorCode::LedgerFailure => "ledger.failure",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundDetails {
    pub id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMissingDetails {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepConfigMissingDetails {
    pub path: String,
    pub resource: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerFailureDetails {
    pub operation: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
    ) -> Self {
        let details = serde_json::to_value(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.into(),
            id,
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            details,
        )
    }

    pub fn task_file_not_found(component: impl Into<String>) -> Self {
        let component = component.into();
        let details = serde_json::to_value(NotFoundDetails {
            id: component.clone(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(
            ErrorCode::TaskFileNotFound,
            format!("Task file {}.yml not found", component),
            details,
        )
        .with_hint("Check --task-root: the component's task list must live at <task-root>/tasks/<component>.yml")
    }

    pub fn run_not_found(component: impl Into<String>) -> Self {
        let component = component.into();
        let details = serde_json::to_value(NotFoundDetails {
            id: component.clone(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(
            ErrorCode::RunNotFound,
            format!("No run recorded for component '{}'", component),
            details,
        )
    }

    pub fn template_missing(path: impl Into<String>, resource: Option<String>) -> Self {
        let path = path.into();
        let details = serde_json::to_value(TemplateMissingDetails {
            path: path.clone(),
            resource,
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(
            ErrorCode::TemplateMissing,
            format!("Template not found: {}", path),
            details,
        )
    }

    pub fn step_config_missing(path: impl Into<String>, resource: impl Into<String>) -> Self {
        let path = path.into();
        let details = serde_json::to_value(StepConfigMissingDetails {
            path: path.clone(),
            resource: resource.into(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(
            ErrorCode::StepConfigMissing,
            format!("Step configuration file not found: {}", path),
            details,
        )
    }

    pub fn ledger(operation: impl Into<String>, error: impl Into<String>) -> Self {
        let details = serde_json::to_value(LedgerFailureDetails {
            operation: operation.into(),
            error: error.into(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(ErrorCode::LedgerFailure, "Ledger operation failed", details)
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = serde_json::to_value(InternalIoErrorDetails {
            error: error.into(),
            context,
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(ErrorCode::InternalIoError, "IO error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let error: String = error.into();
        let details = serde_json::json!({
            "error": error,
            "context": context,
        });
        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref failure, _) = err {
            // The partial unique index on started runs is the only unique
            // constraint a caller can trip during normal operation.
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
                return Error::new(
                    ErrorCode::RunAlreadyInProgress,
                    "A run for this component and action is already in progress",
                    serde_json::json!({ "error": err.to_string() }),
                );
            }
        }
        Error::ledger("sqlite", err.to_string())
    }
}
