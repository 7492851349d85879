//! Layered configuration resolution.
//!
//! A task's configuration is the global environment document merged with the
//! resource-scoped override document. Resolution is read-only and recomputed
//! per task; nothing here persists.

use std::collections::HashMap;
use std::path::Path;

use crate::log_status;
use crate::paths::WorkspaceLayout;

pub type ResolvedConfig = HashMap<String, String>;

/// Resolve the merged configuration for a (resource, environment) pair.
///
/// Missing and malformed documents both degrade to an empty map: the source
/// data cannot distinguish the two, and callers treat any empty result as
/// "configuration missing, abort the task".
pub fn resolve(layout: &WorkspaceLayout, resource: &str, environment: &str) -> ResolvedConfig {
    let global_path = layout.global_env_file(environment);
    let resource_path = layout.resource_env_file(resource, environment);

    if !global_path.exists() || !resource_path.exists() {
        log_status!(
            "config",
            "Missing environment document for resource '{}' ({} / {})",
            resource,
            global_path.display(),
            resource_path.display()
        );
        return ResolvedConfig::new();
    }

    let global = load_yaml_map(&global_path);
    let overrides = load_yaml_map(&resource_path);
    merge(global, overrides)
}

/// Shallow merge: resource-scoped keys overwrite global keys, everything
/// else passes through. Nested values are not merged recursively.
pub fn merge(global: ResolvedConfig, overrides: ResolvedConfig) -> ResolvedConfig {
    let mut merged = global;
    merged.extend(overrides);
    merged
}

/// Load a YAML mapping as string key/values.
///
/// Scalars are stringified; nested structures are carried as inline JSON so
/// they survive template substitution. Missing or malformed files yield an
/// empty map with a logged warning, never an error.
pub fn load_yaml_map(path: &Path) -> ResolvedConfig {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => {
            log_status!("config", "Cannot read {}", path.display());
            return ResolvedConfig::new();
        }
    };

    match serde_yml::from_str::<serde_yml::Value>(&raw) {
        Ok(serde_yml::Value::Mapping(mapping)) => mapping
            .into_iter()
            .filter_map(|(key, value)| {
                let key = yaml_scalar_to_string(&key)?;
                Some((key, yaml_value_to_string(&value)))
            })
            .collect(),
        Ok(_) => {
            log_status!("config", "Document {} is not a mapping", path.display());
            ResolvedConfig::new()
        }
        Err(e) => {
            log_status!("config", "Malformed YAML in {}: {}", path.display(), e);
            ResolvedConfig::new()
        }
    }
}

fn yaml_scalar_to_string(value: &serde_yml::Value) -> Option<String> {
    match value {
        serde_yml::Value::String(s) => Some(s.clone()),
        serde_yml::Value::Number(n) => Some(n.to_string()),
        serde_yml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn yaml_value_to_string(value: &serde_yml::Value) -> String {
    match value {
        serde_yml::Value::String(s) => s.clone(),
        serde_yml::Value::Number(n) => n.to_string(),
        serde_yml::Value::Bool(b) => b.to_string(),
        serde_yml::Value::Null => String::new(),
        other => serde_json::to_value(other)
            .ok()
            .and_then(|v| serde_json::to_string(&v).ok())
            .unwrap_or_default(),
    }
}
