//! File-level template rendering.

use std::path::Path;

use crate::config::ResolvedConfig;
use crate::error::{Error, Result};
use crate::utils::io;
use crate::utils::template::render_map;

/// Render a template file against the resolved configuration.
///
/// A missing template is a hard failure; the dispatcher treats it as fatal
/// for the step rather than skipping.
pub fn render(template_path: &Path, config: &ResolvedConfig) -> Result<String> {
    if !template_path.exists() {
        return Err(Error::template_missing(
            template_path.display().to_string(),
            None,
        ));
    }
    let raw = io::read_file(template_path, "read template")?;
    Ok(render_map(&raw, config))
}

/// Render a template and write the result to its destination path,
/// optionally marking it executable.
pub fn materialize(
    template_path: &Path,
    destination: &Path,
    config: &ResolvedConfig,
    executable: bool,
) -> Result<()> {
    let rendered = render(template_path, config)?;
    io::write_file(destination, &rendered, "write rendered artifact")?;

    if executable {
        set_executable(destination)?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| Error::internal_io(e.to_string(), Some("chmod rendered script".to_string())))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}
