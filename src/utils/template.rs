//! String template rendering utilities.

use std::collections::HashMap;

/// Replace every `{{key}}` placeholder with its value from the map.
///
/// Unknown placeholders are left untouched so a half-rendered artifact is
/// visible in the output rather than silently blanked.
pub fn render_map(template: &str, variables: &HashMap<String, String>) -> String {
    let mut result = template.to_string();

    for (key, value) in variables {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value);
    }

    result
}
