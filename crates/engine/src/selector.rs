//! Tagged selector shorthand
//!
//! Rows address elements with `tag=value` shorthands. [`normalize`] rewrites
//! them into the driver's native selector syntax; anything untagged is
//! assumed to be native already and passes through unchanged.

/// Rewrite a shorthand selector into driver-native syntax
pub fn normalize(raw: &str) -> String {
    let sel = raw.trim().trim_matches('"');

    if sel.starts_with("text=") || sel.starts_with("xpath=") {
        return sel.to_string();
    }
    if let Some(value) = sel.strip_prefix("fullxpath=") {
        return format!("xpath={}", value);
    }
    if let Some(value) = sel.strip_prefix("id=") {
        return format!("#{}", value);
    }
    if let Some(value) = sel.strip_prefix("class=") {
        return format!(".{}", value);
    }

    for attr in ["name", "type", "placeholder"] {
        if let Some(value) = sel
            .strip_prefix(attr)
            .and_then(|rest| rest.strip_prefix('='))
        {
            return format!("[{}=\"{}\"]", attr, value);
        }
    }

    sel.to_string()
}

/// Split a `selector:value` cell at the first colon
pub fn split_target(raw: &str) -> (&str, Option<&str>) {
    match raw.split_once(':') {
        Some((selector, value)) => (selector.trim(), Some(value.trim())),
        None => (raw.trim(), None),
    }
}

/// Split a multi-target expression on `&`, dropping empty parts
pub fn split_targets(expr: &str) -> Vec<&str> {
    expr.split('&')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
