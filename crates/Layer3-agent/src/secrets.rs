//! Sensitive data placeholders
//!
//! The model only ever sees `<secret>name</secret>`; values are swapped in
//! right before an action runs.

use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

fn placeholder() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"<secret>\s*([^<]+?)\s*</secret>").ok())
        .as_ref()
}

/// Replace known placeholders inside every string of `value`
pub fn substitute(value: &Value, secrets: &HashMap<String, String>) -> Value {
    if secrets.is_empty() {
        return value.clone();
    }

    match value {
        Value::String(s) => Value::String(substitute_str(s, secrets)),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, secrets)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, secrets)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Unknown placeholders are left as written
pub fn substitute_str(text: &str, secrets: &HashMap<String, String>) -> String {
    let Some(pattern) = placeholder() else {
        return text.to_string();
    };

    pattern
        .replace_all(text, |caps: &Captures| match secrets.get(&caps[1]) {
            Some(secret) => secret.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Replace any secret value that leaked into `text` with its placeholder
pub fn redact(text: &str, secrets: &HashMap<String, String>) -> String {
    let mut out = text.to_string();
    let mut by_length: Vec<(&String, &String)> =
        secrets.iter().filter(|(_, v)| !v.is_empty()).collect();
    by_length.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    for (name, value) in by_length {
        out = out.replace(value.as_str(), &format!("<secret>{}</secret>", name));
    }
    out
}

/// Placeholder names for the prompt, sorted
pub fn placeholder_names(secrets: &HashMap<String, String>) -> Vec<String> {
    let mut names: Vec<String> = secrets.keys().cloned().collect();
    names.sort();
    names
}
