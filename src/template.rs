//! `{{identifier}}` placeholder substitution.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::error::{ReactiveError, Result};

lazy_static! {
    static ref PLACEHOLDER_RE: Regex =
        Regex::new(r"\{\{\s*([A-Za-z_$][A-Za-z0-9_$]*)\s*\}\}").unwrap();
}

/// Identifiers referenced by `template`, in order of first appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER_RE.captures_iter(template) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Replace every placeholder in `template` with its entry in `values`.
pub fn render_template(template: &str, values: &HashMap<String, String>) -> Result<String> {
    let mut missing = None;
    let rendered = PLACEHOLDER_RE.replace_all(template, |caps: &Captures| {
        let name = &caps[1];
        match values.get(name) {
            Some(value) => value.clone(),
            None => {
                if missing.is_none() {
                    missing = Some(name.to_string());
                }
                String::new()
            }
        }
    });
    match missing {
        Some(name) => Err(ReactiveError::UnmappedPlaceholder { name }),
        None => Ok(rendered.into_owned()),
    }
}

/// Text shown for a value: strings raw, `null` as nothing, the rest as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render() {
        let out = render_template(
            "Hello {{name}}, you have {{ count }} messages. {{name}}!",
            &values(&[("name", "Ada"), ("count", "3")]),
        )
        .unwrap();
        assert_eq!(out, "Hello Ada, you have 3 messages. Ada!");
    }

    #[test]
    fn test_unmapped_fails() {
        let err = render_template("{{a}} {{b}}", &values(&[("a", "1")])).unwrap_err();
        assert_eq!(err, ReactiveError::UnmappedPlaceholder { name: "b".into() });
    }

    #[test]
    fn test_non_placeholders_untouched() {
        let out = render_template("{{ 1x }} {single} {{}}", &HashMap::new()).unwrap();
        assert_eq!(out, "{{ 1x }} {single} {{}}");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders("{{a}}{{b}} {{ a }}"), vec!["a", "b"]);
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!("x")), "x");
        assert_eq!(display_value(&Value::Null), "");
        assert_eq!(display_value(&json!(2.5)), "2.5");
        assert_eq!(display_value(&json!([1, "a"])), r#"[1,"a"]"#);
    }
}
