//! Declarative rules parsed from markup attributes.
//!
//! ```text
//! bind:     <selector | GLOBAL.key>|<templateKey>
//! compute:  <targetKey>|<functionName>(<arg>, <arg>, ...)
//! watch:    <sourceKey>|<targetKey>|<functionName>
//! ```
//!
//! Rules are parsed once at mount time and never change afterwards.

use std::fmt;

use crate::error::{ReactiveError, Result};
use crate::lexer::{parse_call, split_args};

pub const GLOBAL_PREFIX: &str = "GLOBAL.";

/// Where a rule reads from or writes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceRef {
    /// Entry in the global registry.
    Global(String),
    /// Element in the document, located by selector.
    Element(String),
}

impl SourceRef {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if let Some(key) = text.strip_prefix(GLOBAL_PREFIX) {
            let key = key.trim();
            if key.is_empty() {
                return Err(ReactiveError::malformed_rule(text, "empty global key"));
            }
            return Ok(SourceRef::Global(key.to_string()));
        }
        if text.is_empty() {
            return Err(ReactiveError::malformed_rule(text, "empty source"));
        }
        Ok(SourceRef::Element(text.to_string()))
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Global(key) => write!(f, "{}{}", GLOBAL_PREFIX, key),
            SourceRef::Element(selector) => f.write_str(selector),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeRule {
    pub target_key: String,
    pub function_name: String,
    pub raw_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRule {
    pub source: SourceRef,
    pub target: SourceRef,
    pub function_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRule {
    pub source: SourceRef,
    pub template_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Bind,
    Compute,
    Watch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Bind(BindRule),
    Compute(ComputeRule),
    Watch(WatchRule),
}

impl Rule {
    pub fn parse(kind: RuleKind, text: &str) -> Result<Self> {
        match kind {
            RuleKind::Bind => parse_bind(text).map(Rule::Bind),
            RuleKind::Compute => parse_compute(text).map(Rule::Compute),
            RuleKind::Watch => parse_watch(text).map(Rule::Watch),
        }
    }
}

fn non_empty<'a>(rule: &str, part: Option<&'a str>, what: &str) -> Result<&'a str> {
    match part.map(str::trim) {
        Some(p) if !p.is_empty() => Ok(p),
        _ => Err(ReactiveError::malformed_rule(rule, &format!("missing {}", what))),
    }
}

pub fn parse_bind(text: &str) -> Result<BindRule> {
    let mut parts = text.split('|');
    let source = non_empty(text, parts.next(), "source")?;
    let template_key = non_empty(text, parts.next(), "template key")?;
    if parts.next().is_some() {
        return Err(ReactiveError::malformed_rule(text, "expected exactly one '|'"));
    }
    Ok(BindRule {
        source: SourceRef::parse(source)?,
        template_key: template_key.to_string(),
    })
}

pub fn parse_compute(text: &str) -> Result<ComputeRule> {
    // Quoted arguments may contain '|', so only the first one separates.
    let mut parts = text.splitn(2, '|');
    let target_key = non_empty(text, parts.next(), "target key")?;
    let call_text = non_empty(text, parts.next(), "function call")?;
    let call = parse_call(call_text)?;
    Ok(ComputeRule {
        target_key: target_key.to_string(),
        function_name: call.name,
        raw_args: split_args(&call.raw_args),
    })
}

pub fn parse_watch(text: &str) -> Result<WatchRule> {
    let mut parts = text.split('|');
    let source = non_empty(text, parts.next(), "source key")?;
    let target = non_empty(text, parts.next(), "target key")?;
    let function_name = non_empty(text, parts.next(), "function name")?;
    if parts.next().is_some() {
        return Err(ReactiveError::malformed_rule(text, "expected exactly two '|'"));
    }
    Ok(WatchRule {
        source: SourceRef::parse(source)?,
        target: SourceRef::parse(target)?,
        function_name: function_name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bind() {
        let rule = parse_bind("GLOBAL.name | greeting").unwrap();
        assert_eq!(rule.source, SourceRef::Global("name".into()));
        assert_eq!(rule.template_key, "greeting");

        let rule = parse_bind("#name-input|value").unwrap();
        assert_eq!(rule.source, SourceRef::Element("#name-input".into()));
    }

    #[test]
    fn test_parse_bind_missing_parts() {
        assert!(matches!(
            parse_bind("GLOBAL.name"),
            Err(ReactiveError::MalformedRule { .. })
        ));
        assert!(matches!(
            parse_bind("|key"),
            Err(ReactiveError::MalformedRule { .. })
        ));
        assert!(matches!(
            parse_bind("GLOBAL.|key"),
            Err(ReactiveError::MalformedRule { .. })
        ));
        assert!(parse_bind("a|b|c").is_err());
    }

    #[test]
    fn test_parse_compute() {
        let rule = parse_compute("total | sum(GLOBAL.a, element(#b), 3, \"x|y\")").unwrap();
        assert_eq!(rule.target_key, "total");
        assert_eq!(rule.function_name, "sum");
        assert_eq!(
            rule.raw_args,
            vec!["GLOBAL.a", "element(#b)", "3", "\"x|y\""]
        );
    }

    #[test]
    fn test_parse_compute_malformed_call() {
        assert!(matches!(
            parse_compute("total|sum"),
            Err(ReactiveError::MalformedCall { .. })
        ));
        assert!(matches!(
            parse_compute("total"),
            Err(ReactiveError::MalformedRule { .. })
        ));
    }

    #[test]
    fn test_parse_watch() {
        let rule = parse_watch("GLOBAL.celsius|#fahrenheit|toFahrenheit").unwrap();
        assert_eq!(rule.source, SourceRef::Global("celsius".into()));
        assert_eq!(rule.target, SourceRef::Element("#fahrenheit".into()));
        assert_eq!(rule.function_name, "toFahrenheit");
        assert!(parse_watch("GLOBAL.a|GLOBAL.b").is_err());
        assert!(parse_watch("a|b|c|d").is_err());
    }

    #[test]
    fn test_rule_dispatch_and_display() {
        let rule = Rule::parse(RuleKind::Watch, "a|GLOBAL.b|f").unwrap();
        match rule {
            Rule::Watch(w) => {
                assert_eq!(w.source.to_string(), "a");
                assert_eq!(w.target.to_string(), "GLOBAL.b");
            }
            other => panic!("unexpected rule {:?}", other),
        }
    }
}
