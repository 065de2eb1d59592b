//! Parameter resolution and dependency extraction.
//!
//! One raw argument resolves to a value by the first rule that matches:
//!
//! 1. `element(<selector>)` → current value of that element's reactive state
//! 2. `GLOBAL.<identifier>` → current value of that global
//! 3. a JSON literal → the parsed literal
//! 4. anything else → the trimmed text as a string
//!
//! The two reference patterns are checked before the JSON attempt, and an
//! unknown element or global resolves to `null` rather than failing.

use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::document::Dom;
use crate::registry::GlobalRegistry;

lazy_static! {
    static ref ELEMENT_RE: Regex = Regex::new(r"^element\(([^)]*)\)$").unwrap();
    static ref GLOBAL_RE: Regex = Regex::new(r"^GLOBAL\.([A-Za-z_$][A-Za-z0-9_$]*)$").unwrap();
}

/// What a raw argument refers to, before any lookup happens.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Element(String),
    Global(String),
    Literal(Value),
    Raw(String),
}

impl Param {
    pub fn classify(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(caps) = ELEMENT_RE.captures(raw) {
            return Param::Element(caps[1].trim().to_string());
        }
        if let Some(caps) = GLOBAL_RE.captures(raw) {
            return Param::Global(caps[1].to_string());
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Param::Literal(value),
            Err(_) => Param::Raw(raw.to_string()),
        }
    }
}

/// Sources a compute rule reads, in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySet {
    pub global_keys: BTreeSet<String>,
    pub element_selectors: BTreeSet<String>,
}

impl DependencySet {
    pub fn is_empty(&self) -> bool {
        self.global_keys.is_empty() && self.element_selectors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.global_keys.len() + self.element_selectors.len()
    }
}

/// Collect the element and global references in `args` without reading them.
pub fn extract_dependencies(args: &[String]) -> DependencySet {
    let mut deps = DependencySet::default();
    for arg in args {
        match Param::classify(arg) {
            Param::Element(selector) => {
                deps.element_selectors.insert(selector);
            }
            Param::Global(key) => {
                deps.global_keys.insert(key);
            }
            Param::Literal(_) | Param::Raw(_) => {}
        }
    }
    deps
}

/// Reads live values out of the registries and the document.
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    globals: &'a GlobalRegistry,
    dom: &'a dyn Dom,
}

impl<'a> Resolver<'a> {
    pub fn new(globals: &'a GlobalRegistry, dom: &'a dyn Dom) -> Self {
        Self { globals, dom }
    }

    pub fn resolve(&self, raw: &str) -> Value {
        match Param::classify(raw) {
            Param::Element(selector) => self.element(&selector),
            Param::Global(key) => self.global(&key),
            Param::Literal(value) => value,
            Param::Raw(text) => Value::String(text),
        }
    }

    pub fn resolve_all(&self, args: &[String]) -> Vec<Value> {
        args.iter().map(|arg| self.resolve(arg)).collect()
    }

    pub fn global(&self, key: &str) -> Value {
        self.globals.read(key).unwrap_or(Value::Null)
    }

    /// An element that is missing or not yet reactive reads as `null`.
    pub fn element(&self, selector: &str) -> Value {
        self.dom
            .find(selector)
            .and_then(|id| self.dom.reactive(id))
            .map(|state| state.read())
            .unwrap_or(Value::Null)
    }
}

/// Argument handed to watch functions.
///
/// `global` and `element` read lazily, at the moment the function asks.
pub struct WatchContext<'a> {
    pub value: Value,
    resolver: Resolver<'a>,
}

impl<'a> WatchContext<'a> {
    pub fn new(value: Value, resolver: Resolver<'a>) -> Self {
        Self { value, resolver }
    }

    pub fn global(&self, key: &str) -> Value {
        self.resolver.global(key)
    }

    pub fn element(&self, selector: &str) -> Value {
        self.resolver.element(selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, EmptyDom};
    use crate::options::RuntimeOptions;
    use serde_json::json;

    #[test]
    fn test_literal_precedence() {
        let globals = GlobalRegistry::new();
        let resolver = Resolver::new(&globals, &EmptyDom);
        assert_eq!(resolver.resolve("123"), json!(123));
        assert_eq!(resolver.resolve("\"123\""), json!("123"));
        assert_eq!(resolver.resolve("true"), json!(true));
        assert_eq!(resolver.resolve("null"), Value::Null);
        assert_eq!(resolver.resolve("[1,2]"), json!([1, 2]));
        assert_eq!(resolver.resolve(r#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(resolver.resolve("hello world"), json!("hello world"));
        // Single quotes are not JSON, so the quotes stay in the string.
        assert_eq!(resolver.resolve("'x'"), json!("'x'"));
    }

    #[test]
    fn test_global_reference() {
        let globals = GlobalRegistry::new();
        globals.register_store("count", json!(4), &RuntimeOptions::default());
        let resolver = Resolver::new(&globals, &EmptyDom);
        assert_eq!(resolver.resolve("GLOBAL.count"), json!(4));
        assert_eq!(resolver.resolve("GLOBAL.missing"), Value::Null);
        // Not an identifier, so not a global reference.
        assert_eq!(resolver.resolve("GLOBAL.a.b"), json!("GLOBAL.a.b"));
    }

    #[test]
    fn test_element_reference() {
        let doc = Document::parse(
            r#"<input id="n" data-model value="7"><span id="plain"></span>"#,
            &RuntimeOptions::default(),
        )
        .unwrap();
        let globals = GlobalRegistry::new();
        let resolver = Resolver::new(&globals, &doc);
        assert_eq!(resolver.resolve("element(#n)"), json!(7));
        assert_eq!(resolver.resolve("element( #n )"), json!(7));
        assert_eq!(resolver.resolve("element(#plain)"), Value::Null);
        assert_eq!(resolver.resolve("element(#nope)"), Value::Null);
    }

    #[test]
    fn test_classify() {
        assert_eq!(Param::classify("element(.a b)"), Param::Element(".a b".into()));
        assert_eq!(Param::classify(" GLOBAL.x "), Param::Global("x".into()));
        assert_eq!(Param::classify("element(a)b)"), Param::Raw("element(a)b)".into()));
    }

    #[test]
    fn test_extract_dependencies() {
        let args: Vec<String> = [
            "GLOBAL.a",
            "element(#b)",
            "GLOBAL.a",
            "3",
            "\"GLOBAL.c\"",
            "plain",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let deps = extract_dependencies(&args);
        assert_eq!(deps.global_keys.into_iter().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(
            deps.element_selectors.into_iter().collect::<Vec<_>>(),
            vec!["#b"]
        );
    }

    #[test]
    fn test_watch_context_reads_lazily() {
        let globals = GlobalRegistry::new();
        let opts = RuntimeOptions::default();
        let rate = globals.register_store("rate", json!(2), &opts);
        let ctx = WatchContext::new(json!(10), Resolver::new(&globals, &EmptyDom));
        rate.set(json!(3)).unwrap();
        assert_eq!(ctx.value, json!(10));
        assert_eq!(ctx.global("rate"), json!(3));
        assert_eq!(ctx.element("#x"), Value::Null);
    }
}
