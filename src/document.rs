//! # Document Collaborator
//!
//! The runtime never touches markup directly. Everything it needs from the
//! page goes through the [`Dom`] trait:
//!
//! 1. **Lookup**: find an element by selector
//! 2. **Reactive state**: the store behind a model element, if any
//! 3. **Rendering**: write one template value into an element
//! 4. **Discovery**: list the elements carrying a rule attribute
//!
//! [`Document`] implements it over an HTML string parsed with html5ever. The
//! tree is flattened into element records at parse time; after that only the
//! rendered content and model stores change.
//!
//! An element's template is its own text, without its descendants' text, so
//! nested elements carrying their own placeholders render independently.
//!
//! ## Selectors
//!
//! One compound selector: an optional tag followed by any number of `#id`,
//! `.class`, `[attr]` and `[attr=value]` parts. Combinators are not
//! supported and never match.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use html5ever::parse_document;
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use regex::Regex;
use serde_json::Value;
use tendril::TendrilSink;
use tracing::debug;

use crate::error::{ReactiveError, Result};
use crate::options::RuntimeOptions;
use crate::reactive::SharedReactive;
use crate::store::Store;
use crate::template::{display_value, render_template};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub usize);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element#{}", self.0)
    }
}

pub trait Dom {
    fn find(&self, selector: &str) -> Option<ElementId>;

    /// Reactive state of an element, `None` when the element has none yet.
    fn reactive(&self, id: ElementId) -> Option<SharedReactive>;

    /// Set template value `key` on `id` and re-render its content.
    fn render(&self, id: ElementId, key: &str, value: &Value) -> Result<()>;

    /// Elements carrying `attribute`, with its value, in document order.
    fn elements_with(&self, attribute: &str) -> Vec<(ElementId, String)>;

    /// Short human label for logs.
    fn describe(&self, id: ElementId) -> String;
}

/// A page with no elements. Element references resolve to `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyDom;

impl Dom for EmptyDom {
    fn find(&self, _selector: &str) -> Option<ElementId> {
        None
    }

    fn reactive(&self, _id: ElementId) -> Option<SharedReactive> {
        None
    }

    fn render(&self, _id: ElementId, _key: &str, _value: &Value) -> Result<()> {
        Ok(())
    }

    fn elements_with(&self, _attribute: &str) -> Vec<(ElementId, String)> {
        Vec::new()
    }

    fn describe(&self, id: ElementId) -> String {
        id.to_string()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SELECTORS
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"^([A-Za-z][A-Za-z0-9-]*|\*)").unwrap();
    static ref PART_RE: Regex = Regex::new(
        r#"^(?:#([\w-]+)|\.([\w-]+)|\[\s*([\w-]+)\s*(?:=\s*(?:"([^"]*)"|'([^']*)'|([^\]\s]*))\s*)?\])"#
    )
    .unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SelectorPart {
    Id(String),
    Class(String),
    Attr(String, Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Selector {
    tag: Option<String>,
    parts: Vec<SelectorPart>,
}

impl Selector {
    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let mut rest = text;
        let mut tag = None;
        if let Some(m) = TAG_RE.find(rest) {
            if m.as_str() != "*" {
                tag = Some(m.as_str().to_ascii_lowercase());
            }
            rest = &rest[m.end()..];
        }

        let mut parts = Vec::new();
        while !rest.is_empty() {
            let caps = PART_RE.captures(rest)?;
            let part = if let Some(id) = caps.get(1) {
                SelectorPart::Id(id.as_str().to_string())
            } else if let Some(class) = caps.get(2) {
                SelectorPart::Class(class.as_str().to_string())
            } else {
                let name = caps.get(3)?.as_str().to_ascii_lowercase();
                let value = caps
                    .get(4)
                    .or_else(|| caps.get(5))
                    .or_else(|| caps.get(6))
                    .map(|m| m.as_str().to_string());
                SelectorPart::Attr(name, value)
            };
            parts.push(part);
            rest = &rest[caps.get(0)?.end()..];
        }

        Some(Self { tag, parts })
    }

    fn matches(&self, element: &ElementRecord) -> bool {
        if let Some(tag) = &self.tag {
            if !element.tag.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        self.parts.iter().all(|part| match part {
            SelectorPart::Id(id) => element.attribute("id") == Some(id.as_str()),
            SelectorPart::Class(class) => element
                .attribute("class")
                .map(|c| c.split_whitespace().any(|c| c == class))
                .unwrap_or(false),
            SelectorPart::Attr(name, None) => element.attribute(name).is_some(),
            SelectorPart::Attr(name, Some(value)) => {
                element.attribute(name) == Some(value.as_str())
            }
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DOCUMENT
// ═══════════════════════════════════════════════════════════════════════════════

struct ElementRecord {
    tag: String,
    attributes: Vec<(String, String)>,
    /// Text content at parse time; placeholders are rendered from this.
    template: String,
    content: RefCell<String>,
    values: RefCell<HashMap<String, String>>,
    state: Option<Store>,
}

impl ElementRecord {
    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

pub struct Document {
    elements: Vec<ElementRecord>,
}

impl Document {
    /// Parse `html` and give every model element a store seeded from its
    /// `value` attribute (a JSON literal if it parses, else the raw text).
    pub fn parse(html: &str, options: &RuntimeOptions) -> Result<Self> {
        let dom = parse_document(RcDom::default(), Default::default())
            .from_utf8()
            .read_from(&mut html.as_bytes())
            .map_err(|e| ReactiveError::Document {
                message: format!("failed to parse HTML: {}", e),
            })?;

        let mut elements = Vec::new();
        collect_elements(&dom.document, options, &mut elements);
        debug!(elements = elements.len(), "document parsed");
        Ok(Self { elements })
    }

    fn record(&self, id: ElementId) -> Option<&ElementRecord> {
        self.elements.get(id.0)
    }

    pub fn query_all(&self, selector: &str) -> Vec<ElementId> {
        let Some(selector) = Selector::parse(selector) else {
            return Vec::new();
        };
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, el)| selector.matches(el))
            .map(|(i, _)| ElementId(i))
            .collect()
    }

    pub fn attribute(&self, id: ElementId, name: &str) -> Option<&str> {
        self.record(id)?.attribute(name)
    }

    pub fn tag(&self, id: ElementId) -> Option<&str> {
        self.record(id).map(|el| el.tag.as_str())
    }

    /// Rendered text of the first element matching `selector`.
    pub fn content(&self, selector: &str) -> Option<String> {
        let id = self.find(selector)?;
        self.record(id).map(|el| el.content.borrow().clone())
    }

    /// Model store of the first element matching `selector`.
    pub fn state(&self, selector: &str) -> Option<Store> {
        let id = self.find(selector)?;
        self.record(id)?.state.clone()
    }

    /// Input-event adapter: push raw text typed into a model element.
    pub fn input(&self, selector: &str, text: &str) -> Result<()> {
        let store = self
            .state(selector)
            .ok_or_else(|| ReactiveError::missing_dependency(selector, "model state"))?;
        store.set(Value::String(text.to_string()))
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl Dom for Document {
    fn find(&self, selector: &str) -> Option<ElementId> {
        let found = self.query_all(selector).into_iter().next();
        if found.is_none() {
            debug!(selector = %selector, "no element matches");
        }
        found
    }

    fn reactive(&self, id: ElementId) -> Option<SharedReactive> {
        let store = self.record(id)?.state.clone()?;
        Some(Rc::new(store))
    }

    fn render(&self, id: ElementId, key: &str, value: &Value) -> Result<()> {
        let Some(el) = self.record(id) else {
            return Err(ReactiveError::missing_dependency(key, &id.to_string()));
        };
        el.values
            .borrow_mut()
            .insert(key.to_string(), display_value(value));
        let rendered = render_template(&el.template, &el.values.borrow())?;
        *el.content.borrow_mut() = rendered;
        Ok(())
    }

    fn elements_with(&self, attribute: &str) -> Vec<(ElementId, String)> {
        self.elements
            .iter()
            .enumerate()
            .filter_map(|(i, el)| {
                el.attribute(attribute)
                    .map(|v| (ElementId(i), v.to_string()))
            })
            .collect()
    }

    fn describe(&self, id: ElementId) -> String {
        match self.record(id) {
            Some(el) => match el.attribute("id") {
                Some(dom_id) => format!("{}#{}", el.tag, dom_id),
                None => format!("{}[{}]", el.tag, id.0),
            },
            None => id.to_string(),
        }
    }
}

fn collect_elements(handle: &Handle, options: &RuntimeOptions, out: &mut Vec<ElementRecord>) {
    let model_attr = options.attributes.model.as_str();
    if let NodeData::Element { name, attrs, .. } = &handle.data {
        let attributes: Vec<(String, String)> = attrs
            .borrow()
            .iter()
            .map(|a| (a.name.local.to_string(), a.value.to_string()))
            .collect();
        let template = own_text(handle);

        let state = if attributes.iter().any(|(n, _)| n == model_attr) {
            let initial = attributes
                .iter()
                .find(|(n, _)| n == "value")
                .map(|(_, v)| {
                    serde_json::from_str(v).unwrap_or_else(|_| Value::String(v.clone()))
                })
                .unwrap_or_else(|| Value::String(template.trim().to_string()));
            Some(Store::with_options(initial, options))
        } else {
            None
        };

        out.push(ElementRecord {
            tag: name.local.to_string(),
            attributes,
            content: RefCell::new(template.clone()),
            template,
            values: RefCell::new(HashMap::new()),
            state,
        });
    }

    for child in handle.children.borrow().iter() {
        collect_elements(child, options, out);
    }
}

/// Concatenated text of the element's direct text children.
fn own_text(handle: &Handle) -> String {
    let mut text = String::new();
    for child in handle.children.borrow().iter() {
        if let NodeData::Text { contents } = &child.data {
            text.push_str(&contents.borrow());
        }
    }
    text
}
