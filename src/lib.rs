//! # Reactive Attribute Runtime
//!
//! Markup attributes declare how values flow through a page; this crate parses
//! them and wires synchronous push notifications between stores, computed
//! values, watchers and rendered templates.
//!
//! ```text
//! data-compute="total|sum(GLOBAL.price, element(#qty), 2)"
//! data-watch="GLOBAL.celsius|#fahrenheit|toFahrenheit"
//! data-bind="GLOBAL.total|amount"          (inside: "Total: {{amount}}")
//! ```
//!
//! ## Runtime Invariants
//!
//! 1. **Synchronous Push**: `Store::set` runs every subscriber, in insertion
//!    order, before it returns. Cascades complete depth-first on the call stack.
//!
//! 2. **One Callback Per Key**: a store rejects a duplicate subscription key
//!    instead of overwriting it.
//!
//! 3. **Named Functions Only**: markup refers to functions registered by name.
//!    No text from an attribute is ever executed.
//!
//! 4. **Resolution Order**: `element(...)`, then `GLOBAL.x`, then a JSON
//!    literal, then the raw string.
//!
//! 5. **Isolated Failures**: a failing subscriber never starves its siblings;
//!    a malformed rule aborts only its own element.
//!
//! 6. **No Cycle Detection**: a dependency cycle recurses until the stack runs
//!    out, unless `maxNotifyDepth` is configured.

mod document;
mod error;
mod lexer;
mod object_store;
mod options;
mod reactive;
mod registry;
mod resolve;
mod rule;
mod runtime;
mod store;
mod template;


pub use document::{Document, Dom, ElementId, EmptyDom};
pub use error::{FunctionError, ReactiveError, Result};
pub use lexer::{parse_call, split_args, ArgScanner, Call, QuoteState};
pub use object_store::ObjectStore;
pub use options::{AttributeNames, ErrorPolicy, RuntimeOptions};
pub use reactive::{Reactive, SharedReactive};
pub use registry::{ComputeFn, Function, FunctionRegistry, GlobalRegistry, WatchFn};
pub use resolve::{extract_dependencies, DependencySet, Param, Resolver, WatchContext};
pub use rule::{
    parse_bind, parse_compute, parse_watch, BindRule, ComputeRule, Rule, RuleKind, SourceRef,
    WatchRule, GLOBAL_PREFIX,
};
pub use runtime::{MountFailure, MountReport, Runtime, Wiring};
pub use store::{Callback, Store, Unsubscribe};
pub use template::{display_value, placeholders, render_template};
