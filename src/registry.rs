//! Name tables populated by setup code and read at wiring time.
//!
//! Both registries are plain values owned by a [`crate::Runtime`]; nothing
//! here is process-global, so every test gets a clean pair.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::error::{FunctionError, ReactiveError, Result};
use crate::options::RuntimeOptions;
use crate::reactive::SharedReactive;
use crate::resolve::WatchContext;
use crate::store::Store;

pub type ComputeFn = Rc<dyn Fn(&[Value]) -> Result<Value, FunctionError>>;
pub type WatchFn = Rc<dyn Fn(&WatchContext<'_>) -> Result<Value, FunctionError>>;

/// A user function callable from markup by name.
#[derive(Clone)]
pub enum Function {
    /// Receives the resolved positional arguments of a compute rule.
    Compute(ComputeFn),
    /// Receives the context of a watch rule.
    Watch(WatchFn),
}

impl Function {
    pub fn compute<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, FunctionError> + 'static,
    {
        Function::Compute(Rc::new(f))
    }

    pub fn watch<F>(f: F) -> Self
    where
        F: Fn(&WatchContext<'_>) -> Result<Value, FunctionError> + 'static,
    {
        Function::Watch(Rc::new(f))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Function::Compute(_) => "compute",
            Function::Watch(_) => "watch",
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function::{}", self.kind())
    }
}

#[derive(Default)]
pub struct FunctionRegistry {
    functions: RefCell<HashMap<String, Function>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `function` under `name`, returning whatever it replaced.
    pub fn register(&self, name: impl Into<String>, function: Function) -> Option<Function> {
        self.functions.borrow_mut().insert(name.into(), function)
    }

    pub fn lookup(&self, name: &str) -> Option<Function> {
        self.functions.borrow().get(name).cloned()
    }

    pub fn compute_fn(&self, name: &str) -> Result<ComputeFn> {
        match self.lookup(name) {
            Some(Function::Compute(f)) => Ok(f),
            Some(Function::Watch(_)) => Err(ReactiveError::WrongFunctionKind {
                name: name.to_string(),
                expected: "compute",
            }),
            None => Err(ReactiveError::UnknownFunction {
                name: name.to_string(),
            }),
        }
    }

    pub fn watch_fn(&self, name: &str) -> Result<WatchFn> {
        match self.lookup(name) {
            Some(Function::Watch(f)) => Ok(f),
            Some(Function::Compute(_)) => Err(ReactiveError::WrongFunctionKind {
                name: name.to_string(),
                expected: "watch",
            }),
            None => Err(ReactiveError::UnknownFunction {
                name: name.to_string(),
            }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.borrow().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.functions.borrow_mut().clear();
    }
}

/// Name → reactive object table behind `GLOBAL.<name>` references.
#[derive(Default)]
pub struct GlobalRegistry {
    entries: RefCell<HashMap<String, SharedReactive>>,
}

impl GlobalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, reactive: SharedReactive) -> Option<SharedReactive> {
        self.entries.borrow_mut().insert(name.into(), reactive)
    }

    /// Register a fresh [`Store`] holding `initial` and return it.
    pub fn register_store(&self, name: impl Into<String>, initial: Value, options: &RuntimeOptions) -> Store {
        let store = Store::with_options(initial, options);
        self.register(name, Rc::new(store.clone()));
        store
    }

    pub fn lookup(&self, name: &str) -> Option<SharedReactive> {
        self.entries.borrow().get(name).cloned()
    }

    /// Current value of `name`, read through the reactive capability.
    pub fn read(&self, name: &str) -> Option<Value> {
        // Release the table borrow before calling into the entry.
        let entry = self.lookup(name)?;
        Some(entry.read())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.borrow().contains_key(name)
    }

    pub fn remove(&self, name: &str) -> Option<SharedReactive> {
        self.entries.borrow_mut().remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::ObjectStore;
    use serde_json::json;

    #[test]
    fn test_function_lookup_by_kind() {
        let functions = FunctionRegistry::new();
        functions.register("double", Function::compute(|args| Ok(args[0].clone())));
        functions.register("echo", Function::watch(|ctx| Ok(ctx.value.clone())));

        assert!(functions.compute_fn("double").is_ok());
        assert!(functions.watch_fn("echo").is_ok());
        assert_eq!(
            functions.compute_fn("echo").err(),
            Some(ReactiveError::WrongFunctionKind {
                name: "echo".into(),
                expected: "compute"
            })
        );
        assert_eq!(
            functions.watch_fn("missing").err(),
            Some(ReactiveError::UnknownFunction {
                name: "missing".into()
            })
        );
    }

    #[test]
    fn test_function_clear() {
        let functions = FunctionRegistry::new();
        assert!(functions
            .register("f", Function::compute(|_| Ok(Value::Null)))
            .is_none());
        assert!(functions
            .register("f", Function::compute(|_| Ok(json!(1))))
            .is_some());
        assert_eq!(functions.len(), 1);
        functions.clear();
        assert!(functions.is_empty());
        assert!(!functions.contains("f"));
    }

    #[test]
    fn test_globals_read_through_either_representation() {
        let globals = GlobalRegistry::new();
        let opts = RuntimeOptions::default();
        let store = globals.register_store("a", json!(1), &opts);
        globals.register("b", Rc::new(ObjectStore::new(json!("two"))));

        store.set(json!(3)).unwrap();
        assert_eq!(globals.read("a"), Some(json!(3)));
        assert_eq!(globals.read("b"), Some(json!("two")));
        assert_eq!(globals.read("c"), None);
        assert_eq!(globals.names(), vec!["a", "b"]);

        assert!(globals.remove("a").is_some());
        globals.clear();
        assert!(globals.is_empty());
    }
}
