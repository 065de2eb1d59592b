//! Property-style view over a [`Store`].
//!
//! Same notification semantics as the store it wraps; the value is read and
//! replaced through `state` instead of `get`/`set`. Computed targets are
//! created as object stores.

use serde_json::Value;

use crate::error::Result;
use crate::options::RuntimeOptions;
use crate::store::{Callback, Store, Unsubscribe};

#[derive(Debug, Clone)]
pub struct ObjectStore {
    store: Store,
}

impl ObjectStore {
    pub fn new(initial: Value) -> Self {
        Self {
            store: Store::new(initial),
        }
    }

    pub fn with_options(initial: Value, options: &RuntimeOptions) -> Self {
        Self {
            store: Store::with_options(initial, options),
        }
    }

    pub fn from_store(store: Store) -> Self {
        Self { store }
    }

    pub fn state(&self) -> Value {
        self.store.get()
    }

    pub fn set_state(&self, value: Value) -> Result<()> {
        self.store.set(value)
    }

    /// Modify the state in place, then notify with the result.
    pub fn update_state<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Value),
    {
        let mut value = self.store.get();
        f(&mut value);
        self.store.set(value)
    }

    pub fn subscribe<F>(&self, key: impl Into<String>, callback: F) -> Result<Unsubscribe>
    where
        F: Fn(&str, &Value) -> Result<()> + 'static,
    {
        self.store.subscribe(key, callback)
    }

    pub fn subscribe_rc(&self, key: impl Into<String>, callback: Callback) -> Result<Unsubscribe> {
        self.store.subscribe_rc(key, callback)
    }

    pub fn unsubscribe(&self, key: &str) -> Result<()> {
        self.store.unsubscribe(key)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}
