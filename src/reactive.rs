//! The one capability every reactive source exposes.
//!
//! Both the accessor-style [`Store`] and the property-style [`ObjectStore`]
//! implement [`Reactive`], so the resolver and the wiring code never branch
//! on which representation a global or element carries.

use std::rc::Rc;

use serde_json::Value;

use crate::error::Result;
use crate::object_store::ObjectStore;
use crate::store::{Callback, Store, Unsubscribe};

pub trait Reactive {
    fn read(&self) -> Value;
    fn write(&self, value: Value) -> Result<()>;
    fn subscribe(&self, key: &str, callback: Callback) -> Result<Unsubscribe>;
    fn unsubscribe(&self, key: &str) -> Result<()>;
}

impl Reactive for Store {
    fn read(&self) -> Value {
        self.get()
    }

    fn write(&self, value: Value) -> Result<()> {
        self.set(value)
    }

    fn subscribe(&self, key: &str, callback: Callback) -> Result<Unsubscribe> {
        self.subscribe_rc(key, callback)
    }

    fn unsubscribe(&self, key: &str) -> Result<()> {
        Store::unsubscribe(self, key)
    }
}

impl Reactive for ObjectStore {
    fn read(&self) -> Value {
        self.state()
    }

    fn write(&self, value: Value) -> Result<()> {
        self.set_state(value)
    }

    fn subscribe(&self, key: &str, callback: Callback) -> Result<Unsubscribe> {
        self.subscribe_rc(key, callback)
    }

    fn unsubscribe(&self, key: &str) -> Result<()> {
        ObjectStore::unsubscribe(self, key)
    }
}

/// Shared handle used by the registries and the document.
pub type SharedReactive = Rc<dyn Reactive>;
