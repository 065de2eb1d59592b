//! Keyed publish primitive.
//!
//! A [`Store`] holds one [`Value`] and an ordered table of callbacks, at most
//! one per key. `set` assigns the value and then runs every callback
//! synchronously, in insertion order, before returning. Callbacks may call
//! `set` on this or any other store; the nested notification completes before
//! the outer one moves on to its next subscriber.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::{error, trace};

use crate::error::{ReactiveError, Result};
use crate::options::{ErrorPolicy, RuntimeOptions};

/// Subscriber signature: `(subscription key, new value)`.
pub type Callback = Rc<dyn Fn(&str, &Value) -> Result<()>>;

thread_local! {
    /// Nesting level of `Store::set` dispatches on this thread, across all stores.
    static NOTIFY_DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct DepthGuard {
    depth: usize,
}

impl DepthGuard {
    fn enter() -> Self {
        let depth = NOTIFY_DEPTH.with(|d| {
            let next = d.get() + 1;
            d.set(next);
            next
        });
        Self { depth }
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        NOTIFY_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

struct StoreInner {
    value: RefCell<Value>,
    subscriptions: RefCell<Vec<(String, Callback)>>,
    policy: ErrorPolicy,
    max_depth: Option<usize>,
}

#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl Store {
    pub fn new(initial: Value) -> Self {
        Self::with_options(initial, &RuntimeOptions::default())
    }

    pub fn with_options(initial: Value, options: &RuntimeOptions) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                value: RefCell::new(initial),
                subscriptions: RefCell::new(Vec::new()),
                policy: options.error_policy,
                max_depth: options.max_notify_depth,
            }),
        }
    }

    pub fn get(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    /// Assign `value` and notify every subscriber.
    ///
    /// Subscriber failures are logged with their key. Under
    /// [`ErrorPolicy::Production`] they are swallowed; under
    /// [`ErrorPolicy::Development`] the first one is returned after the
    /// remaining subscribers have run.
    pub fn set(&self, value: Value) -> Result<()> {
        *self.inner.value.borrow_mut() = value.clone();

        // Snapshot so callbacks can subscribe/unsubscribe on this store.
        let callbacks: Vec<(String, Callback)> = self.inner.subscriptions.borrow().clone();
        if callbacks.is_empty() {
            return Ok(());
        }

        let guard = DepthGuard::enter();
        if let Some(limit) = self.inner.max_depth {
            if guard.depth > limit {
                let key = callbacks
                    .first()
                    .map(|(k, _)| k.clone())
                    .unwrap_or_default();
                let err = ReactiveError::CycleDetected { key, limit };
                error!(depth = guard.depth, value = %value, error = %err, "notification aborted");
                return match self.inner.policy {
                    ErrorPolicy::Production => Ok(()),
                    ErrorPolicy::Development => Err(err),
                };
            }
        }

        let mut first_error = None;
        for (key, callback) in callbacks.iter() {
            trace!(key = %key, depth = guard.depth, "notify");
            if let Err(err) = callback(key, &value) {
                error!(key = %key, value = %value, error = %err, "subscriber failed");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }

        match (self.inner.policy, first_error) {
            (ErrorPolicy::Development, Some(err)) => Err(err),
            _ => Ok(()),
        }
    }

    /// Register `callback` under `key`. Fails if `key` is already live.
    pub fn subscribe<F>(&self, key: impl Into<String>, callback: F) -> Result<Unsubscribe>
    where
        F: Fn(&str, &Value) -> Result<()> + 'static,
    {
        self.subscribe_rc(key, Rc::new(callback))
    }

    pub fn subscribe_rc(&self, key: impl Into<String>, callback: Callback) -> Result<Unsubscribe> {
        let key = key.into();
        let mut subs = self.inner.subscriptions.borrow_mut();
        if subs.iter().any(|(k, _)| *k == key) {
            return Err(ReactiveError::DuplicateKey { key });
        }
        subs.push((key.clone(), callback));
        Ok(Unsubscribe {
            store: Rc::downgrade(&self.inner),
            key,
        })
    }

    pub fn unsubscribe(&self, key: &str) -> Result<()> {
        let mut subs = self.inner.subscriptions.borrow_mut();
        match subs.iter().position(|(k, _)| k == key) {
            Some(index) => {
                subs.remove(index);
                Ok(())
            }
            None => Err(ReactiveError::MissingKey {
                key: key.to_string(),
            }),
        }
    }

    pub fn is_subscribed(&self, key: &str) -> bool {
        self.inner.subscriptions.borrow().iter().any(|(k, _)| k == key)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriptions.borrow().len()
    }

    /// Subscription keys in notification order.
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .subscriptions
            .borrow()
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn ptr_eq(&self, other: &Store) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("value", &*self.inner.value.borrow())
            .field("keys", &self.keys())
            .finish()
    }
}

/// Handle returned by `subscribe`, bound to one key on one store.
///
/// Holds the store weakly; unsubscribing after the store is gone succeeds.
#[derive(Debug, Clone)]
pub struct Unsubscribe {
    store: Weak<StoreInner>,
    key: String,
}

impl Unsubscribe {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn unsubscribe(self) -> Result<()> {
        match self.store.upgrade() {
            Some(inner) => Store { inner }.unsubscribe(&self.key),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str) -> Callback) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log2 = log.clone();
        let make = move |tag: &str| -> Callback {
            let log = log2.clone();
            let tag = tag.to_string();
            Rc::new(move |key: &str, value: &Value| -> Result<()> {
                log.borrow_mut().push(format!("{}:{}={}", tag, key, value));
                Ok(())
            })
        };
        (log, make)
    }

    #[test]
    fn test_get_after_set() {
        let store = Store::new(json!(1));
        assert_eq!(store.get(), json!(1));
        store.set(json!({"a": [1, 2]})).unwrap();
        assert_eq!(store.get(), json!({"a": [1, 2]}));
    }

    #[test]
    fn test_notifies_in_insertion_order() {
        let store = Store::new(Value::Null);
        let (log, make) = recorder();
        store.subscribe_rc("b", make("first")).unwrap();
        store.subscribe_rc("a", make("second")).unwrap();
        store.set(json!(7)).unwrap();
        assert_eq!(*log.borrow(), vec!["first:b=7", "second:a=7"]);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let store = Store::new(Value::Null);
        store.subscribe("k", |_, _| Ok(())).unwrap();
        let err = store.subscribe("k", |_, _| Ok(())).unwrap_err();
        assert_eq!(err, ReactiveError::DuplicateKey { key: "k".into() });
        assert_eq!(store.subscriber_count(), 1);
    }

    #[test]
    fn test_unsubscribe_missing_key() {
        let store = Store::new(Value::Null);
        let err = store.unsubscribe("nope").unwrap_err();
        assert_eq!(err, ReactiveError::MissingKey { key: "nope".into() });
    }

    #[test]
    fn test_resubscribe_after_unsubscribe() {
        let store = Store::new(Value::Null);
        let handle = store.subscribe("k", |_, _| Ok(())).unwrap();
        assert_eq!(handle.key(), "k");
        handle.unsubscribe().unwrap();
        assert!(!store.is_subscribed("k"));
        store.subscribe("k", |_, _| Ok(())).unwrap();
        assert!(store.is_subscribed("k"));
    }

    #[test]
    fn test_handle_after_store_dropped() {
        let store = Store::new(Value::Null);
        let handle = store.subscribe("k", |_, _| Ok(())).unwrap();
        drop(store);
        assert!(handle.unsubscribe().is_ok());
    }

    #[test]
    fn test_failing_subscriber_does_not_starve_others() {
        let store = Store::new(Value::Null);
        let (log, make) = recorder();
        store
            .subscribe("bad", |key, _| {
                Err(ReactiveError::Evaluation {
                    key: key.to_string(),
                    message: "boom".into(),
                })
            })
            .unwrap();
        store.subscribe_rc("good", make("ok")).unwrap();
        assert!(store.set(json!(1)).is_ok());
        assert_eq!(*log.borrow(), vec!["ok:good=1"]);
    }

    #[test]
    fn test_development_policy_reraises_after_siblings() {
        let store = Store::with_options(Value::Null, &RuntimeOptions::development());
        let (log, make) = recorder();
        store
            .subscribe("bad", |key, _| {
                Err(ReactiveError::Evaluation {
                    key: key.to_string(),
                    message: "boom".into(),
                })
            })
            .unwrap();
        store.subscribe_rc("good", make("ok")).unwrap();
        let err = store.set(json!(1)).unwrap_err();
        assert!(matches!(err, ReactiveError::Evaluation { ref key, .. } if key == "bad"));
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_reentrant_cascade_completes_before_return() {
        let a = Store::new(json!(0));
        let b = Store::new(json!(0));
        let (log, make) = recorder();

        let b2 = b.clone();
        a.subscribe("to-b", move |_, v| b2.set(json!(v.as_i64().unwrap_or(0) + 1)))
            .unwrap();
        a.subscribe_rc("after", make("a")).unwrap();
        b.subscribe_rc("seen", make("b")).unwrap();

        a.set(json!(1)).unwrap();
        assert_eq!(b.get(), json!(2));
        // b's subscriber runs inside a's first callback, before a's second.
        assert_eq!(*log.borrow(), vec!["b:seen=2", "a:after=1"]);
    }

    #[test]
    fn test_reentrant_set_on_same_store() {
        let store = Store::new(json!(0));
        let s2 = store.clone();
        store
            .subscribe("clamp", move |_, v| {
                if v.as_i64().unwrap_or(0) > 10 {
                    s2.set(json!(10))
                } else {
                    Ok(())
                }
            })
            .unwrap();
        store.set(json!(42)).unwrap();
        assert_eq!(store.get(), json!(10));
    }

    #[test]
    fn test_unsubscribe_from_inside_callback() {
        let store = Store::new(json!(0));
        let s2 = store.clone();
        store
            .subscribe("once", move |key, _| s2.unsubscribe(key))
            .unwrap();
        store.set(json!(1)).unwrap();
        assert_eq!(store.subscriber_count(), 0);
        store.set(json!(2)).unwrap();
    }

    #[test]
    fn test_depth_guard_stops_cycle() {
        let opts = RuntimeOptions {
            max_notify_depth: Some(8),
            ..RuntimeOptions::default()
        };
        let a = Store::with_options(json!(0), &opts);
        let b = Store::with_options(json!(0), &opts);
        let (a2, b2) = (a.clone(), b.clone());
        a.subscribe("a->b", move |_, v| b2.set(json!(v.as_i64().unwrap_or(0) + 1)))
            .unwrap();
        b.subscribe("b->a", move |_, v| a2.set(json!(v.as_i64().unwrap_or(0) + 1)))
            .unwrap();

        assert!(a.set(json!(0)).is_ok());
        // Eight nested dispatches ran, the ninth set assigned but did not notify.
        assert_eq!(a.get(), json!(8));
        assert_eq!(b.get(), json!(7));
    }

    #[test]
    fn test_depth_guard_development_reports_cycle() {
        let opts = RuntimeOptions {
            error_policy: ErrorPolicy::Development,
            max_notify_depth: Some(4),
            ..RuntimeOptions::default()
        };
        let a = Store::with_options(json!(0), &opts);
        let a2 = a.clone();
        a.subscribe("self", move |_, v| a2.set(json!(v.as_i64().unwrap_or(0) + 1)))
            .unwrap();
        let err = a.set(json!(0)).unwrap_err();
        assert_eq!(
            err,
            ReactiveError::CycleDetected {
                key: "self".into(),
                limit: 4
            }
        );
    }
}
