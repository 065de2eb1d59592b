//! # Wiring
//!
//! Turns parsed rules into subscription edges.
//!
//! ## Invariants
//!
//! 1. **One edge per target per source**: a compute rule subscribes under
//!    `computed-<target>`, a watch rule under `watch-<target>`, a bind rule
//!    under `bind-<templateKey>#<element>`. Wiring the same target twice
//!    without tearing down fails with `DuplicateKey`.
//! 2. **Fresh reads**: a trigger re-resolves every argument on each
//!    notification. Nothing is memoized.
//! 3. **Immediate value**: every wiring evaluates (or renders) once before
//!    returning, so the target holds a value as soon as setup is done.
//! 4. **Last good value**: a failed evaluation leaves the target untouched.
//! 5. **All or nothing**: a rule that fails to wire leaves no subscriptions
//!    behind.
//!
//! There is no cycle detection beyond the optional notification depth guard
//! on each store.

use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::document::{Dom, ElementId, EmptyDom};
use crate::error::{FunctionError, ReactiveError, Result};
use crate::object_store::ObjectStore;
use crate::options::{ErrorPolicy, RuntimeOptions};
use crate::reactive::SharedReactive;
use crate::registry::{ComputeFn, Function, FunctionRegistry, GlobalRegistry, WatchFn};
use crate::resolve::{extract_dependencies, Resolver, WatchContext};
use crate::rule::{BindRule, ComputeRule, Rule, RuleKind, SourceRef, WatchRule};
use crate::store::{Callback, Store, Unsubscribe};

struct RuntimeInner {
    options: RuntimeOptions,
    globals: GlobalRegistry,
    functions: FunctionRegistry,
    dom: Rc<dyn Dom>,
}

/// Owns the registries and the document for one page.
///
/// Cheap to clone. Subscription callbacks hold the runtime weakly, so
/// dropping the last handle turns every live trigger into a no-op.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new(options: RuntimeOptions) -> Self {
        Self::with_dom(Rc::new(EmptyDom), options)
    }

    pub fn with_dom(dom: Rc<dyn Dom>, options: RuntimeOptions) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                options,
                globals: GlobalRegistry::new(),
                functions: FunctionRegistry::new(),
                dom,
            }),
        }
    }

    fn downgrade(&self) -> Weak<RuntimeInner> {
        Rc::downgrade(&self.inner)
    }

    fn upgrade(weak: &Weak<RuntimeInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.inner.options
    }

    pub fn globals(&self) -> &GlobalRegistry {
        &self.inner.globals
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.inner.functions
    }

    pub fn dom(&self) -> &dyn Dom {
        self.inner.dom.as_ref()
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(self.globals(), self.dom())
    }

    /// Register a global [`Store`] holding `initial`.
    pub fn register_global(&self, name: impl Into<String>, initial: Value) -> Store {
        self.globals().register_store(name, initial, self.options())
    }

    pub fn register_function(&self, name: impl Into<String>, function: Function) {
        self.functions().register(name, function);
    }

    /// Empty both registries. Live subscriptions are not touched.
    pub fn clear(&self) {
        self.globals().clear();
        self.functions().clear();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SOURCES AND TARGETS
    // ═══════════════════════════════════════════════════════════════════════════

    /// A source that can be subscribed to, or `MissingDependency`.
    fn subscribable(&self, source: &SourceRef, target: &str) -> Result<SharedReactive> {
        match source {
            SourceRef::Global(key) => self
                .globals()
                .lookup(key)
                .ok_or_else(|| ReactiveError::missing_dependency(target, &source.to_string())),
            SourceRef::Element(selector) => {
                self.element_source(selector, target).map(|(_, state)| state)
            }
        }
    }

    /// The element `selector` matches, with its reactive state.
    fn element_source(&self, selector: &str, target: &str) -> Result<(ElementId, SharedReactive)> {
        self.dom()
            .find(selector)
            .and_then(|id| self.dom().reactive(id).map(|state| (id, state)))
            .ok_or_else(|| ReactiveError::missing_dependency(target, selector))
    }

    /// Existing global under `key`, or a fresh object store registered there.
    /// The flag is true when the target was created by this call.
    fn ensure_global_target(&self, key: &str) -> (SharedReactive, bool) {
        if let Some(existing) = self.globals().lookup(key) {
            return (existing, false);
        }
        let target: SharedReactive = Rc::new(ObjectStore::with_options(Value::Null, self.options()));
        self.globals().register(key, target.clone());
        (target, true)
    }

    /// Apply the error policy to an evaluation that ran outside a store.
    fn settle(&self, key: &str, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(key = %key, error = %err, "initial evaluation failed");
                match self.options().error_policy {
                    ErrorPolicy::Production => Ok(()),
                    ErrorPolicy::Development => Err(err),
                }
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // COMPUTE
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn wire_compute(&self, rule: &ComputeRule) -> Result<Wiring> {
        let function = self.functions().compute_fn(&rule.function_name)?;
        let deps = extract_dependencies(&rule.raw_args);

        let mut sources = Vec::with_capacity(deps.len());
        for key in &deps.global_keys {
            sources.push(self.subscribable(&SourceRef::Global(key.clone()), &rule.target_key)?);
        }
        // Different selectors may match one element; it gets one edge.
        let mut elements = BTreeSet::new();
        for selector in &deps.element_selectors {
            let (id, state) = self.element_source(selector, &rule.target_key)?;
            if elements.insert(id) {
                sources.push(state);
            }
        }

        let (target, created) = self.ensure_global_target(&rule.target_key);
        let key = format!("computed-{}", rule.target_key);

        let weak = self.downgrade();
        let shared_rule = Rc::new(rule.clone());
        let trigger_target = target.clone();
        let trigger_fn = function.clone();
        let trigger: Callback = Rc::new(move |_: &str, _: &Value| -> Result<()> {
            match Runtime::upgrade(&weak) {
                Some(runtime) => runtime.evaluate_compute(&shared_rule, &trigger_fn, &trigger_target),
                None => Ok(()),
            }
        });

        let wiring = match Wiring::subscribe_all(&rule.target_key, &key, &sources, &trigger) {
            Ok(wiring) => wiring,
            Err(err) => {
                if created {
                    self.globals().remove(&rule.target_key);
                }
                return Err(err);
            }
        };
        debug!(
            target = %rule.target_key,
            function = %rule.function_name,
            edges = wiring.edges(),
            "computed wired"
        );

        let initial = self.evaluate_compute(rule, &function, &target);
        if let Err(err) = self.settle(&rule.target_key, initial) {
            // Teardown cannot fail here: every key was just subscribed.
            let _ = wiring.teardown();
            if created {
                self.globals().remove(&rule.target_key);
            }
            return Err(err);
        }
        Ok(wiring)
    }

    fn evaluate_compute(
        &self,
        rule: &ComputeRule,
        function: &ComputeFn,
        target: &SharedReactive,
    ) -> Result<()> {
        let args = self.resolver().resolve_all(&rule.raw_args);
        match function(&args) {
            Ok(value) => target.write(value),
            Err(err) => Err(evaluation_error(&rule.target_key, err)),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // WATCH
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn wire_watch(&self, rule: &WatchRule) -> Result<Wiring> {
        let function = self.functions().watch_fn(&rule.function_name)?;
        let target_label = rule.target.to_string();
        let source = self.subscribable(&rule.source, &target_label)?;

        let (target, created) = match &rule.target {
            SourceRef::Global(key) => self.ensure_global_target(key),
            SourceRef::Element(_) => (self.subscribable(&rule.target, &target_label)?, false),
        };
        let key = format!("watch-{}", target_label);

        let weak = self.downgrade();
        let shared_label = target_label.clone();
        let trigger_target = target.clone();
        let trigger_fn = function.clone();
        let trigger: Callback = Rc::new(move |_: &str, value: &Value| -> Result<()> {
            match Runtime::upgrade(&weak) {
                Some(runtime) => runtime.evaluate_watch(
                    &shared_label,
                    &trigger_fn,
                    &trigger_target,
                    value.clone(),
                ),
                None => Ok(()),
            }
        });

        let wiring =
            match Wiring::subscribe_all(&target_label, &key, std::slice::from_ref(&source), &trigger)
            {
                Ok(wiring) => wiring,
                Err(err) => {
                    if let (true, SourceRef::Global(k)) = (created, &rule.target) {
                        self.globals().remove(k);
                    }
                    return Err(err);
                }
            };
        debug!(
            source = %rule.source,
            target = %target_label,
            function = %rule.function_name,
            "watch wired"
        );

        let initial = self.evaluate_watch(&target_label, &function, &target, source.read());
        if let Err(err) = self.settle(&target_label, initial) {
            let _ = wiring.teardown();
            if let (true, SourceRef::Global(k)) = (created, &rule.target) {
                self.globals().remove(k);
            }
            return Err(err);
        }
        Ok(wiring)
    }

    fn evaluate_watch(
        &self,
        target_label: &str,
        function: &WatchFn,
        target: &SharedReactive,
        value: Value,
    ) -> Result<()> {
        let ctx = WatchContext::new(value, self.resolver());
        match function(&ctx) {
            Ok(next) => target.write(next),
            Err(err) => Err(evaluation_error(target_label, err)),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BIND
    // ═══════════════════════════════════════════════════════════════════════════

    /// Render `rule.source` into `element` now and on every change.
    ///
    /// Render failures are logged and leave the content as it was.
    pub fn wire_bind(&self, element: ElementId, rule: &BindRule) -> Result<Wiring> {
        let label = self.dom().describe(element);
        let source = self.subscribable(&rule.source, &label)?;
        let key = format!("bind-{}#{}", rule.template_key, element.0);

        let weak = self.downgrade();
        let template_key = rule.template_key.clone();
        let render: Callback = Rc::new(move |_: &str, value: &Value| -> Result<()> {
            if let Some(runtime) = Runtime::upgrade(&weak) {
                runtime.render(element, &template_key, value);
            }
            Ok(())
        });

        let wiring = Wiring::subscribe_all(&label, &key, std::slice::from_ref(&source), &render)?;
        debug!(source = %rule.source, element = %label, key = %rule.template_key, "bind wired");

        self.render(element, &rule.template_key, &source.read());
        Ok(wiring)
    }

    fn render(&self, element: ElementId, template_key: &str, value: &Value) {
        if let Err(err) = self.dom().render(element, template_key, value) {
            warn!(
                element = %self.dom().describe(element),
                key = %template_key,
                error = %err,
                "render failed"
            );
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MOUNT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Wire one parsed rule found on `element`.
    pub fn wire(&self, element: ElementId, rule: &Rule) -> Result<Wiring> {
        match rule {
            Rule::Compute(r) => self.wire_compute(r),
            Rule::Watch(r) => self.wire_watch(r),
            Rule::Bind(r) => self.wire_bind(element, r),
        }
    }

    /// Wire every rule attribute in the document: computes, then watches,
    /// then binds. A failing rule is logged and recorded; the rest of the
    /// page still mounts.
    ///
    /// Every compute target and every global watch target is registered
    /// (as `null`) before anything is wired, and computes that read another
    /// compute's target are wired after it. Markup order therefore never
    /// decides whether a chain mounts.
    pub fn mount(&self) -> MountReport {
        let attrs = self.options().attributes.clone();
        let computes = self.pending(RuleKind::Compute, &attrs.compute);
        let watches = self.pending(RuleKind::Watch, &attrs.watch);
        let binds = self.pending(RuleKind::Bind, &attrs.bind);

        for pending in computes.iter().chain(&watches) {
            match &pending.rule {
                Ok(Rule::Compute(rule)) => {
                    self.ensure_global_target(&rule.target_key);
                }
                Ok(Rule::Watch(WatchRule {
                    target: SourceRef::Global(key),
                    ..
                })) => {
                    self.ensure_global_target(key);
                }
                _ => {}
            }
        }

        let mut report = MountReport::default();
        let ordered = dependency_order(computes)
            .into_iter()
            .chain(watches)
            .chain(binds);
        for PendingRule {
            element,
            text,
            rule,
        } in ordered
        {
            match rule.and_then(|rule| self.wire(element, &rule)) {
                Ok(wiring) => report.wirings.push(wiring),
                Err(error) => {
                    let element = self.dom().describe(element);
                    warn!(element = %element, rule = %text, error = %error, "rule not wired");
                    report.failures.push(MountFailure {
                        element,
                        rule: text,
                        error,
                    });
                }
            }
        }
        debug!(
            wired = report.wirings.len(),
            failed = report.failures.len(),
            "mount complete"
        );
        report
    }

    fn pending(&self, kind: RuleKind, attribute: &str) -> Vec<PendingRule> {
        self.dom()
            .elements_with(attribute)
            .into_iter()
            .map(|(element, text)| PendingRule {
                element,
                rule: Rule::parse(kind, &text),
                text,
            })
            .collect()
    }
}

/// A rule attribute found by `mount`, parsed but not yet wired.
struct PendingRule {
    element: ElementId,
    text: String,
    rule: Result<Rule>,
}

impl PendingRule {
    fn compute(&self) -> Option<&ComputeRule> {
        match &self.rule {
            Ok(Rule::Compute(rule)) => Some(rule),
            _ => None,
        }
    }

    /// True when this compute reads the global that `producer` computes.
    fn reads_target_of(&self, producer: &PendingRule) -> bool {
        match (self.compute(), producer.compute()) {
            (Some(rule), Some(producer)) => {
                rule.target_key != producer.target_key
                    && extract_dependencies(&rule.raw_args)
                        .global_keys
                        .contains(&producer.target_key)
            }
            _ => false,
        }
    }
}

/// Order computes so producers come before their readers. Among rules that
/// are ready, document order wins; a cycle is broken at its first rule.
fn dependency_order(mut pending: Vec<PendingRule>) -> Vec<PendingRule> {
    let mut ordered = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let next = pending
            .iter()
            .position(|rule| !pending.iter().any(|other| rule.reads_target_of(other)))
            .unwrap_or(0);
        ordered.push(pending.remove(next));
    }
    ordered
}

/// The failing input is folded into the message so the one log line written
/// by the store (or by `settle`) carries it.
fn evaluation_error(key: &str, err: FunctionError) -> ReactiveError {
    let message = match err.value {
        Some(value) => format!("{} (value: {})", err.message, value),
        None => err.message,
    };
    ReactiveError::Evaluation {
        key: key.to_string(),
        message,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// WIRING HANDLES
// ═══════════════════════════════════════════════════════════════════════════════

/// The subscriptions created by wiring one rule.
#[derive(Debug)]
#[must_use = "dropping a Wiring keeps its subscriptions live; call teardown() to remove them"]
pub struct Wiring {
    target: String,
    subscriptions: Vec<Unsubscribe>,
}

impl Wiring {
    /// Subscribe `callback` under `key` on every source, undoing the ones
    /// already made if any fails.
    fn subscribe_all(
        target: &str,
        key: &str,
        sources: &[SharedReactive],
        callback: &Callback,
    ) -> Result<Self> {
        let mut wiring = Wiring {
            target: target.to_string(),
            subscriptions: Vec::with_capacity(sources.len()),
        };
        for source in sources {
            match source.subscribe(key, callback.clone()) {
                Ok(handle) => wiring.subscriptions.push(handle),
                Err(err) => {
                    let _ = wiring.teardown();
                    return Err(err);
                }
            }
        }
        Ok(wiring)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Number of sources this wiring listens to.
    pub fn edges(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn teardown(self) -> Result<()> {
        let mut first_error = None;
        for handle in self.subscriptions {
            if let Err(err) = handle.unsubscribe() {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[derive(Debug)]
pub struct MountFailure {
    /// Element carrying the rule, as described by the document.
    pub element: String,
    pub rule: String,
    pub error: ReactiveError,
}

#[derive(Debug, Default)]
pub struct MountReport {
    pub wirings: Vec<Wiring>,
    pub failures: Vec<MountFailure>,
}

impl MountReport {
    pub fn wired(&self) -> usize {
        self.wirings.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn teardown(self) -> Result<()> {
        let mut first_error = None;
        for wiring in self.wirings {
            if let Err(err) = wiring.teardown() {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
