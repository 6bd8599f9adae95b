//! Reactive Runtime
//!
//! The runtime is the explicit handle every reactive primitive carries. It
//! owns the ambient context registers (active scope, listener and watcher)
//! and the arena of scopes and subscriptions. Nothing lives in a global:
//! two runtimes never see each other's listeners or scopes.
//!
//! # How It Works
//!
//! 1. A signal read asks the runtime for the active listener and, if there
//!    is one, subscribes it. The subscription is recorded under the active
//!    scope.
//!
//! 2. A signal write emits through its observable. Derived values reached
//!    by the emission are invalidated on the spot; effects reached inside a
//!    watched emission are queued and run once the emission has finished
//!    invalidating, each at most once.
//!
//! 3. Derived values are lazy: they recompute on the next read.
//!
//! 4. Disposing a scope releases every subscription recorded under it and
//!    its descendants.
//!
//! # Threading
//!
//! The runtime is single-threaded (`Rc`/`RefCell` throughout) and handles
//! are neither `Send` nor `Sync`. Propagation is fully synchronous: a write
//! returns only after every affected observer has run.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::Serialize;
use tracing::{debug, error, trace, warn};

use super::context::{ContextGuard, EmissionGuard, ReactiveContext};
use super::effect::Effect;
use super::iif::{Branch, Iif};
use super::memo::Memo;
use super::observable::Observable;
use super::proxy::ReaderLease;
use super::scope::{Cleanup, Scope, ScopeArena, ScopeId};
use super::signal::Signal;
use super::subscriber::{Listener, ObserverKey};
use super::subscription::{ObserverSet, SubscriptionId, SubscriptionRecord};
use crate::config::RuntimeConfig;
use crate::error::Result;

/// Sizes of the runtime arenas, for diagnostics and leak checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    /// Live scopes, including the root.
    pub scopes: usize,
    /// Live subscriptions across all scopes.
    pub subscriptions: usize,
}

struct RuntimeInner {
    config: RuntimeConfig,
    context: ReactiveContext,
    arena: RefCell<ScopeArena>,
}

/// Handle to a reactive runtime.
///
/// Cloning the handle is cheap and shares the runtime.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let count = rt.signal(0);
///
/// let reader = count.clone();
/// let effect = rt.effect(move || println!("count = {}", reader.get()));
///
/// count.set(1);              // prints "count = 1"
/// count.update(|c| c + 1);   // prints "count = 2"
/// effect.stop();
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::build(RuntimeConfig::default())
    }

    /// Create a runtime with a validated configuration.
    pub fn with_config(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: RuntimeConfig) -> Self {
        let arena = ScopeArena::new();
        let context = ReactiveContext::new(arena.root());
        debug!(max_emit_depth = config.max_emit_depth, "reactive runtime created");
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                context,
                arena: RefCell::new(arena),
            }),
        }
    }

    /// The configuration this runtime was built with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Current arena sizes.
    pub fn stats(&self) -> RuntimeStats {
        self.with_arena(|arena| RuntimeStats {
            scopes: arena.scope_count(),
            subscriptions: arena.subscription_count(),
        })
    }

    /// Whether two handles refer to the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Primitives
    // ------------------------------------------------------------------

    /// Create a bare observable.
    pub fn observable<T: 'static>(&self) -> Observable<T> {
        Observable::new(self)
    }

    /// Create a signal holding `value`.
    pub fn signal<T: Clone + 'static>(&self, value: T) -> Signal<T> {
        Signal::new(self, value)
    }

    /// Run `run` now and again whenever a signal it reads changes.
    pub fn effect(&self, run: impl Fn() + 'static) -> Effect {
        Effect::new(self, run)
    }

    /// Run `init` now, tracking what it reads, and `run` on every change.
    pub fn effect_with_init(&self, run: impl Fn() + 'static, init: impl FnOnce() + 'static) -> Effect {
        Effect::with_init(self, run, init)
    }

    /// Create a cached derived value.
    pub fn memo<T: Clone + 'static>(&self, compute: impl Fn() -> T + 'static) -> Memo<T> {
        Memo::new(self, compute)
    }

    /// Create a derived value that follows only the selected branch.
    pub fn iif<T: Clone + 'static>(
        &self,
        condition: impl Fn() -> bool + 'static,
        truthy: Branch<T>,
        falsy: Branch<T>,
    ) -> Iif<T> {
        Iif::new(self, condition, truthy, falsy)
    }

    /// Run `f` without subscribing the active listener to anything it reads.
    pub fn peek<R>(&self, f: impl FnOnce() -> R) -> R {
        let _untracked = self.inner.context.listener.enter(None);
        f()
    }

    /// Whether a tracked computation is running.
    pub fn is_tracking(&self) -> bool {
        self.inner.context.is_tracking()
    }

    /// Nesting depth of the emission in progress, 0 when idle.
    pub fn emit_depth(&self) -> usize {
        self.inner.context.emit_depth()
    }

    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    /// The scope at the top of the tree. It outlives every dispose.
    pub fn root_scope(&self) -> Scope {
        Scope::new(self.root_scope_id(), self.clone())
    }

    /// The scope that owns subscriptions created right now.
    pub fn current_scope(&self) -> Scope {
        Scope::new(self.inner.context.scope.current(), self.clone())
    }

    /// Create a child of the current scope.
    pub fn create_scope(&self) -> Scope {
        self.create_scope_under(self.inner.context.scope.current())
    }

    /// Run `f` in a fresh child of the current scope and hand back the scope
    /// so its owner can dispose it later.
    pub fn scoped<R>(&self, f: impl FnOnce() -> R) -> (R, Scope) {
        let scope = self.create_scope();
        let value = {
            let _active = self.enter_scope(scope.id());
            f()
        };
        (value, scope)
    }

    /// Register a cleanup with the current scope.
    pub fn on_cleanup(&self, cleanup: impl FnOnce() + 'static) {
        self.add_cleanup(self.inner.context.scope.current(), Box::new(cleanup));
    }

    pub(crate) fn root_scope_id(&self) -> ScopeId {
        self.with_arena(|arena| arena.root())
    }

    pub(crate) fn create_scope_under(&self, parent: ScopeId) -> Scope {
        let (id, fell_back) = self.inner.arena.borrow_mut().create_child(parent);
        if fell_back {
            warn!(parent = ?parent, scope = ?id, "parent scope already disposed; new scope attached to the root");
        }
        Scope::new(id, self.clone())
    }

    pub(crate) fn scope_alive(&self, scope: ScopeId) -> bool {
        self.with_arena(|arena| arena.contains(scope))
    }

    pub(crate) fn enter_scope(&self, scope: ScopeId) -> ContextGuard<'_, ScopeId> {
        self.inner.context.scope.enter(scope)
    }

    pub(crate) fn add_cleanup(&self, scope: ScopeId, cleanup: Cleanup) {
        let rejected = self.inner.arena.borrow_mut().add_cleanup(scope, cleanup);
        if let Some(cleanup) = rejected {
            trace!(scope = ?scope, "scope already disposed; running cleanup immediately");
            cleanup();
        }
    }

    pub(crate) fn dispose_scope(&self, scope: ScopeId) {
        let teardown = self.inner.arena.borrow_mut().detach_subtree(scope);
        if teardown.scopes == 0 {
            return;
        }
        let released = teardown.subscriptions.len();
        for record in teardown.subscriptions {
            record.release();
        }
        for cleanup in teardown.cleanups {
            cleanup();
        }
        debug!(scope = ?scope, scopes = teardown.scopes, released, "scope disposed");
    }

    pub(crate) fn with_arena<R>(&self, f: impl FnOnce(&ScopeArena) -> R) -> R {
        f(&self.inner.arena.borrow())
    }

    // ------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------

    pub(crate) fn current_listener(&self) -> Option<Rc<Listener>> {
        self.inner.context.listener.current()
    }

    pub(crate) fn context(&self) -> &ReactiveContext {
        &self.inner.context
    }

    /// Run `f` with `scope` active and `listener` collecting subscriptions.
    pub(crate) fn track<R>(&self, scope: ScopeId, listener: Listener, f: impl FnOnce() -> R) -> R {
        let _scope = self.inner.context.scope.enter(scope);
        let _listener = self.inner.context.listener.enter(Some(Rc::new(listener)));
        f()
    }

    /// Open one level of emission.
    ///
    /// # Panics
    ///
    /// Panics with [`ReactiveError::EmitDepthExceeded`](crate::ReactiveError)
    /// when emissions nest deeper than the configured limit, which means a
    /// write keeps re-triggering itself.
    pub(crate) fn enter_emission(&self) -> EmissionGuard<'_> {
        match self.inner.context.enter_emission(self.inner.config.max_emit_depth) {
            Ok(guard) => guard,
            Err(err) => {
                error!(%err, "aborting runaway propagation");
                panic!("{err}");
            }
        }
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Record a subscription under the current scope.
    ///
    /// Returns `None` when the current scope has been disposed.
    pub(crate) fn register_subscription(
        &self,
        key: ObserverKey,
        source: Weak<dyn ObserverSet>,
        lease: Option<ReaderLease>,
    ) -> Option<SubscriptionId> {
        let scope = self.inner.context.scope.current();
        let record = SubscriptionRecord::new(scope, source, key, lease);
        let inserted = self.inner.arena.borrow_mut().insert_subscription(record);
        match inserted {
            Ok(id) => {
                trace!(subscription = ?id, scope = ?scope, "subscribed");
                Some(id)
            }
            Err(refused) => {
                warn!(scope = ?scope, "subscription refused: owning scope has been disposed");
                drop(refused);
                None
            }
        }
    }

    pub(crate) fn release_subscription(&self, id: SubscriptionId) {
        let record = self.inner.arena.borrow_mut().remove_subscription(id);
        if let Some(record) = record {
            trace!(subscription = ?id, "unsubscribed");
            record.release();
        }
    }

    pub(crate) fn subscription_alive(&self, id: SubscriptionId) -> bool {
        self.with_arena(|arena| arena.has_subscription(id))
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactiveError;
    use std::cell::Cell;

    #[test]
    fn fresh_runtime_has_only_the_root() {
        let rt = Runtime::new();
        assert_eq!(
            rt.stats(),
            RuntimeStats {
                scopes: 1,
                subscriptions: 0
            }
        );
        assert!(rt.current_scope().is_root());
        assert!(!rt.is_tracking());
    }

    #[test]
    fn with_config_validates() {
        let err = Runtime::with_config(RuntimeConfig { max_emit_depth: 0 }).unwrap_err();
        assert!(matches!(err, ReactiveError::InvalidConfig(_)));

        let rt = Runtime::with_config(RuntimeConfig { max_emit_depth: 4 }).unwrap();
        assert_eq!(rt.config().max_emit_depth, 4);
    }

    #[test]
    fn scoped_restores_the_previous_scope() {
        let rt = Runtime::new();
        let root = rt.current_scope();

        let (inner, scope) = rt.scoped(|| rt.current_scope());
        assert_eq!(inner, scope);
        assert_eq!(scope.parent(), Some(root.clone()));
        assert_eq!(rt.current_scope(), root);
    }

    #[test]
    fn peek_hides_the_listener() {
        let rt = Runtime::new();
        let listener = Listener::new(
            Rc::new(|| {}),
            crate::reactive::subscriber::ListenerMode::Rerun,
            Rc::default(),
        );

        rt.track(rt.root_scope_id(), listener, || {
            assert!(rt.is_tracking());
            rt.peek(|| assert!(!rt.is_tracking()));
            assert!(rt.is_tracking());
        });
        assert!(!rt.is_tracking());
    }

    #[test]
    fn cleanup_on_disposed_scope_runs_immediately() {
        let rt = Runtime::new();
        let scope = rt.create_scope();
        scope.dispose();

        let ran = Rc::new(Cell::new(false));
        let ran_clone = ran.clone();
        scope.on_cleanup(move || ran_clone.set(true));
        assert!(ran.get());
    }

    #[test]
    fn runtimes_are_independent() {
        let a = Runtime::new();
        let b = Runtime::new();
        assert!(!a.ptr_eq(&b));
        assert!(a.ptr_eq(&a.clone()));

        let _ = a.create_scope();
        assert_eq!(a.stats().scopes, 2);
        assert_eq!(b.stats().scopes, 1);
    }
}
