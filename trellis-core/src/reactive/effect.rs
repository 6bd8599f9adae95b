//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs immediately under its own listener, so
//!    every signal it reads subscribes it.
//!
//! 2. When any dependency changes, the effect re-runs under the same
//!    listener and the scope it was created in. Signals read for the first
//!    time during a re-run are tracked as well.
//!
//! 3. [`Effect::stop`] releases every subscription. It is safe to call
//!    repeatedly and from inside the effect itself.
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are lazy (compute on access); effects are eager.
//! - Effects are terminal: nothing can depend on an effect.
//!
//! # Bootstrapping
//!
//! [`Effect::with_init`] runs a different function the first time. Use it
//! when the first run has to create something the re-runs assume exists.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use super::runtime::Runtime;
use super::scope::ScopeId;
use super::subscriber::{Listener, ListenerMode, Notify, SubscriptionList};

struct EffectState {
    runtime: Runtime,

    /// The effect function.
    run: Box<dyn Fn()>,

    /// Scope that owned the effect at creation; re-runs happen in it.
    scope: ScopeId,

    /// Subscriptions collected across all runs.
    subscriptions: Rc<RefCell<SubscriptionList>>,

    stopped: Cell<bool>,

    /// Number of times the effect has run.
    run_count: Cell<usize>,

    /// Handle to ourselves, installed as the listener's action.
    this: Weak<EffectState>,
}

impl EffectState {
    fn execute(&self, body: impl FnOnce()) {
        if self.stopped.get() {
            return;
        }
        let Some(this) = self.this.upgrade() else {
            return;
        };

        let listener = Listener::new(this, ListenerMode::Rerun, Rc::clone(&self.subscriptions));
        self.runtime.track(self.scope, listener, body);
        self.run_count.set(self.run_count.get() + 1);

        // Stopped from inside the body: drop anything read after the stop.
        if self.stopped.get() {
            self.release();
        }
    }

    fn release(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.borrow_mut());
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
    }
}

impl Notify for EffectState {
    fn notify(&self) {
        // A re-run queued before the owning scope was disposed is cancelled.
        if !self.stopped.get() && !self.runtime.scope_alive(self.scope) {
            self.stopped.set(true);
            self.release();
            trace!(scope = ?self.scope, "effect scope disposed; re-run cancelled");
            return;
        }
        self.execute(|| (self.run)());
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// Dropping the handle does not stop the effect; it keeps running until
/// [`stop`](Effect::stop) is called or its scope is disposed. Disposal also
/// cancels a re-run already queued by the write in progress.
///
/// # Example
///
/// ```rust,ignore
/// let count = rt.signal(0);
///
/// let reader = count.clone();
/// let effect = rt.effect(move || {
///     println!("Count is: {}", reader.get());
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// effect.stop();
/// count.set(6);  // Prints nothing
/// ```
#[derive(Clone)]
pub struct Effect {
    state: Rc<EffectState>,
}

impl Effect {
    /// Create a new effect and run it immediately to establish its
    /// dependencies.
    pub fn new(runtime: &Runtime, run: impl Fn() + 'static) -> Self {
        let effect = Self::build(runtime, Box::new(run));
        let state = &effect.state;
        state.execute(|| (state.run)());
        effect
    }

    /// Create a new effect whose first run is `init` instead of `run`.
    ///
    /// Signals read by `init` are tracked exactly as if `run` had read them.
    pub fn with_init(runtime: &Runtime, run: impl Fn() + 'static, init: impl FnOnce() + 'static) -> Self {
        let effect = Self::build(runtime, Box::new(run));
        effect.state.execute(init);
        effect
    }

    fn build(runtime: &Runtime, run: Box<dyn Fn()>) -> Self {
        let scope = runtime.current_scope().id();
        let state = Rc::new_cyclic(|this| EffectState {
            runtime: runtime.clone(),
            run,
            scope,
            subscriptions: Rc::default(),
            stopped: Cell::new(false),
            run_count: Cell::new(0),
            this: this.clone(),
        });
        Self { state }
    }

    /// Stop the effect and release all of its subscriptions.
    pub fn stop(&self) {
        if !self.state.stopped.replace(true) {
            trace!(runs = self.state.run_count.get(), "effect stopped");
        }
        self.state.release();
    }

    /// Check if the effect has been stopped, directly or by disposing the
    /// scope it was created in.
    pub fn is_stopped(&self) -> bool {
        self.state.stopped.get() || !self.state.runtime.scope_alive(self.state.scope)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.state.run_count.get()
    }

    /// Number of live subscriptions the effect holds.
    ///
    /// Subscriptions released by disposing the owning scope are not counted.
    pub fn dependency_count(&self) -> usize {
        self.state
            .subscriptions
            .borrow()
            .iter()
            .filter(|subscription| subscription.is_active())
            .count()
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
