//! Reactive Context
//!
//! The reactive context holds the three ambient registers every tracked
//! operation consults:
//!
//! - the active **scope**, which owns any subscription created now,
//! - the active **listener**, the computation that signal reads subscribe,
//! - the active **watcher**, which de-duplicates observers within one
//!   watched emission.
//!
//! # Implementation
//!
//! Each register is a single slot owned by the runtime. Entering a
//! computation swaps the new value in and hands back a guard; dropping the
//! guard swaps the previous value back. Because the guard restores on drop,
//! nested computations compose and a panicking observer cannot leave a
//! stale listener behind.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use super::scope::ScopeId;
use super::subscriber::{Listener, Notify, Observer, ObserverKey};
use crate::error::{ReactiveError, Result};

/// A single-slot register with save-install-restore access.
pub(crate) struct ContextCell<T> {
    slot: RefCell<T>,
}

impl<T: Clone> ContextCell<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            slot: RefCell::new(value),
        }
    }

    /// The value currently installed.
    pub(crate) fn current(&self) -> T {
        self.slot.borrow().clone()
    }

    /// Install `value` until the returned guard is dropped.
    pub(crate) fn enter(&self, value: T) -> ContextGuard<'_, T> {
        let previous = self.slot.replace(value);
        ContextGuard {
            cell: self,
            previous: Some(previous),
        }
    }
}

/// Restores the previous register value when dropped.
pub(crate) struct ContextGuard<'a, T> {
    cell: &'a ContextCell<T>,
    previous: Option<T>,
}

impl<T> Drop for ContextGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            // The displaced value is dropped after the slot borrow ends.
            let _current = self.cell.slot.replace(previous);
        }
    }
}

/// Observers already reached in one watched emission.
///
/// Effects reached during the pass are queued rather than run, and
/// [`flush`](Watcher::flush) runs them once every derived value the write
/// affects has been invalidated.
#[derive(Default)]
pub(crate) struct Watcher {
    /// Keeps each claimed observer alive so its key cannot be reused by a
    /// new allocation during the pass.
    seen: RefCell<HashMap<ObserverKey, Box<dyn Any>>>,
    deferred: RefCell<VecDeque<Rc<dyn Notify>>>,
}

impl Watcher {
    /// Record `observer` for this pass. Returns false if it was already
    /// reached.
    pub(crate) fn claim<T: 'static>(&self, key: ObserverKey, observer: &Observer<T>) -> bool {
        let mut seen = self.seen.borrow_mut();
        if seen.contains_key(&key) {
            return false;
        }
        seen.insert(key, Box::new(observer.clone()));
        true
    }

    pub(crate) fn defer(&self, action: Rc<dyn Notify>) {
        self.deferred.borrow_mut().push_back(action);
    }

    /// Run deferred effects in the order they were first reached, including
    /// any deferred while flushing.
    pub(crate) fn flush(&self) {
        loop {
            let next = self.deferred.borrow_mut().pop_front();
            match next {
                Some(action) => action.notify(),
                None => break,
            }
        }
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.deferred.borrow().len()
    }
}

/// The ambient registers of one runtime.
pub(crate) struct ReactiveContext {
    pub(crate) scope: ContextCell<ScopeId>,
    pub(crate) listener: ContextCell<Option<Rc<Listener>>>,
    pub(crate) watcher: ContextCell<Option<Rc<Watcher>>>,
    emit_depth: Cell<usize>,
}

impl ReactiveContext {
    pub(crate) fn new(root: ScopeId) -> Self {
        Self {
            scope: ContextCell::new(root),
            listener: ContextCell::new(None),
            watcher: ContextCell::new(None),
            emit_depth: Cell::new(0),
        }
    }

    /// Whether a listener is installed.
    pub(crate) fn is_tracking(&self) -> bool {
        self.listener.slot.borrow().is_some()
    }

    /// Whether a watched emission is in progress.
    pub(crate) fn in_watched_pass(&self) -> bool {
        self.watcher.slot.borrow().is_some()
    }

    /// Open one level of emission, failing if that exceeds `limit`.
    pub(crate) fn enter_emission(&self, limit: usize) -> Result<EmissionGuard<'_>> {
        let depth = self.emit_depth.get() + 1;
        if depth > limit {
            return Err(ReactiveError::EmitDepthExceeded { limit });
        }
        self.emit_depth.set(depth);
        Ok(EmissionGuard {
            depth: &self.emit_depth,
        })
    }

    pub(crate) fn emit_depth(&self) -> usize {
        self.emit_depth.get()
    }
}

/// Closes one level of emission when dropped.
pub(crate) struct EmissionGuard<'a> {
    depth: &'a Cell<usize>,
}

impl Drop for EmissionGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}
