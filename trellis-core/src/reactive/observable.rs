//! Observable
//!
//! The base publish/subscribe primitive. Signals and derived values are
//! built on it; a rendering layer can also subscribe to one directly.
//!
//! # Emission modes
//!
//! - [`emit`](Observable::emit) is a plain broadcast. Outside of any pass it
//!   calls every observer right away. Inside a watched pass (for example a
//!   derived value re-announcing itself while a signal write propagates) it
//!   joins that pass, so observers already reached are skipped.
//!
//! - [`emit_watched`](Observable::emit_watched) opens a new pass with its
//!   own watcher. Every observer reached during the pass, directly or
//!   through nested broadcasts, runs at most once, and effects run only
//!   after all invalidation has spread. Signal writes always use this mode.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::context::Watcher;
use super::proxy::ReaderLease;
use super::runtime::Runtime;
use super::subscriber::{Observer, ObserverKey};
use super::subscription::{ObserverSet, Subscription};

struct ObservableInner<T> {
    observers: RefCell<IndexMap<ObserverKey, Observer<T>>>,
}

impl<T: 'static> ObserverSet for ObservableInner<T> {
    fn detach(&self, key: ObserverKey) {
        // Dropped after the borrow ends: the observer may own other handles.
        let _removed = self.observers.borrow_mut().shift_remove(&key);
    }
}

/// An insertion-ordered set of observers.
pub struct Observable<T: 'static> {
    inner: Rc<ObservableInner<T>>,
    runtime: Runtime,
}

impl<T: 'static> Observable<T> {
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            inner: Rc::new(ObservableInner {
                observers: RefCell::new(IndexMap::new()),
            }),
            runtime: runtime.clone(),
        }
    }

    /// Register `observer` under the current scope.
    ///
    /// Returns `None` if the same observer is already subscribed, or if the
    /// current scope has been disposed.
    pub fn subscribe(&self, observer: Observer<T>) -> Option<Subscription> {
        self.attach(observer, None)
    }

    pub(crate) fn attach(&self, observer: Observer<T>, lease: Option<ReaderLease>) -> Option<Subscription> {
        let key = observer.key();
        if self.inner.observers.borrow().contains_key(&key) {
            return None;
        }
        let weak = Rc::downgrade(&self.inner);
        let source: Weak<dyn ObserverSet> = weak;
        let id = self.runtime.register_subscription(key, source, lease)?;
        self.inner.observers.borrow_mut().insert(key, observer);
        Some(Subscription::new(id, self.runtime.clone()))
    }

    /// Subscribe the running computation, if any.
    pub fn track(&self) {
        if let Some(listener) = self.runtime.current_listener() {
            if let Some(subscription) = self.subscribe(listener.observer()) {
                listener.record(subscription);
            }
        }
    }

    /// Broadcast `value`, joining the surrounding watched pass if there is
    /// one.
    ///
    /// Inside a watched pass every observer runs at most once, so joining
    /// the pass does not count toward the emission depth limit.
    ///
    /// # Panics
    ///
    /// Panics if emissions outside any watched pass nest deeper than the
    /// runtime's configured limit.
    pub fn emit(&self, value: &T) {
        let _depth = if self.runtime.context().in_watched_pass() {
            None
        } else {
            Some(self.runtime.enter_emission())
        };
        self.propagate(value);
    }

    /// Broadcast `value` in a fresh watched pass.
    ///
    /// # Panics
    ///
    /// Panics if emissions nest deeper than the runtime's configured limit.
    pub fn emit_watched(&self, value: &T) {
        let _depth = self.runtime.enter_emission();
        let watcher = Rc::new(Watcher::default());
        let _pass = self.runtime.context().watcher.enter(Some(Rc::clone(&watcher)));
        self.propagate(value);
        watcher.flush();
    }

    fn propagate(&self, value: &T) {
        let snapshot: SmallVec<[(ObserverKey, Observer<T>); 8]> = self
            .inner
            .observers
            .borrow()
            .iter()
            .map(|(key, observer)| (*key, observer.clone()))
            .collect();
        let watcher = self.runtime.context().watcher.current();

        for (key, observer) in snapshot {
            // Unsubscribed earlier in this pass.
            if !self.inner.observers.borrow().contains_key(&key) {
                continue;
            }
            match &watcher {
                Some(watcher) => {
                    if !watcher.claim(key, &observer) {
                        continue;
                    }
                    match observer {
                        Observer::Rerun(action) => watcher.defer(action),
                        other => other.invoke(value),
                    }
                }
                None => observer.invoke(value),
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }

    pub fn is_subscribed(&self, observer: &Observer<T>) -> bool {
        self.inner.observers.borrow().contains_key(&observer.key())
    }
}

impl<T: 'static> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            runtime: self.runtime.clone(),
        }
    }
}

impl<T: 'static> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter<T>() -> (Rc<Cell<i32>>, Observer<T>) {
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let observer = Observer::notify(move || count_clone.set(count_clone.get() + 1));
        (count, observer)
    }

    #[test]
    fn subscribe_twice_registers_once() {
        let rt = Runtime::new();
        let observable = rt.observable::<i32>();
        let (count, observer) = counter::<i32>();

        assert!(observable.subscribe(observer.clone()).is_some());
        assert!(observable.subscribe(observer).is_none());
        assert_eq!(observable.subscriber_count(), 1);
        assert_eq!(rt.stats().subscriptions, 1);

        observable.emit(&1);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn emit_runs_in_insertion_order() {
        let rt = Runtime::new();
        let observable = rt.observable::<&'static str>();
        let log = Rc::new(RefCell::new(Vec::new()));

        for label in ["a", "b", "c"] {
            let log = log.clone();
            observable.subscribe(Observer::callback(move |value: &&str| {
                log.borrow_mut().push(format!("{label}:{value}"));
            }));
        }

        observable.emit(&"x");
        assert_eq!(*log.borrow(), vec!["a:x", "b:x", "c:x"]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let rt = Runtime::new();
        let observable = rt.observable::<i32>();
        let (count, observer) = counter::<i32>();

        let subscription = observable.subscribe(observer).unwrap();
        assert!(subscription.is_active());

        subscription.unsubscribe();
        subscription.unsubscribe();
        assert!(!subscription.is_active());
        assert_eq!(observable.subscriber_count(), 0);
        assert_eq!(rt.root_scope().subscription_count(), 0);

        observable.emit(&1);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn observer_removed_mid_pass_is_skipped() {
        let rt = Runtime::new();
        let observable = rt.observable::<i32>();
        let (count, victim) = counter::<i32>();

        let slot: Rc<RefCell<Option<Subscription>>> = Rc::default();
        let slot_clone = slot.clone();
        observable.subscribe(Observer::notify(move || {
            if let Some(subscription) = slot_clone.borrow().as_ref() {
                subscription.unsubscribe();
            }
        }));
        *slot.borrow_mut() = observable.subscribe(victim);

        observable.emit(&1);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn watched_pass_dedups_across_nested_broadcasts() {
        let rt = Runtime::new();
        let source = rt.observable::<i32>();
        let left = rt.observable::<()>();
        let right = rt.observable::<()>();
        let (count, sink) = counter::<()>();

        // source fans out to left and right, both of which reach the sink
        let left_clone = left.clone();
        source.subscribe(Observer::notify(move || left_clone.emit(&())));
        let right_clone = right.clone();
        source.subscribe(Observer::notify(move || right_clone.emit(&())));
        left.subscribe(sink.clone());
        right.subscribe(sink);

        source.emit(&1);
        assert_eq!(count.get(), 2, "a plain broadcast does not de-duplicate");

        source.emit_watched(&2);
        assert_eq!(count.get(), 3, "a watched pass reaches the sink once");
    }

    #[test]
    fn rerun_observers_wait_for_the_pass_to_finish() {
        let rt = Runtime::new();
        let source = rt.observable::<i32>();
        let log = Rc::new(RefCell::new(Vec::new()));

        let log_effect = log.clone();
        source.subscribe(Observer::Rerun(Rc::new(move || log_effect.borrow_mut().push("effect"))));
        let log_derived = log.clone();
        source.subscribe(Observer::notify(move || log_derived.borrow_mut().push("derived")));

        source.emit_watched(&1);
        assert_eq!(*log.borrow(), vec!["derived", "effect"]);

        log.borrow_mut().clear();
        source.emit(&2);
        assert_eq!(*log.borrow(), vec!["effect", "derived"]);
    }

    #[test]
    fn rebroadcasts_inside_a_watched_pass_do_not_count_toward_depth() {
        let rt = Runtime::with_config(crate::config::RuntimeConfig { max_emit_depth: 3 }).unwrap();
        let head = rt.observable::<i32>();
        let (count, sink) = counter::<()>();

        // head -> link 1 -> ... -> link 10 -> sink, each hop a plain emit
        let mut tail = rt.observable::<()>();
        tail.subscribe(sink);
        for _ in 0..10 {
            let next = rt.observable::<()>();
            let downstream = tail.clone();
            next.subscribe(Observer::notify(move || downstream.emit(&())));
            tail = next;
        }
        head.subscribe(Observer::notify(move || tail.emit(&())));

        head.emit_watched(&1);
        assert_eq!(count.get(), 1);
        assert_eq!(rt.emit_depth(), 0);
    }

    #[test]
    #[should_panic(expected = "emission nested deeper than 3 levels")]
    fn runaway_reentrant_emission_panics() {
        let rt = Runtime::with_config(crate::config::RuntimeConfig { max_emit_depth: 3 }).unwrap();
        let observable = rt.observable::<i32>();
        let echo = observable.clone();
        observable.subscribe(Observer::callback(move |value: &i32| echo.emit_watched(&(value + 1))));
        observable.emit_watched(&0);
    }
}
