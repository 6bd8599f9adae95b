//! Subscriber types for the reactive system.
//!
//! An [`Observer`] is anything an [`Observable`](super::Observable) can
//! call back: a plain value callback, a derived value that needs to be
//! invalidated, or an effect that needs to re-run. A [`Listener`] is the
//! running computation that signal reads subscribe.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use super::subscription::Subscription;

/// Something that can be told "one of your inputs changed".
///
/// Implemented for every `Fn()` closure, so most callers never implement it
/// by hand.
pub trait Notify {
    fn notify(&self);
}

impl<F> Notify for F
where
    F: Fn(),
{
    fn notify(&self) {
        self()
    }
}

/// Identity of an observer.
///
/// Two observers are the same observer when they share one allocation,
/// which is how a single effect subscribed to many signals is recognised
/// across all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverKey(usize);

impl ObserverKey {
    fn of<T: ?Sized>(rc: &Rc<T>) -> Self {
        Self(Rc::as_ptr(rc).cast::<()>() as usize)
    }
}

/// A callback registered with an observable.
pub enum Observer<T> {
    /// Receives the emitted value. Runs as soon as it is reached.
    Callback(Rc<dyn Fn(&T)>),

    /// Marks a derived value out of date. Runs as soon as it is reached, so
    /// invalidation spreads through the whole graph before anything pulls.
    Invalidate(Rc<dyn Notify>),

    /// Re-runs an effect. Inside a watched pass it is deferred until the
    /// pass has finished invalidating.
    Rerun(Rc<dyn Notify>),
}

impl<T> Observer<T> {
    /// Wrap a value callback.
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&T) + 'static,
    {
        Observer::Callback(Rc::new(f))
    }

    /// Wrap a callback that ignores the emitted value.
    pub fn notify<F>(f: F) -> Self
    where
        F: Fn() + 'static,
    {
        Observer::Invalidate(Rc::new(f))
    }

    /// The identity used for de-duplication.
    pub fn key(&self) -> ObserverKey {
        match self {
            Observer::Callback(f) => ObserverKey::of(f),
            Observer::Invalidate(action) | Observer::Rerun(action) => ObserverKey::of(action),
        }
    }

    pub(crate) fn invoke(&self, value: &T) {
        match self {
            Observer::Callback(f) => f(value),
            Observer::Invalidate(action) | Observer::Rerun(action) => action.notify(),
        }
    }
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        match self {
            Observer::Callback(f) => Observer::Callback(Rc::clone(f)),
            Observer::Invalidate(action) => Observer::Invalidate(Rc::clone(action)),
            Observer::Rerun(action) => Observer::Rerun(Rc::clone(action)),
        }
    }
}

impl<T> fmt::Debug for Observer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Observer::Callback(_) => "Callback",
            Observer::Invalidate(_) => "Invalidate",
            Observer::Rerun(_) => "Rerun",
        };
        f.debug_tuple(kind).field(&self.key()).finish()
    }
}

/// Subscriptions collected by one tracked computation.
pub(crate) type SubscriptionList = SmallVec<[Subscription; 4]>;

/// How a listener wants to be called back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListenerMode {
    /// A derived value: invalidate immediately.
    Invalidate,
    /// An effect: re-run once the pass has settled.
    Rerun,
}

/// The computation currently being tracked.
///
/// Every observable read while a listener is installed subscribes the
/// listener's action and appends the resulting subscription to its list.
pub(crate) struct Listener {
    action: Rc<dyn Notify>,
    mode: ListenerMode,
    subscriptions: Rc<RefCell<SubscriptionList>>,
}

impl Listener {
    pub(crate) fn new(
        action: Rc<dyn Notify>,
        mode: ListenerMode,
        subscriptions: Rc<RefCell<SubscriptionList>>,
    ) -> Self {
        Self {
            action,
            mode,
            subscriptions,
        }
    }

    /// The observer this listener registers with observables.
    pub(crate) fn observer<T>(&self) -> Observer<T> {
        let action = Rc::clone(&self.action);
        match self.mode {
            ListenerMode::Invalidate => Observer::Invalidate(action),
            ListenerMode::Rerun => Observer::Rerun(action),
        }
    }

    pub(crate) fn record(&self, subscription: Subscription) {
        self.subscriptions.borrow_mut().push(subscription);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn observer_keys_follow_allocation() {
        let observer: Observer<i32> = Observer::callback(|_| {});
        let clone = observer.clone();
        let other: Observer<i32> = Observer::callback(|_| {});

        assert_eq!(observer.key(), clone.key());
        assert_ne!(observer.key(), other.key());
    }

    #[test]
    fn listener_observer_shares_action_identity() {
        let action: Rc<dyn Notify> = Rc::new(|| {});
        let listener = Listener::new(
            Rc::clone(&action),
            ListenerMode::Rerun,
            Rc::default(),
        );

        let as_int: Observer<i32> = listener.observer();
        let as_text: Observer<String> = listener.observer();

        assert!(matches!(as_int, Observer::Rerun(_)));
        assert_eq!(as_int.key(), as_text.key());
        assert_eq!(as_int.key(), ObserverKey::of(&action));
    }

    #[test]
    fn invoke_calls_callback_with_value() {
        let seen = Rc::new(Cell::new(0));
        let seen_clone = seen.clone();

        let observer = Observer::callback(move |value: &i32| seen_clone.set(*value));
        observer.invoke(&7);
        assert_eq!(seen.get(), 7);

        let hits = Rc::new(Cell::new(0));
        let hits_clone = hits.clone();
        let notify: Observer<i32> = Observer::notify(move || hits_clone.set(hits_clone.get() + 1));
        notify.invoke(&0);
        notify.invoke(&0);
        assert_eq!(hits.get(), 2);
    }
}
