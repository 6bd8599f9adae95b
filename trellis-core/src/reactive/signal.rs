//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and an
//! observable of the computations that read it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read while a listener is running (an effect or a
//!    derived value), the listener is subscribed to the signal.
//!
//! 2. When a write changes the value, the signal emits a watched pass to its
//!    subscribers. Writes that leave the value equal notify nobody.
//!
//! 3. [`mutate`](Signal::mutate) edits the value in place. Since an in-place
//!    edit cannot be compared, it always notifies.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::observable::Observable;
use super::runtime::Runtime;

/// A reactive cell holding a value of type `T`.
///
/// Cloning a signal yields another handle to the same cell.
///
/// # Example
///
/// ```rust,ignore
/// let count = rt.signal(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// count.update(|c| c + 1);
/// ```
pub struct Signal<T: 'static> {
    /// The current value.
    value: Rc<RefCell<T>>,

    /// Computations that read this signal.
    observable: Observable<T>,
}

impl<T: 'static> Signal<T> {
    /// Create a new signal with the given initial value.
    pub fn new(runtime: &Runtime, value: T) -> Self {
        Self {
            value: Rc::new(RefCell::new(value)),
            observable: Observable::new(runtime),
        }
    }

    /// Borrow the current value.
    ///
    /// If called within a tracked computation, this also subscribes it.
    ///
    /// # Panics
    ///
    /// Panics if `f` writes to this same signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.observable.track();
        f(&*self.value.borrow())
    }

    /// Edit the value in place and notify every subscriber.
    ///
    /// Returns the value after the edit.
    pub fn mutate(&self, f: impl FnOnce(&mut T)) -> T
    where
        T: Clone,
    {
        f(&mut *self.value.borrow_mut());
        let current = self.value.borrow().clone();
        self.observable.emit_watched(&current);
        current
    }

    /// The observable behind this signal, for subscribing callbacks directly.
    pub fn observable(&self) -> &Observable<T> {
        &self.observable
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.observable.subscriber_count()
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Get the current value.
    ///
    /// If called within a tracked computation, this also subscribes it.
    pub fn get(&self) -> T {
        self.observable.track();
        self.value.borrow().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.value.borrow().clone()
    }
}

impl<T: Clone + PartialEq + 'static> Signal<T> {
    /// Store `value` if it differs from the current one and notify
    /// subscribers.
    ///
    /// Returns the resulting value either way.
    pub fn set(&self, value: T) -> T {
        let changed = {
            let mut current = self.value.borrow_mut();
            if *current != value {
                *current = value;
                true
            } else {
                false
            }
        };
        let current = self.value.borrow().clone();
        if changed {
            self.observable.emit_watched(&current);
        }
        current
    }

    /// Update the value using a function of the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> T {
        let next = {
            let current = self.value.borrow();
            f(&*current)
        };
        self.set(next)
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            value: Rc::clone(&self.value),
            observable: self.observable.clone(),
        }
    }
}

impl<T: Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("value", &*self.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Observer;
    use std::cell::Cell;

    fn watch<T: 'static>(signal: &Signal<T>) -> Rc<Cell<i32>> {
        let call_count = Rc::new(Cell::new(0));
        let call_count_clone = call_count.clone();
        signal
            .observable()
            .subscribe(Observer::notify(move || {
                call_count_clone.set(call_count_clone.get() + 1);
            }));
        call_count
    }

    #[test]
    fn signal_get_and_set() {
        let rt = Runtime::new();
        let signal = rt.signal(0);
        assert_eq!(signal.get(), 0);

        assert_eq!(signal.set(42), 42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn reading_outside_a_listener_subscribes_nothing() {
        let rt = Runtime::new();
        let signal = rt.signal("v0");

        assert_eq!(signal.get(), "v0");
        assert_eq!(signal.with(|v| v.len()), 2);
        assert_eq!(signal.subscriber_count(), 0);
        assert_eq!(rt.stats().subscriptions, 0);
    }

    #[test]
    fn signal_update() {
        let rt = Runtime::new();
        let signal = rt.signal(10);
        assert_eq!(signal.update(|v| v + 5), 15);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn unchanged_set_notifies_nobody() {
        let rt = Runtime::new();
        let signal = rt.signal(1);
        let call_count = watch(&signal);

        assert_eq!(signal.set(1), 1);
        assert_eq!(call_count.get(), 0);

        signal.set(2);
        assert_eq!(call_count.get(), 1);

        signal.set(3);
        assert_eq!(call_count.get(), 2);
    }

    #[test]
    fn mutate_always_notifies() {
        let rt = Runtime::new();
        let signal = rt.signal(vec![1, 2]);
        let call_count = watch(&signal);

        let after = signal.mutate(|items| items.push(3));
        assert_eq!(after, vec![1, 2, 3]);
        assert_eq!(call_count.get(), 1);

        // Even an edit that changes nothing is announced
        signal.mutate(|_| {});
        assert_eq!(call_count.get(), 2);
    }

    #[test]
    fn subscribers_receive_the_new_value() {
        let rt = Runtime::new();
        let signal = rt.signal(String::from("a"));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();

        signal.observable().subscribe(Observer::callback(move |value: &String| {
            seen_clone.borrow_mut().push(value.clone());
        }));

        signal.set("b".to_string());
        signal.update(|v| format!("{v}c"));
        assert_eq!(*seen.borrow(), vec!["b", "bc"]);
    }

    #[test]
    fn signal_clone_shares_state() {
        let rt = Runtime::new();
        let signal1 = rt.signal(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);

        signal2.set(100);
        assert_eq!(signal1.get(), 100);
    }

    #[test]
    fn observer_may_write_back_to_the_signal() {
        let rt = Runtime::new();
        let signal = rt.signal(0);
        let writer = signal.clone();

        // Clamp anything above 10 back down to 10
        signal.observable().subscribe(Observer::callback(move |value: &i32| {
            if *value > 10 {
                writer.set(10);
            }
        }));

        signal.set(25);
        assert_eq!(signal.get_untracked(), 10);
    }
}
