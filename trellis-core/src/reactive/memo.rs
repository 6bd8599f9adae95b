//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation under its own route,
//!    which subscribes to every signal the computation reads, and caches
//!    the result.
//!
//! 2. When accessed again, if no dependency has changed, it returns the
//!    cached value.
//!
//! 3. When a dependency changes, the route releases its subscriptions,
//!    marks the memo stale and notifies the memo's own readers.
//!
//! 4. The next access recomputes, tracking afresh.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 memos depend on it
//! - Only the memos actually accessed will recompute
//! - Memos that are never read stay stale (no wasted work)
//!
//! The computation runs at most once per invalidation no matter how many
//! readers there are.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::proxy::{DerivationProxy, Route};
use super::runtime::Runtime;

/// A cached derived value that recomputes only when dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let count = rt.signal(2);
///
/// let reader = count.clone();
/// let doubled = rt.memo(move || reader.get() * 2);
/// assert_eq!(doubled.get(), 4);
///
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Memo<T: 'static> {
    proxy: DerivationProxy,
    route: Route<T>,

    /// Set by the route when an input changes.
    stale: Rc<Cell<bool>>,

    /// The cached value, `None` until the first read.
    value: Rc<RefCell<Option<T>>>,
}

impl<T: Clone + 'static> Memo<T> {
    /// Create a new memo. Nothing is computed until the first read.
    pub fn new(runtime: &Runtime, compute: impl Fn() -> T + 'static) -> Self {
        let proxy = DerivationProxy::new(runtime);
        let stale = Rc::new(Cell::new(true));

        let stale_clone = Rc::clone(&stale);
        let route = proxy.route::<T>(
            Rc::new(compute),
            Some(Box::new(move || {
                stale_clone.set(true);
                true
            })),
        );

        Self {
            proxy,
            route,
            stale,
            value: Rc::new(RefCell::new(None)),
        }
    }

    /// Get the memo's value, recomputing if necessary.
    ///
    /// If called within a tracked computation, this also subscribes it.
    pub fn get(&self) -> T {
        self.proxy.subscribe_listener();

        let fresh = !self.stale.get() && self.route.is_tracked();
        if fresh {
            if let Some(value) = self.value.borrow().as_ref() {
                return value.clone();
            }
        }

        self.stale.set(false);
        let value = self.route.call();
        *self.value.borrow_mut() = Some(value.clone());
        value
    }
}

impl<T: 'static> Memo<T> {
    /// Whether the next read will recompute.
    pub fn is_stale(&self) -> bool {
        self.stale.get() || !self.route.is_tracked()
    }

    /// Whether a value has been computed yet.
    pub fn has_value(&self) -> bool {
        self.value.borrow().is_some()
    }

    /// Number of computations currently subscribed to this memo.
    pub fn reader_count(&self) -> usize {
        self.proxy.reader_count()
    }
}

impl<T: 'static> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            proxy: self.proxy.clone(),
            route: self.route.clone(),
            stale: Rc::clone(&self.stale),
            value: Rc::clone(&self.value),
        }
    }
}

impl<T: Debug + 'static> Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("value", &*self.value.borrow())
            .field("stale", &self.is_stale())
            .field("readers", &self.reader_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
