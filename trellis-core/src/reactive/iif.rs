//! Conditional derived values.
//!
//! [`Iif`] picks one of two branches based on a condition. The condition is
//! always tracked; a computed branch is tracked only while it is selected.
//! Changes to the branch that was not selected at the last read never reach
//! the readers of the `Iif`.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use super::proxy::{DerivationProxy, Route};
use super::runtime::Runtime;

/// One side of an [`Iif`].
pub enum Branch<T> {
    /// A constant.
    Value(T),
    /// A computation, tracked while this side is selected.
    Computed(Rc<dyn Fn() -> T>),
}

impl<T> Branch<T> {
    pub fn value(value: T) -> Self {
        Branch::Value(value)
    }

    pub fn computed(compute: impl Fn() -> T + 'static) -> Self {
        Branch::Computed(Rc::new(compute))
    }
}

impl<T: fmt::Debug> fmt::Debug for Branch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Branch::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

enum Arm<T> {
    Value(T),
    Routed(Route<T>),
}

impl<T: Clone + 'static> Arm<T> {
    fn new(proxy: &DerivationProxy, branch: Branch<T>, side: bool, selected: &Rc<Cell<Option<bool>>>) -> Self {
        match branch {
            Branch::Value(value) => Arm::Value(value),
            Branch::Computed(compute) => {
                let selected = Rc::clone(selected);
                let guard: Box<dyn Fn() -> bool> = Box::new(move || selected.get() == Some(side));
                Arm::Routed(proxy.route(compute, Some(guard)))
            }
        }
    }

    fn read(&self) -> T {
        match self {
            Arm::Value(value) => value.clone(),
            Arm::Routed(route) => route.call(),
        }
    }
}

impl<T: Clone> Clone for Arm<T> {
    fn clone(&self) -> Self {
        match self {
            Arm::Value(value) => Arm::Value(value.clone()),
            Arm::Routed(route) => Arm::Routed(route.clone()),
        }
    }
}

/// A derived value that follows only the selected branch.
///
/// Unlike [`Memo`](super::Memo), an `Iif` does not cache: every read
/// evaluates the condition and the selected branch, without re-subscribing
/// anything that is still tracked.
///
/// # Example
///
/// ```rust,ignore
/// let logged_in = rt.signal(false);
/// let name = rt.signal(String::from("ada"));
///
/// let (gate, reader) = (logged_in.clone(), name.clone());
/// let greeting = rt.iif(
///     move || gate.get(),
///     Branch::computed(move || format!("hello, {}", reader.get())),
///     Branch::value(String::from("please log in")),
/// );
///
/// assert_eq!(greeting.get(), "please log in");
/// logged_in.set(true);
/// assert_eq!(greeting.get(), "hello, ada");
/// ```
pub struct Iif<T: 'static> {
    proxy: DerivationProxy,
    condition: Route<bool>,
    truthy: Arm<T>,
    falsy: Arm<T>,
    /// Side chosen at the last read.
    selected: Rc<Cell<Option<bool>>>,
}

impl<T: Clone + 'static> Iif<T> {
    pub fn new(
        runtime: &Runtime,
        condition: impl Fn() -> bool + 'static,
        truthy: Branch<T>,
        falsy: Branch<T>,
    ) -> Self {
        let proxy = DerivationProxy::new(runtime);
        let selected = Rc::new(Cell::new(None));
        let condition = proxy.route::<bool>(Rc::new(condition), None);
        let truthy = Arm::new(&proxy, truthy, true, &selected);
        let falsy = Arm::new(&proxy, falsy, false, &selected);
        Self {
            proxy,
            condition,
            truthy,
            falsy,
            selected,
        }
    }

    /// Evaluate the condition and return the selected branch.
    ///
    /// If called within a tracked computation, this also subscribes it.
    pub fn get(&self) -> T {
        self.proxy.subscribe_listener();
        let side = self.condition.call();
        self.selected.set(Some(side));
        if side {
            self.truthy.read()
        } else {
            self.falsy.read()
        }
    }
}

impl<T: 'static> Iif<T> {
    /// Side chosen at the last read, `None` before the first.
    pub fn selected(&self) -> Option<bool> {
        self.selected.get()
    }

    /// Number of computations currently subscribed to this value.
    pub fn reader_count(&self) -> usize {
        self.proxy.reader_count()
    }
}

impl<T: Clone + 'static> Clone for Iif<T> {
    fn clone(&self) -> Self {
        Self {
            proxy: self.proxy.clone(),
            condition: self.condition.clone(),
            truthy: self.truthy.clone(),
            falsy: self.falsy.clone(),
            selected: Rc::clone(&self.selected),
        }
    }
}

impl<T: 'static> fmt::Debug for Iif<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iif")
            .field("selected", &self.selected.get())
            .field("readers", &self.reader_count())
            .finish()
    }
}
