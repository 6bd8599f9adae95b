//! Derivation proxy
//!
//! Shared plumbing behind [`Memo`](super::Memo) and [`Iif`](super::Iif).
//! A proxy owns a unit notifier that downstream listeners subscribe to, and
//! any number of routes: tracked evaluations of one upstream computation.
//!
//! A route subscribes to what its computation reads the first time it is
//! called. When any of those inputs changes, the route drops all of its
//! subscriptions, forgets that it was tracked and (unless its change guard
//! says otherwise) re-announces through the notifier. The next call tracks
//! afresh.
//!
//! Readers of the notifier hold a [`ReaderLease`]. When the last lease goes
//! away every route is released, so a derived value nobody reads holds no
//! subscriptions.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use super::observable::Observable;
use super::runtime::Runtime;
use super::scope::ScopeId;
use super::subscriber::{Listener, ListenerMode, Notify, SubscriptionList};

struct ProxyInner {
    runtime: Runtime,
    notifier: Observable<()>,
    readers: Cell<usize>,
    routes: RefCell<Vec<Rc<RouteState>>>,
}

impl ProxyInner {
    fn release_routes(&self) {
        let routes = self.routes.borrow().clone();
        for route in routes {
            route.release();
        }
    }
}

/// Notifier plus routes of one derived value.
#[derive(Clone)]
pub(crate) struct DerivationProxy {
    inner: Rc<ProxyInner>,
}

impl DerivationProxy {
    pub(crate) fn new(runtime: &Runtime) -> Self {
        Self {
            inner: Rc::new(ProxyInner {
                runtime: runtime.clone(),
                notifier: Observable::new(runtime),
                readers: Cell::new(0),
                routes: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Subscribe the running computation to this derived value.
    pub(crate) fn subscribe_listener(&self) {
        let Some(listener) = self.inner.runtime.current_listener() else {
            return;
        };
        let observer = listener.observer::<()>();
        if self.inner.notifier.is_subscribed(&observer) {
            return;
        }
        let lease = ReaderLease::acquire(&self.inner);
        if let Some(subscription) = self.inner.notifier.attach(observer, Some(lease)) {
            listener.record(subscription);
        }
    }

    /// Register a tracked evaluation of `compute`.
    ///
    /// `on_change` runs after the route has been released by an upstream
    /// change; returning `false` keeps the change from reaching readers.
    pub(crate) fn route<T: 'static>(
        &self,
        compute: Rc<dyn Fn() -> T>,
        on_change: Option<Box<dyn Fn() -> bool>>,
    ) -> Route<T> {
        let runtime = &self.inner.runtime;
        let scope = runtime.current_scope().id();
        let state = Rc::new_cyclic(|this| RouteState {
            runtime: runtime.clone(),
            notifier: self.inner.notifier.clone(),
            tracked: Cell::new(false),
            subscriptions: Rc::default(),
            scope,
            on_change,
            this: this.clone(),
        });
        self.inner.routes.borrow_mut().push(Rc::clone(&state));
        Route { state, compute }
    }

    /// Number of live subscriptions to the notifier.
    pub(crate) fn reader_count(&self) -> usize {
        self.inner.readers.get()
    }
}

impl fmt::Debug for DerivationProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivationProxy")
            .field("readers", &self.inner.readers.get())
            .field("routes", &self.inner.routes.borrow().len())
            .finish()
    }
}

/// One reader of a derived value.
///
/// Held by the arena record of a notifier subscription.
pub(crate) struct ReaderLease {
    proxy: Weak<ProxyInner>,
}

impl ReaderLease {
    fn acquire(proxy: &Rc<ProxyInner>) -> Self {
        proxy.readers.set(proxy.readers.get() + 1);
        Self {
            proxy: Rc::downgrade(proxy),
        }
    }
}

impl Drop for ReaderLease {
    fn drop(&mut self) {
        let Some(proxy) = self.proxy.upgrade() else {
            return;
        };
        let readers = proxy.readers.get().saturating_sub(1);
        proxy.readers.set(readers);
        if readers == 0 {
            trace!("last reader gone; releasing derived routes");
            proxy.release_routes();
        }
    }
}

struct RouteState {
    runtime: Runtime,
    notifier: Observable<()>,
    tracked: Cell<bool>,
    subscriptions: Rc<RefCell<SubscriptionList>>,
    /// Scope active when the route was registered.
    scope: ScopeId,
    on_change: Option<Box<dyn Fn() -> bool>>,
    this: Weak<RouteState>,
}

impl RouteState {
    fn release(&self) {
        self.tracked.set(false);
        let subscriptions = std::mem::take(&mut *self.subscriptions.borrow_mut());
        if subscriptions.is_empty() {
            return;
        }
        trace!(count = subscriptions.len(), "route released");
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
    }

    /// Tracked and still subscribed. A disposed scope takes the
    /// subscriptions with it, which counts as released.
    fn is_tracked(&self) -> bool {
        if !self.tracked.get() {
            return false;
        }
        let subscriptions = self.subscriptions.borrow();
        subscriptions.is_empty() || subscriptions.iter().any(|subscription| subscription.is_active())
    }
}

impl Notify for RouteState {
    fn notify(&self) {
        self.release();
        let announce = self.on_change.as_ref().map_or(true, |on_change| on_change());
        if announce {
            self.notifier.emit(&());
        }
    }
}

/// Releases a route whose computation panicked, so the next call runs it
/// again instead of trusting a half-made evaluation.
struct ReleaseOnUnwind<'a>(&'a RouteState);

impl Drop for ReleaseOnUnwind<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.release();
        }
    }
}

/// Callable handle of a route.
pub(crate) struct Route<T> {
    state: Rc<RouteState>,
    compute: Rc<dyn Fn() -> T>,
}

impl<T> Route<T> {
    /// Evaluate the computation, tracking its reads if the route is not
    /// tracked yet.
    pub(crate) fn call(&self) -> T {
        let state = &self.state;
        if state.is_tracked() {
            return state.runtime.peek(|| (self.compute)());
        }

        state.release();
        let Some(this) = state.this.upgrade() else {
            return state.runtime.peek(|| (self.compute)());
        };
        if !state.runtime.scope_alive(state.scope) {
            trace!(scope = ?state.scope, "route scope disposed; evaluating untracked");
            return state.runtime.peek(|| (self.compute)());
        }

        // Tracked while computing, so a write to its own input releases it.
        state.tracked.set(true);
        trace!(scope = ?state.scope, "route tracking");
        let _unwind = ReleaseOnUnwind(state);
        let listener = Listener::new(this, ListenerMode::Invalidate, Rc::clone(&state.subscriptions));
        state.runtime.track(state.scope, listener, || (self.compute)())
    }

    pub(crate) fn is_tracked(&self) -> bool {
        self.state.is_tracked()
    }
}

impl<T> Clone for Route<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            compute: Rc::clone(&self.compute),
        }
    }
}

impl<T> fmt::Debug for Route<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("tracked", &self.is_tracked())
            .field("dependencies", &self.state.subscriptions.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_route(
        proxy: &DerivationProxy,
        signal: &crate::reactive::Signal<i32>,
    ) -> (Route<i32>, Rc<Cell<i32>>) {
        let call_count = Rc::new(Cell::new(0));
        let (reader, call_count_clone) = (signal.clone(), call_count.clone());
        let route = proxy.route::<i32>(
            Rc::new(move || {
                call_count_clone.set(call_count_clone.get() + 1);
                reader.get() * 2
            }),
            None,
        );
        (route, call_count)
    }

    #[test]
    fn first_call_tracks_later_calls_peek() {
        let rt = Runtime::new();
        let proxy = DerivationProxy::new(&rt);
        let signal = rt.signal(2);
        let (route, _) = counting_route(&proxy, &signal);

        assert!(!route.is_tracked());
        assert_eq!(route.call(), 4);
        assert!(route.is_tracked());
        assert_eq!(signal.subscriber_count(), 1);

        assert_eq!(route.call(), 4);
        assert_eq!(signal.subscriber_count(), 1);
    }

    #[test]
    fn upstream_change_releases_and_announces() {
        let rt = Runtime::new();
        let proxy = DerivationProxy::new(&rt);
        let signal = rt.signal(1);
        let (route, _) = counting_route(&proxy, &signal);
        route.call();

        let announced = Rc::new(Cell::new(0));
        let announced_clone = announced.clone();
        proxy
            .inner
            .notifier
            .subscribe(crate::reactive::Observer::notify(move || {
                announced_clone.set(announced_clone.get() + 1)
            }));

        signal.set(5);
        assert!(!route.is_tracked());
        assert_eq!(signal.subscriber_count(), 0);
        assert_eq!(announced.get(), 1);

        // Not tracked any more: further writes reach nobody
        signal.set(6);
        assert_eq!(announced.get(), 1);
        assert_eq!(route.call(), 12);
    }

    #[test]
    fn guard_suppresses_the_announcement() {
        let rt = Runtime::new();
        let proxy = DerivationProxy::new(&rt);
        let signal = rt.signal(1);
        let reader = signal.clone();
        let route = proxy.route::<i32>(Rc::new(move || reader.get()), Some(Box::new(|| false)));
        route.call();

        let announced = Rc::new(Cell::new(false));
        let announced_clone = announced.clone();
        proxy
            .inner
            .notifier
            .subscribe(crate::reactive::Observer::notify(move || announced_clone.set(true)));

        signal.set(2);
        assert!(!announced.get());
        assert!(!route.is_tracked());
    }

    #[test]
    fn last_reader_leaving_releases_routes() {
        let rt = Runtime::new();
        let proxy = DerivationProxy::new(&rt);
        let signal = rt.signal(1);
        let (route, _) = counting_route(&proxy, &signal);

        let proxy_clone = proxy.clone();
        let route_clone = route.clone();
        let effect = rt.effect(move || {
            proxy_clone.subscribe_listener();
            route_clone.call();
        });
        assert_eq!(proxy.reader_count(), 1);
        assert!(route.is_tracked());

        effect.stop();
        assert_eq!(proxy.reader_count(), 0);
        assert!(!route.is_tracked());
        assert_eq!(signal.subscriber_count(), 0);
        assert_eq!(rt.stats().subscriptions, 0);
    }

    #[test]
    fn panicking_computation_leaves_the_route_untracked() {
        let rt = Runtime::new();
        let proxy = DerivationProxy::new(&rt);
        let signal = rt.signal(1);
        let reader = signal.clone();
        let route = proxy.route::<i32>(
            Rc::new(move || {
                let value = reader.get();
                assert!(value != 2, "cannot handle two");
                value
            }),
            None,
        );
        assert_eq!(route.call(), 1);

        signal.set(2);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| route.call()));
        assert!(result.is_err());
        assert!(!route.is_tracked());
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn disposed_registration_scope_evaluates_untracked() {
        let rt = Runtime::new();
        let proxy = DerivationProxy::new(&rt);
        let signal = rt.signal(3);

        let (route, scope) = rt.scoped(|| counting_route(&proxy, &signal).0);
        scope.dispose();

        assert_eq!(route.call(), 6);
        assert!(!route.is_tracked());
        assert_eq!(signal.subscriber_count(), 0);
    }
}
