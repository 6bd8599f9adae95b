//! Subscriptions
//!
//! A subscription ties one observer to one observable and is owned by
//! exactly one scope. The runtime keeps the record; callers hold a cheap
//! [`Subscription`] handle addressing it.

use std::fmt;
use std::rc::Weak;

use slotmap::new_key_type;

use super::proxy::ReaderLease;
use super::runtime::Runtime;
use super::scope::ScopeId;
use super::subscriber::ObserverKey;

new_key_type! {
    /// Handle of a subscription record in the runtime arena.
    pub struct SubscriptionId;
}

/// The observer side of an observable, with its value type erased so the
/// arena can detach observers from any observable.
pub(crate) trait ObserverSet {
    fn detach(&self, key: ObserverKey);
}

/// Arena entry for a live subscription.
pub(crate) struct SubscriptionRecord {
    pub(crate) scope: ScopeId,
    source: Weak<dyn ObserverSet>,
    key: ObserverKey,
    /// Held for subscriptions to a derived value; dropping it gives up
    /// one reader of that value.
    lease: Option<ReaderLease>,
}

impl SubscriptionRecord {
    pub(crate) fn new(
        scope: ScopeId,
        source: Weak<dyn ObserverSet>,
        key: ObserverKey,
        lease: Option<ReaderLease>,
    ) -> Self {
        Self {
            scope,
            source,
            key,
            lease,
        }
    }

    /// Detach the observer from its observable and drop the reader lease.
    ///
    /// Must be called with no arena borrow held: releasing the last lease
    /// of a derived value unsubscribes that value's own dependencies.
    pub(crate) fn release(self) {
        let Self {
            source, key, lease, ..
        } = self;
        if let Some(source) = source.upgrade() {
            source.detach(key);
        }
        drop(lease);
    }
}

/// Handle to a subscription.
///
/// Unsubscribing is idempotent; a handle outliving its record (for example
/// after the owning scope was disposed) simply does nothing.
#[derive(Clone)]
pub struct Subscription {
    id: SubscriptionId,
    runtime: Runtime,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, runtime: Runtime) -> Self {
        Self { id, runtime }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the observer from its observable and the subscription from
    /// its scope.
    pub fn unsubscribe(&self) {
        self.runtime.release_subscription(self.id);
    }

    /// Whether the subscription is still registered.
    pub fn is_active(&self) -> bool {
        self.runtime.subscription_alive(self.id)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
