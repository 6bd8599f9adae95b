//! Ownership Scopes
//!
//! Scopes form a tree rooted at the runtime's root scope. Each scope owns
//! the subscriptions created while it was the active scope, plus any
//! cleanup callbacks registered in it. Disposing a scope tears down its
//! whole subtree in one step, which is how a rendering layer releases
//! everything a removed subtree was subscribed to.
//!
//! # Layout
//!
//! Scope and subscription records live in two slot maps owned by the
//! runtime. Records refer to each other by generational handle: a scope
//! holds its parent's handle and the handles of its children and
//! subscriptions. Stale handles simply miss, which makes disposal and
//! unsubscription idempotent.

use std::fmt;

use indexmap::IndexSet;
use slotmap::{new_key_type, SlotMap};

use super::runtime::Runtime;
use super::subscription::{SubscriptionId, SubscriptionRecord};
use crate::error::{ReactiveError, Result};

new_key_type! {
    /// Handle of a scope in the runtime arena.
    pub struct ScopeId;
}

pub(crate) type Cleanup = Box<dyn FnOnce()>;

#[derive(Default)]
struct ScopeRecord {
    parent: Option<ScopeId>,
    children: IndexSet<ScopeId>,
    subscriptions: IndexSet<SubscriptionId>,
    cleanups: Vec<Cleanup>,
}

/// Everything detached from the arena by one disposal, to be released once
/// the arena borrow is gone.
#[derive(Default)]
pub(crate) struct Teardown {
    pub(crate) scopes: usize,
    pub(crate) subscriptions: Vec<SubscriptionRecord>,
    pub(crate) cleanups: Vec<Cleanup>,
}

/// The scope tree and every live subscription.
pub(crate) struct ScopeArena {
    scopes: SlotMap<ScopeId, ScopeRecord>,
    subscriptions: SlotMap<SubscriptionId, SubscriptionRecord>,
    root: ScopeId,
}

impl ScopeArena {
    pub(crate) fn new() -> Self {
        let mut scopes = SlotMap::with_key();
        let root = scopes.insert(ScopeRecord::default());
        Self {
            scopes,
            subscriptions: SlotMap::with_key(),
            root,
        }
    }

    pub(crate) fn root(&self) -> ScopeId {
        self.root
    }

    pub(crate) fn contains(&self, scope: ScopeId) -> bool {
        self.scopes.contains_key(scope)
    }

    /// Create a child of `parent`, or of the root if `parent` is gone.
    ///
    /// Returns the new scope and whether it had to fall back to the root.
    pub(crate) fn create_child(&mut self, parent: ScopeId) -> (ScopeId, bool) {
        let (parent, fell_back) = if self.scopes.contains_key(parent) {
            (parent, false)
        } else {
            (self.root, true)
        };
        let child = self.scopes.insert(ScopeRecord {
            parent: Some(parent),
            ..ScopeRecord::default()
        });
        if let Some(record) = self.scopes.get_mut(parent) {
            record.children.insert(child);
        }
        (child, fell_back)
    }

    /// Store a subscription under its scope. Hands the record back if the
    /// scope has been disposed.
    pub(crate) fn insert_subscription(
        &mut self,
        record: SubscriptionRecord,
    ) -> std::result::Result<SubscriptionId, SubscriptionRecord> {
        let scope = record.scope;
        if !self.scopes.contains_key(scope) {
            return Err(record);
        }
        let id = self.subscriptions.insert(record);
        if let Some(owner) = self.scopes.get_mut(scope) {
            owner.subscriptions.insert(id);
        }
        Ok(id)
    }

    pub(crate) fn remove_subscription(&mut self, id: SubscriptionId) -> Option<SubscriptionRecord> {
        let record = self.subscriptions.remove(id)?;
        if let Some(owner) = self.scopes.get_mut(record.scope) {
            owner.subscriptions.shift_remove(&id);
        }
        Some(record)
    }

    pub(crate) fn has_subscription(&self, id: SubscriptionId) -> bool {
        self.subscriptions.contains_key(id)
    }

    /// Attach a cleanup to `scope`. Hands it back if the scope is gone.
    pub(crate) fn add_cleanup(&mut self, scope: ScopeId, cleanup: Cleanup) -> Option<Cleanup> {
        match self.scopes.get_mut(scope) {
            Some(record) => {
                record.cleanups.push(cleanup);
                None
            }
            None => Some(cleanup),
        }
    }

    /// Remove `scope` and all of its descendants from the arena.
    ///
    /// Descendants are detached before their ancestors, and cleanups come
    /// out in reverse registration order within each scope. The root is
    /// emptied but stays in place.
    pub(crate) fn detach_subtree(&mut self, scope: ScopeId) -> Teardown {
        let mut teardown = Teardown::default();
        let Some(parent) = self.scopes.get(scope).map(|record| record.parent) else {
            return teardown;
        };

        let mut order = Vec::new();
        let mut stack = vec![scope];
        while let Some(next) = stack.pop() {
            order.push(next);
            if let Some(record) = self.scopes.get(next) {
                stack.extend(record.children.iter().copied());
            }
        }

        for id in order.into_iter().rev() {
            let record = if id == self.root {
                match self.scopes.get_mut(id) {
                    Some(root) => ScopeRecord {
                        parent: None,
                        children: std::mem::take(&mut root.children),
                        subscriptions: std::mem::take(&mut root.subscriptions),
                        cleanups: std::mem::take(&mut root.cleanups),
                    },
                    None => continue,
                }
            } else {
                match self.scopes.remove(id) {
                    Some(record) => record,
                    None => continue,
                }
            };

            for subscription in record.subscriptions {
                if let Some(detached) = self.subscriptions.remove(subscription) {
                    teardown.subscriptions.push(detached);
                }
            }
            teardown.cleanups.extend(record.cleanups.into_iter().rev());
            teardown.scopes += 1;
        }

        if let Some(parent) = parent.and_then(|parent| self.scopes.get_mut(parent)) {
            parent.children.shift_remove(&scope);
        }
        teardown
    }

    pub(crate) fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    pub(crate) fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub(crate) fn subscriptions_in(&self, scope: ScopeId) -> usize {
        self.scopes
            .get(scope)
            .map_or(0, |record| record.subscriptions.len())
    }

    pub(crate) fn children_of(&self, scope: ScopeId) -> usize {
        self.scopes
            .get(scope)
            .map_or(0, |record| record.children.len())
    }

    pub(crate) fn parent_of(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes.get(scope).and_then(|record| record.parent)
    }
}

/// Handle to an ownership scope.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let count = rt.signal(0);
///
/// let (_, scope) = rt.scoped(|| {
///     let count = count.clone();
///     rt.effect(move || println!("count = {}", count.get()));
/// });
///
/// // Tear the subtree down: the effect stops listening.
/// scope.dispose();
/// ```
#[derive(Clone)]
pub struct Scope {
    id: ScopeId,
    runtime: Runtime,
}

impl Scope {
    pub(crate) fn new(id: ScopeId, runtime: Runtime) -> Self {
        Self { id, runtime }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Whether this is the runtime's root scope.
    pub fn is_root(&self) -> bool {
        self.id == self.runtime.root_scope_id()
    }

    /// Run `f` with this scope active, so every subscription it creates is
    /// owned here.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        if self.is_disposed() {
            return Err(ReactiveError::ScopeDisposed(self.id));
        }
        let _active = self.runtime.enter_scope(self.id);
        Ok(f())
    }

    /// Create a child of this scope.
    pub fn child(&self) -> Result<Scope> {
        if self.is_disposed() {
            return Err(ReactiveError::ScopeDisposed(self.id));
        }
        Ok(self.runtime.create_scope_under(self.id))
    }

    /// Register a callback to run when this scope is disposed.
    ///
    /// If the scope is already gone the callback runs immediately.
    pub fn on_cleanup(&self, cleanup: impl FnOnce() + 'static) {
        self.runtime.add_cleanup(self.id, Box::new(cleanup));
    }

    /// Release every subscription in this scope and its descendants, run
    /// their cleanups, and unlink the scope from its parent.
    ///
    /// Calling this more than once does nothing.
    pub fn dispose(&self) {
        self.runtime.dispose_scope(self.id);
    }

    pub fn is_disposed(&self) -> bool {
        !self.runtime.scope_alive(self.id)
    }

    /// Number of subscriptions owned directly by this scope.
    pub fn subscription_count(&self) -> usize {
        self.runtime.with_arena(|arena| arena.subscriptions_in(self.id))
    }

    /// Number of live child scopes.
    pub fn child_count(&self) -> usize {
        self.runtime.with_arena(|arena| arena.children_of(self.id))
    }

    /// The parent scope, if this scope is alive and not the root.
    pub fn parent(&self) -> Option<Scope> {
        self.runtime
            .with_arena(|arena| arena.parent_of(self.id))
            .map(|parent| Scope::new(parent, self.runtime.clone()))
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.runtime.ptr_eq(&other.runtime)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .field("subscription_count", &self.subscription_count())
            .field("child_count", &self.child_count())
            .finish()
    }
}
