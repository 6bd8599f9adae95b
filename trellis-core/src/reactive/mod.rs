//! Reactive Primitives
//!
//! This module implements the core reactive system: observables, signals,
//! memos, conditional values and effects, plus the scopes that own their
//! subscriptions.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the signal
//! automatically registers that context as a dependent. When the signal's
//! value changes, all dependents are notified.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only
//! when one of its dependencies changes. [`Iif`] is its conditional sibling:
//! it follows only the branch that is currently selected.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects are used to synchronize reactive state with
//! external systems, such as updating a view or logging.
//!
//! ## Scopes
//!
//! Every subscription belongs to the scope that was active when it was
//! made. Scopes form a tree; disposing one releases everything recorded in
//! its subtree.
//!
//! # Implementation Notes
//!
//! Dependencies are detected automatically. Each [`Runtime`] keeps three
//! context registers (the active scope, the running listener and the
//! watcher of the current emission) that are saved and restored around
//! every tracked run. When a signal is read, the runtime checks whether a
//! listener is running and, if so, subscribes it.

mod context;
mod effect;
mod iif;
mod memo;
mod observable;
mod proxy;
mod runtime;
mod scope;
mod signal;
mod subscriber;
mod subscription;

pub use effect::Effect;
pub use iif::{Branch, Iif};
pub use memo::Memo;
pub use observable::Observable;
pub use runtime::{Runtime, RuntimeStats};
pub use scope::{Scope, ScopeId};
pub use signal::Signal;
pub use subscriber::{Notify, Observer, ObserverKey};
pub use subscription::{Subscription, SubscriptionId};
