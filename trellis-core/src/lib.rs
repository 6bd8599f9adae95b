//! Trellis Core
//!
//! This crate provides a fine-grained reactive runtime. It implements:
//!
//! - Observables with de-duplicated, insertion-ordered observers
//! - Signals, effects and cached derived values (memos)
//! - Conditional derived values that track only the selected branch
//! - Ownership scopes that release subscriptions in bulk
//!
//! Propagation is synchronous and glitch-free: one write re-runs each
//! affected effect at most once, after every derived value it could read
//! has been invalidated.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Reactive primitives, scopes and dependency tracking
//! - `config`: Runtime configuration
//! - `error`: The crate error type
//!
//! # Example
//!
//! ```rust
//! use trellis_core::Runtime;
//!
//! let rt = Runtime::new();
//!
//! // Create a signal
//! let count = rt.signal(0);
//!
//! // Create a derived value
//! let reader = count.clone();
//! let doubled = rt.memo(move || reader.get() * 2);
//!
//! // Create an effect
//! let (count_reader, doubled_reader) = (count.clone(), doubled.clone());
//! let effect = rt.effect(move || {
//!     println!("Count: {}, Doubled: {}", count_reader.get(), doubled_reader.get());
//! });
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//!
//! effect.stop();
//! ```

pub mod config;
pub mod error;
pub mod reactive;

pub use config::RuntimeConfig;
pub use error::{ReactiveError, Result};
pub use reactive::{
    Branch, Effect, Iif, Memo, Observable, Observer, Runtime, RuntimeStats, Scope, ScopeId, Signal,
    Subscription,
};
