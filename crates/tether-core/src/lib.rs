#![forbid(unsafe_code)]

//! Handler binding and dispatch for UI-bearing objects.
//!
//! This crate provides the primitives a UI object needs to compose and fire
//! event handlers deterministically:
//!
//! - [`Callable`]: a deferred invocation unit bundling a function, binding
//!   context, fixed leading arguments, a one-shot flag, and a removal hook.
//! - [`HandlerRegistry`]: an ordered, mutation-safe list of callables for one
//!   event kind, with paired removal hooks and a shared post-dispatch hook.
//! - [`Dispatchable`]: an object exposing named event kinds, each backed by
//!   exactly one registry and at most one active native subscription.
//! - [`EventSource`] / [`LocalNode`]: the platform bridge a dispatchable
//!   subscribes against, matched by callback identity.
//!
//! # Architecture
//!
//! Everything is single-threaded: shared ownership is `Rc<RefCell<..>>`, and
//! dispatch runs synchronously on the thread that raises the event. The only
//! concurrency concern is re-entrancy — a handler may add or remove handlers
//! on its own registry mid-dispatch — and the dispatch loop is written so no
//! interior borrow is ever held across user code.
//!
//! # Invariants
//!
//! 1. Handlers run in registration order; there is no priority scheduling.
//! 2. A one-shot handler is invoked at most once and evicted immediately
//!    after its first invocation.
//! 3. Removal hooks fire exactly once, strictly after the entry is detached.
//! 4. Each registry exposes one stable dispatch reference per lifecycle, so a
//!    native listener can always be unsubscribed with the token that
//!    subscribed it.
//! 5. No operation panics or raises on malformed input; a spec without a
//!    function degrades to a traced no-op.

pub mod callable;
pub mod dispatch;
pub mod registry;
pub mod source;
pub mod value;

pub use callable::{Callable, HandlerFn, Invocation};
pub use dispatch::{ActivateError, Dispatchable, Position};
pub use registry::{DispatchFn, HandlerRegistry, same_dispatch_fn};
pub use source::{EventSource, LocalNode};
pub use value::{Context, Value, unordered_args_equal};
