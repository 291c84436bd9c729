#![forbid(unsafe_code)]

//! The platform bridge: native event sources.
//!
//! A [`Dispatchable`](crate::dispatch::Dispatchable) knows nothing about the
//! platform beyond this trait. Subscriptions are matched by callback
//! identity, mirroring how native listener APIs pair an unsubscribe with the
//! exact token that subscribed.
//!
//! [`LocalNode`] is the in-process implementation: the default presentation
//! node when the whole UI lives in one process, and the natural test double.

use tracing::trace;

use crate::registry::{DispatchFn, same_dispatch_fn};
use crate::value::Value;

/// A named event source a dispatch callback can be subscribed to.
pub trait EventSource {
    /// Subscribe `callback` to events of `kind`.
    ///
    /// A `(kind, callback)` pair already subscribed must not be added twice.
    fn subscribe(&mut self, kind: &str, callback: DispatchFn);

    /// Remove the subscription matching `(kind, callback)` by identity.
    /// Unknown pairs are ignored.
    fn unsubscribe(&mut self, kind: &str, callback: &DispatchFn);
}

/// In-process event source.
///
/// Subscriptions are kept in subscription order; [`emit`](LocalNode::emit)
/// runs every callback registered for the kind, in that order.
#[derive(Default)]
pub struct LocalNode {
    subscriptions: Vec<(String, DispatchFn)>,
}

impl LocalNode {
    /// An empty node.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of live subscriptions across all kinds.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Number of live subscriptions for `kind`.
    #[must_use]
    pub fn subscription_count_for(&self, kind: &str) -> usize {
        self.subscriptions.iter().filter(|(k, _)| k == kind).count()
    }

    /// Raise an event: run every callback subscribed to `kind` with
    /// `payload`, in subscription order.
    pub fn emit(&self, kind: &str, payload: Option<&Value>) {
        // Snapshot first so a callback unsubscribing mid-emit cannot skew
        // the iteration.
        let snapshot: Vec<DispatchFn> = self
            .subscriptions
            .iter()
            .filter(|(k, _)| k == kind)
            .map(|(_, callback)| callback.clone())
            .collect();
        trace!(kind, callbacks = snapshot.len(), "emit");
        for callback in snapshot {
            callback(payload);
        }
    }
}

impl EventSource for LocalNode {
    fn subscribe(&mut self, kind: &str, callback: DispatchFn) {
        let duplicate = self
            .subscriptions
            .iter()
            .any(|(k, existing)| k == kind && same_dispatch_fn(existing, &callback));
        if duplicate {
            return;
        }
        self.subscriptions.push((kind.to_owned(), callback));
    }

    fn unsubscribe(&mut self, kind: &str, callback: &DispatchFn) {
        if let Some(index) = self
            .subscriptions
            .iter()
            .position(|(k, existing)| k == kind && same_dispatch_fn(existing, callback))
        {
            self.subscriptions.remove(index);
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
