#![forbid(unsafe_code)]

//! Dispatchable objects: named event kinds bridged to a native source.
//!
//! A [`Dispatchable`] owns one [`HandlerRegistry`] per event kind and at
//! most one active native subscription per kind. However many logical
//! handlers are registered, the platform ever sees a single callback: the
//! registry's stable dispatch entry point.
//!
//! Per (object, kind) the lifecycle is a small state machine:
//!
//! ```text
//! NoRegistry ──add_handler──▶ RegistryExists(inactive)
//!                                │            ▲
//!                      activate_listener  deactivate_listener
//!                                ▼            │
//!                             RegistryExists(active)
//! ```
//!
//! Listener-activation state is scoped to the object instance; there is no
//! process-wide mutable state here.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use tracing::{debug, warn};

use crate::callable::Callable;
use crate::registry::{DispatchFn, HandlerRegistry};
use crate::source::EventSource;
use crate::value::Value;

// ─── Position ────────────────────────────────────────────────────────────────

/// Where a new handler lands in its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    /// Prepend: runs before existing handlers.
    First,
    /// Append: runs after existing handlers.
    #[default]
    Last,
}

// ─── ActivateError ───────────────────────────────────────────────────────────

/// Error from [`Dispatchable::activate_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivateError {
    /// No presentation node is attached to subscribe against.
    NoNode,
    /// No registry exists for the event kind; register a handler first.
    NoRegistry,
}

impl fmt::Display for ActivateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoNode => write!(f, "no presentation node attached"),
            Self::NoRegistry => write!(f, "no handler registry for this event kind"),
        }
    }
}

impl std::error::Error for ActivateError {}

// ─── Dispatchable ────────────────────────────────────────────────────────────

/// Shared handle to a platform presentation node.
pub type NodeHandle = Rc<RefCell<dyn EventSource>>;

/// An object exposing named event kinds, each backed by exactly one
/// [`HandlerRegistry`] and at most one active native subscription.
pub struct Dispatchable {
    node: Option<NodeHandle>,
    registries: AHashMap<String, HandlerRegistry>,
    /// Remembered subscription tokens, one per active kind.
    active: AHashMap<String, DispatchFn>,
}

/// Event kinds are non-empty, non-blank names.
fn valid_kind(kind: &str) -> bool {
    !kind.trim().is_empty()
}

impl Dispatchable {
    /// A dispatchable with no presentation node attached.
    #[must_use]
    pub fn new() -> Self {
        Self {
            node: None,
            registries: AHashMap::new(),
            active: AHashMap::new(),
        }
    }

    /// A dispatchable attached to `node`.
    #[must_use]
    pub fn with_node(node: NodeHandle) -> Self {
        let mut dispatchable = Self::new();
        dispatchable.node = Some(node);
        dispatchable
    }

    // ── Node lifecycle ───────────────────────────────────────────────

    /// Whether a presentation node is attached.
    #[must_use]
    pub fn has_node(&self) -> bool {
        self.node.is_some()
    }

    /// The attached presentation node, if any.
    #[must_use]
    pub fn node(&self) -> Option<NodeHandle> {
        self.node.clone()
    }

    /// Attach (or replace) the presentation node.
    ///
    /// Active listeners are deactivated against the old node first, so no
    /// native subscription outlives the handle it was made on.
    pub fn set_node(&mut self, node: NodeHandle) {
        self.deactivate_all_listeners();
        self.node = Some(node);
    }

    /// Detach from the presentation tree, releasing every native
    /// subscription.
    pub fn detach_node(&mut self) {
        self.deactivate_all_listeners();
        self.node = None;
    }

    // ── Handler registration ─────────────────────────────────────────

    /// Register a handler for `kind`, lazily creating the registry.
    ///
    /// Returns whether an entry was added; blank kinds and inert specs are
    /// traced no-ops.
    pub fn add_handler(&mut self, kind: &str, handler: Callable, position: Position) -> bool {
        self.add_handler_with(kind, handler, Callable::inert(), position)
    }

    /// Register a handler paired with a removal hook.
    pub fn add_handler_with(
        &mut self,
        kind: &str,
        handler: Callable,
        removal: Callable,
        position: Position,
    ) -> bool {
        if !valid_kind(kind) {
            debug!(kind, "rejecting handler for blank event kind");
            return false;
        }
        let registry = self.registries.entry(kind.to_owned()).or_default();
        match position {
            Position::First => registry.prepend_with(handler, removal),
            Position::Last => registry.append_with(handler, removal),
        }
    }

    /// Remove the first handler equivalent to `target`. No-op without a
    /// registry for `kind`.
    pub fn remove_handler(&mut self, kind: &str, target: &Callable) -> bool {
        self.registries
            .get(kind)
            .is_some_and(|registry| registry.remove(target))
    }

    /// Whether an equivalent handler is registered for `kind`.
    #[must_use]
    pub fn has_handler(&self, kind: &str, target: &Callable) -> bool {
        self.index_of_handler(kind, target).is_some()
    }

    /// Position of the first equivalent handler for `kind`.
    #[must_use]
    pub fn index_of_handler(&self, kind: &str, target: &Callable) -> Option<usize> {
        self.registries.get(kind)?.index_of(target)
    }

    /// Replace the post-dispatch hook for `kind`, lazily creating the
    /// registry.
    pub fn set_post_dispatch_hook(&mut self, kind: &str, hook: Callable) {
        if !valid_kind(kind) {
            debug!(kind, "rejecting post-dispatch hook for blank event kind");
            return;
        }
        self.registries
            .entry(kind.to_owned())
            .or_default()
            .set_post_dispatch_hook(hook);
    }

    /// The registry backing `kind`, if one has been created.
    #[must_use]
    pub fn registry(&self, kind: &str) -> Option<&HandlerRegistry> {
        self.registries.get(kind)
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Dispatch `payload` to every handler of `kind`. No-op without a
    /// registry.
    pub fn dispatch_event(&self, kind: &str, payload: Option<&Value>) {
        if let Some(registry) = self.registries.get(kind) {
            registry.dispatch(payload);
        }
    }

    // ── Native listener bridge ───────────────────────────────────────

    /// Subscribe the native source for `kind` with the registry's stable
    /// dispatch entry point.
    ///
    /// Idempotent: while a subscription is active, further calls return the
    /// remembered token without touching the node again.
    pub fn activate_listener(&mut self, kind: &str) -> Result<DispatchFn, ActivateError> {
        if let Some(active) = self.active.get(kind) {
            return Ok(active.clone());
        }
        let Some(node) = self.node.clone() else {
            warn!(kind, "activate_listener with no node attached");
            return Err(ActivateError::NoNode);
        };
        let registry = self.registries.get(kind).ok_or(ActivateError::NoRegistry)?;
        let entry = registry.dispatch_entry_point();
        node.borrow_mut().subscribe(kind, entry.clone());
        self.active.insert(kind.to_owned(), entry.clone());
        debug!(kind, "native listener activated");
        Ok(entry)
    }

    /// Unsubscribe `kind` using the remembered token, then forget it.
    /// Idempotent; a no-op when nothing is active.
    pub fn deactivate_listener(&mut self, kind: &str) {
        if let Some(entry) = self.active.remove(kind) {
            if let Some(node) = &self.node {
                node.borrow_mut().unsubscribe(kind, &entry);
            }
            debug!(kind, "native listener deactivated");
        }
    }

    /// Whether a native subscription is currently active for `kind`.
    #[must_use]
    pub fn is_listener_active(&self, kind: &str) -> bool {
        self.active.contains_key(kind)
    }

    /// Deactivate every active kind. Called on detach so no native
    /// subscription leaks.
    pub fn deactivate_all_listeners(&mut self) {
        let kinds: Vec<String> = self.active.keys().cloned().collect();
        for kind in kinds {
            self.deactivate_listener(&kind);
        }
    }

    /// Reset the registry for `kind` back to empty.
    ///
    /// An active listener is deactivated first — the registry's old entry
    /// point must not stay subscribed past a reset. Without a registry the
    /// kind gets a fresh empty one, so later calls behave uniformly whether
    /// or not the kind was ever used.
    pub fn reset_handlers(&mut self, kind: &str) {
        if !valid_kind(kind) {
            return;
        }
        if self.registries.contains_key(kind) {
            self.deactivate_listener(kind);
            if let Some(registry) = self.registries.get(kind) {
                registry.reset();
            }
        } else {
            self.registries.insert(kind.to_owned(), HandlerRegistry::new());
        }
    }
}

impl Default for Dispatchable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dispatchable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatchable")
            .field("has_node", &self.has_node())
            .field("kinds", &self.registries.len())
            .field("active_listeners", &self.active.len())
            .finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
