#![forbid(unsafe_code)]

//! The bound-callable primitive.
//!
//! A [`Callable`] bundles everything needed to fire a handler later: the
//! function itself, an optional binding [`Context`], fixed leading arguments,
//! a one-shot flag, and an optional removal hook that the owning registry
//! runs when the entry is evicted.
//!
//! # Design
//!
//! A callable without a function is *inert*: it never invokes, and every
//! setter on it is a no-op until a function is assigned. Assigning a function
//! always resets the other fields, so stale context or arguments can never
//! leak across a reassignment.
//!
//! Two clone notions exist and both matter:
//!
//! - `Clone` is a cheap handle clone. The function and context stay shared
//!   by reference and the last-result slot is the **same** slot, which is
//!   what the dispatch loop relies on to invoke an entry without holding a
//!   registry borrow.
//! - [`copy()`](Callable::copy) is the deep, independent clone of the public
//!   contract: data-bag contexts are shallow-duplicated, the argument vector
//!   and removal hook are copied, and the result slot is fresh.
//!
//! # Invariants
//!
//! 1. Inert callables are never invocable and accept no configuration.
//! 2. `invoke` appends the payload to the stored arguments only when the
//!    payload is structured; primitive payloads are dropped.
//! 3. Equivalence is structural: reference-identical function and context,
//!    matching one-shot flags, recursively equivalent removal hooks, and
//!    order-insensitively equal arguments (see
//!    [`unordered_args_equal`](crate::value::unordered_args_equal)).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::value::{Context, Value, unordered_args_equal};

// ─── Handler function ────────────────────────────────────────────────────────

/// Borrowed view a handler function receives on invocation.
///
/// `args` is the effective argument slice: the callable's stored arguments,
/// with the dispatch payload appended last when the payload is structured.
pub struct Invocation<'a> {
    /// The binding context, when one is set.
    pub context: Option<&'a Context>,
    /// Stored arguments, possibly extended by a structured payload.
    pub args: &'a [Value],
}

/// Shared handler function. Compared by reference identity.
pub type HandlerFn = Rc<dyn Fn(Invocation<'_>) -> Value>;

fn same_function(a: &Option<HandlerFn>, b: &Option<HandlerFn>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b)),
        (None, None) => true,
        _ => false,
    }
}

fn same_context(a: &Option<Context>, b: &Option<Context>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.same_target(b),
        (None, None) => true,
        _ => false,
    }
}

fn hooks_equivalent(a: &Option<Box<Callable>>, b: &Option<Box<Callable>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.is_equivalent(b),
        (None, None) => true,
        _ => false,
    }
}

// ─── Callable ────────────────────────────────────────────────────────────────

/// A deferred, reusable invocation unit.
#[derive(Clone)]
pub struct Callable {
    func: Option<HandlerFn>,
    context: Option<Context>,
    args: Vec<Value>,
    one_shot: bool,
    on_removal: Option<Box<Callable>>,
    /// Last return value, informational only. Shared across handle clones.
    last: Rc<RefCell<Option<Value>>>,
}

impl Callable {
    // ── Constructors ─────────────────────────────────────────────────

    /// An inert callable: no function, never invocable.
    #[must_use]
    pub fn inert() -> Self {
        Self {
            func: None,
            context: None,
            args: Vec::new(),
            one_shot: false,
            on_removal: None,
            last: Rc::new(RefCell::new(None)),
        }
    }

    /// Wrap a handler function that returns nothing of interest.
    #[must_use]
    pub fn new(f: impl Fn(Invocation<'_>) + 'static) -> Self {
        Self::returning(move |invocation| {
            f(invocation);
            Value::Null
        })
    }

    /// Wrap a handler function whose return value should be recorded.
    #[must_use]
    pub fn returning(f: impl Fn(Invocation<'_>) -> Value + 'static) -> Self {
        Self::from_shared(Rc::new(f))
    }

    /// Wrap an already-shared handler function.
    ///
    /// Useful when several callables must compare reference-equal on the
    /// function field.
    #[must_use]
    pub fn from_shared(f: HandlerFn) -> Self {
        let mut callable = Self::inert();
        callable.func = Some(f);
        callable
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// Whether a function is assigned. Inert callables return `false`.
    #[inline]
    #[must_use]
    pub fn is_invocable(&self) -> bool {
        self.func.is_some()
    }

    /// The one-shot flag.
    #[inline]
    #[must_use]
    pub fn one_shot(&self) -> bool {
        self.one_shot
    }

    /// Stored leading arguments.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// The binding context, if any.
    #[must_use]
    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    /// The removal hook, if any.
    #[must_use]
    pub fn removal_hook(&self) -> Option<&Callable> {
        self.on_removal.as_deref()
    }

    /// Last recorded return value, if the callable has been invoked.
    #[must_use]
    pub fn last_result(&self) -> Option<Value> {
        self.last.borrow().clone()
    }

    // ── Setters ──────────────────────────────────────────────────────
    //
    // Every setter on an inert callable is a no-op: configuration only
    // sticks once a function is assigned.

    /// Assign (or clear) the function. Always resets context, arguments,
    /// one-shot flag, and removal hook first.
    pub fn set_function(&mut self, f: Option<HandlerFn>) {
        self.clear();
        self.func = f;
    }

    /// Assign (or clear) the binding context.
    pub fn set_context(&mut self, context: Option<Context>) {
        if !self.is_invocable() {
            debug!("context ignored on inert callable");
            return;
        }
        self.context = context;
        *self.last.borrow_mut() = None;
    }

    /// Replace the stored arguments.
    pub fn set_args(&mut self, args: Vec<Value>) {
        if !self.is_invocable() {
            debug!("arguments ignored on inert callable");
            return;
        }
        self.args = args;
        *self.last.borrow_mut() = None;
    }

    /// Set the one-shot flag.
    pub fn set_one_shot(&mut self, one_shot: bool) {
        if !self.is_invocable() {
            debug!("one-shot flag ignored on inert callable");
            return;
        }
        self.one_shot = one_shot;
    }

    /// Assign (or clear) the removal hook. An inert hook clears.
    pub fn set_removal_hook(&mut self, hook: Option<Callable>) {
        if !self.is_invocable() {
            debug!("removal hook ignored on inert callable");
            return;
        }
        self.on_removal = hook.filter(Callable::is_invocable).map(Box::new);
    }

    /// Reset to the inert default.
    pub fn clear(&mut self) {
        self.func = None;
        self.context = None;
        self.args.clear();
        self.one_shot = false;
        self.on_removal = None;
        *self.last.borrow_mut() = None;
    }

    // ── Builder-style wrappers ───────────────────────────────────────

    /// Builder form of [`set_context`](Self::set_context).
    #[must_use]
    pub fn with_context(mut self, context: Context) -> Self {
        self.set_context(Some(context));
        self
    }

    /// Builder form of [`set_args`](Self::set_args).
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = Value>) -> Self {
        self.set_args(args.into_iter().collect());
        self
    }

    /// Builder form of [`set_one_shot`](Self::set_one_shot).
    #[must_use]
    pub fn once(mut self) -> Self {
        self.set_one_shot(true);
        self
    }

    /// Builder form of [`set_removal_hook`](Self::set_removal_hook).
    #[must_use]
    pub fn with_removal_hook(mut self, hook: Callable) -> Self {
        self.set_removal_hook(Some(hook));
        self
    }

    // ── Invocation ───────────────────────────────────────────────────

    /// Invoke the function with the bound context and arguments.
    ///
    /// A structured payload is appended as the final argument; a primitive
    /// payload is dropped. Inert callables yield `None` and do nothing.
    /// The return value is recorded and also handed back.
    pub fn invoke(&self, payload: Option<&Value>) -> Option<Value> {
        let func = self.func.as_ref()?;
        let result = match payload {
            Some(payload) if payload.is_structured() => {
                let mut composed = self.args.clone();
                composed.push(payload.clone());
                func(Invocation {
                    context: self.context.as_ref(),
                    args: &composed,
                })
            }
            _ => func(Invocation {
                context: self.context.as_ref(),
                args: &self.args,
            }),
        };
        *self.last.borrow_mut() = Some(result.clone());
        Some(result)
    }

    /// Run the removal hook with no payload. No-op when absent.
    ///
    /// Called by the owning registry at the moment the entry is evicted,
    /// never by the callable itself.
    pub fn run_removal_hook(&self) {
        if let Some(hook) = &self.on_removal {
            hook.invoke(None);
        }
    }

    // ── Comparison & copying ─────────────────────────────────────────

    /// Whether `other`'s arguments match the stored ones under the
    /// order-insensitive comparison.
    #[must_use]
    pub fn args_match(&self, other: &[Value]) -> bool {
        unordered_args_equal(&self.args, other)
    }

    /// Structural equality: same function and context by reference, same
    /// one-shot flag, recursively equivalent removal hooks, and
    /// order-insensitively equal arguments.
    #[must_use]
    pub fn is_equivalent(&self, other: &Callable) -> bool {
        same_function(&self.func, &other.func)
            && same_context(&self.context, &other.context)
            && self.one_shot == other.one_shot
            && hooks_equivalent(&self.on_removal, &other.on_removal)
            && self.args_match(&other.args)
    }

    /// Deep, independent clone.
    ///
    /// The function stays shared (its identity is the identity of the
    /// handler); a data-bag context is shallow-duplicated while an object
    /// context stays shared; arguments and the removal hook are copied; the
    /// result slot starts empty.
    #[must_use]
    pub fn copy(&self) -> Self {
        Self {
            func: self.func.clone(),
            context: self.context.as_ref().map(Context::duplicate),
            args: self.args.clone(),
            one_shot: self.one_shot,
            on_removal: self.on_removal.as_ref().map(|hook| Box::new(hook.copy())),
            last: Rc::new(RefCell::new(None)),
        }
    }
}

impl Default for Callable {
    fn default() -> Self {
        Self::inert()
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("invocable", &self.is_invocable())
            .field("context", &self.context)
            .field("args", &self.args)
            .field("one_shot", &self.one_shot)
            .field("has_removal_hook", &self.on_removal.is_some())
            .finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
