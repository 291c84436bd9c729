#![forbid(unsafe_code)]

//! Opaque values, binding contexts, and the argument comparison strategy.
//!
//! [`Value`] is the owned payload/argument model: a small tree of primitives
//! plus `List`/`Map` composites. The structured/primitive split matters at
//! dispatch time — only structured payloads are appended to a callable's
//! stored arguments; primitive payloads are silently dropped.
//!
//! [`Context`] is the opaque binding target a callable carries. Contexts are
//! compared by reference identity, never by value: two data bags with equal
//! contents are still different contexts.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

// ─── Value ───────────────────────────────────────────────────────────────────

/// An opaque argument or payload value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Whether this value is structured (`List` or `Map`).
    ///
    /// Dispatch payloads are appended to a callable's stored arguments only
    /// when structured; primitive payloads are dropped.
    #[inline]
    #[must_use]
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::List(_) | Self::Map(_))
    }

    /// Whether this value is a primitive (not `List`/`Map`).
    #[inline]
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        !self.is_structured()
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

// ─── Argument comparison ─────────────────────────────────────────────────────

/// Order-insensitive argument-sequence comparison.
///
/// Two sequences match when their lengths are equal and every element of
/// `ours` appears somewhere in `theirs` by value. This is deliberately
/// insensitive to ordering (`[1, 2]` matches `[2, 1]`) and blind to duplicate
/// multiplicity (`[1, 1, 2]` matches `[1, 2, 2]`), which is the comparison
/// the handler-equality contract has always used. Kept for compatibility.
///
/// TODO: positional equality is almost certainly what callers expect; switch
/// with a compatibility note once handler removal paths are audited for
/// reliance on the unordered behavior.
#[must_use]
pub fn unordered_args_equal(ours: &[Value], theirs: &[Value]) -> bool {
    if ours.len() != theirs.len() {
        return false;
    }
    ours.iter().all(|arg| theirs.contains(arg))
}

// ─── Context ─────────────────────────────────────────────────────────────────

/// The opaque binding target a callable is invoked against.
///
/// A context is either a shared collaborator (say, the widget that owns the
/// registry — a legitimate back-reference, not an ownership edge) or a plain
/// data bag. Equality is reference identity in both variants.
#[derive(Clone)]
pub enum Context {
    /// Arbitrary shared collaborator.
    Object(Rc<dyn Any>),
    /// Plain data bag; shallow-duplicated by [`Context::duplicate`].
    Data(Rc<RefCell<Value>>),
}

impl Context {
    /// Wrap a shared collaborator.
    #[must_use]
    pub fn object<T: Any>(target: Rc<T>) -> Self {
        Self::Object(target)
    }

    /// Wrap a plain data bag.
    #[must_use]
    pub fn data(value: Value) -> Self {
        Self::Data(Rc::new(RefCell::new(value)))
    }

    /// Reference-identity comparison. Value-equal but distinct targets do
    /// not match.
    #[must_use]
    pub fn same_target(&self, other: &Context) -> bool {
        match (self, other) {
            (Self::Object(a), Self::Object(b)) => std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b)),
            (Self::Data(a), Self::Data(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Duplicate for a deep callable copy: a data bag is shallow-copied into
    /// a fresh cell, a shared collaborator stays shared by reference.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        match self {
            Self::Object(target) => Self::Object(Rc::clone(target)),
            Self::Data(bag) => Self::Data(Rc::new(RefCell::new(bag.borrow().clone()))),
        }
    }

    /// Borrowed view of the data bag, if this context is one.
    #[must_use]
    pub fn as_data(&self) -> Option<&Rc<RefCell<Value>>> {
        match self {
            Self::Data(bag) => Some(bag),
            Self::Object(_) => None,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(target) => f
                .debug_tuple("Context::Object")
                .field(&Rc::as_ptr(target))
                .finish(),
            Self::Data(bag) => f.debug_tuple("Context::Data").field(&bag.borrow()).finish(),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_split() {
        assert!(Value::List(vec![]).is_structured());
        assert!(Value::Map(BTreeMap::new()).is_structured());
        assert!(Value::Null.is_primitive());
        assert!(Value::Int(7).is_primitive());
        assert!(Value::Str("x".into()).is_primitive());
    }

    #[test]
    fn unordered_equal_permutations() {
        let a = [Value::Int(1), Value::Int(2)];
        let b = [Value::Int(2), Value::Int(1)];
        assert!(unordered_args_equal(&a, &b));
        assert!(unordered_args_equal(&b, &a));
    }

    #[test]
    fn unordered_equal_rejects_length_mismatch() {
        let a = [Value::Int(1)];
        let b = [Value::Int(1), Value::Int(1)];
        assert!(!unordered_args_equal(&a, &b));
    }

    #[test]
    fn unordered_equal_is_duplicate_blind() {
        // Documented quirk of the membership scan: multiplicity is ignored.
        let a = [Value::Int(1), Value::Int(1), Value::Int(2)];
        let b = [Value::Int(1), Value::Int(2), Value::Int(2)];
        assert!(unordered_args_equal(&a, &b));
    }

    #[test]
    fn empty_sequences_are_equal() {
        assert!(unordered_args_equal(&[], &[]));
    }

    #[test]
    fn context_identity_not_value() {
        let a = Context::data(Value::Int(1));
        let b = Context::data(Value::Int(1));
        assert!(a.same_target(&a));
        assert!(!a.same_target(&b));
    }

    #[test]
    fn context_clone_shares_target() {
        let a = Context::data(Value::Int(1));
        let b = a.clone();
        assert!(a.same_target(&b));
    }

    #[test]
    fn context_duplicate_detaches_data_bag() {
        let a = Context::data(Value::Int(1));
        let b = a.duplicate();
        assert!(!a.same_target(&b));
        *b.as_data().unwrap().borrow_mut() = Value::Int(2);
        assert_eq!(*a.as_data().unwrap().borrow(), Value::Int(1));
    }

    #[test]
    fn context_duplicate_shares_object() {
        let widget = Rc::new(42_u8);
        let a = Context::object(Rc::clone(&widget));
        let b = a.duplicate();
        assert!(a.same_target(&b));
    }

    #[test]
    fn mixed_variants_never_match() {
        let obj = Context::object(Rc::new(1_u8));
        let bag = Context::data(Value::Int(1));
        assert!(!obj.same_target(&bag));
    }
}
