//! Runtime values as seen by the call and binding machinery.
//!
//! Only the distinctions the caches care about are modelled: identity
//! versus value comparison for stable-value tracking, whether a value is
//! mutable in place (and therefore unsafe to share across contexts), and
//! the two special kinds a binding can hold (a variadic group and an
//! active binding).

#![expect(
    clippy::disallowed_types,
    reason = "Arc backs shared strings, lists, groups, and active bindings"
)]

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{Callable, Name};

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    /// Mutable in place; never shared between execution contexts.
    List(SharedList),
    Function(Callable),
    /// The arguments bound to a `...` formal.
    Variadic(VariadicGroup),
    /// A binding whose value is recomputed on every read.
    Active(ActiveBinding),
}

impl Value {
    #[inline]
    pub fn int(n: i64) -> Self {
        Value::Int(n)
    }

    #[inline]
    pub fn float(f: f64) -> Self {
        Value::Float(f)
    }

    #[inline]
    pub fn bool(b: bool) -> Self {
        Value::Bool(b)
    }

    pub fn string(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(SharedList::new(items))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Function(_) => "function",
            Value::Variadic(_) => "...",
            Value::Active(_) => "active binding",
        }
    }

    pub fn as_callable(&self) -> Option<&Callable> {
        match self {
            Value::Function(callable) => Some(callable),
            _ => None,
        }
    }

    /// Whether `self` and `other` are the same value for stable-value
    /// tracking: primitives compare by value, everything else by identity.
    pub fn same_identity(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => Arc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(&a.0, &b.0),
            (Value::Function(a), Value::Function(b)) => Callable::ptr_eq(a, b),
            (Value::Variadic(a), Value::Variadic(b)) => Arc::ptr_eq(&a.0, &b.0),
            (Value::Active(a), Value::Active(b)) => Arc::ptr_eq(&a.0, &b.0),
            _ => false,
        }
    }

    /// Values mutated in place cannot be shared by several execution
    /// contexts through one binding.
    pub fn is_context_unsafe(&self) -> bool {
        matches!(self, Value::List(_))
    }

    /// Copy for installation into another context: in-place-mutable values
    /// are deep-copied, everything else is shared.
    pub fn copy_for_context(&self) -> Value {
        match self {
            Value::List(list) => Value::List(list.deep_copy()),
            other => other.clone(),
        }
    }

    /// Evaluate an active binding; any other value is returned as is.
    pub fn force(self) -> Value {
        match self {
            Value::Active(binding) => binding.get(),
            other => other,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                Arc::ptr_eq(&a.0, &b.0) || *a.0.read() == *b.0.read()
            }
            (Value::Variadic(a), Value::Variadic(b)) => a.entries() == b.entries(),
            _ => self.same_identity(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(list) => f.debug_list().entries(list.0.read().iter()).finish(),
            Value::Function(callable) => write!(f, "{callable:?}"),
            Value::Variadic(group) => f.debug_list().entries(group.entries()).finish(),
            Value::Active(_) => write!(f, "<active binding>"),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<Callable> for Value {
    fn from(callable: Callable) -> Self {
        Value::Function(callable)
    }
}

/// A list mutated in place by its holders.
#[derive(Clone)]
pub struct SharedList(Arc<RwLock<Vec<Value>>>);

impl SharedList {
    pub fn new(items: Vec<Value>) -> Self {
        SharedList(Arc::new(RwLock::new(items)))
    }

    pub fn push(&self, value: Value) {
        self.0.write().push(value);
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.read().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    pub fn ptr_eq(&self, other: &SharedList) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Copy this list and, recursively, every list inside it.
    pub fn deep_copy(&self) -> SharedList {
        let items = self.0.read().iter().map(Value::copy_for_context).collect();
        SharedList::new(items)
    }
}

/// One entry of a variadic group.
#[derive(Clone, Debug, PartialEq)]
pub struct VariadicEntry {
    pub name: Option<Name>,
    pub value: Value,
}

/// The ordered, optionally named arguments collected by a `...` formal.
#[derive(Clone)]
pub struct VariadicGroup(Arc<[VariadicEntry]>);

impl VariadicGroup {
    pub fn new(entries: Vec<VariadicEntry>) -> Self {
        VariadicGroup(Arc::from(entries))
    }

    pub fn empty() -> Self {
        VariadicGroup::new(Vec::new())
    }

    pub fn entries(&self) -> &[VariadicEntry] {
        &self.0
    }

    pub fn names(&self) -> impl Iterator<Item = Option<Name>> + '_ {
        self.0.iter().map(|entry| entry.name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for VariadicGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries()).finish()
    }
}

type Getter = dyn Fn() -> Value + Send + Sync;

/// A binding backed by a getter.
#[derive(Clone)]
pub struct ActiveBinding(Arc<Getter>);

impl ActiveBinding {
    pub fn new(getter: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        ActiveBinding(Arc::new(getter))
    }

    pub fn get(&self) -> Value {
        (self.0)()
    }
}
