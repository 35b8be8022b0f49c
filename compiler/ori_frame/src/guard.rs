//! Validity tokens.
//!
//! A [`Guard`] is a one-way flag: valid when created, invalidated at most
//! once, never revalidated. Cached facts (a stable binding value, a memoized
//! lookup, "nobody asked for the caller") hold a guard and are trusted only
//! while it reads valid. Replacing a fact means invalidating its guard and
//! creating a fresh one.

#![expect(
    clippy::disallowed_types,
    reason = "Arc is the implementation of Guard and StableValue sharing"
)]

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::Value;

struct GuardState {
    valid: AtomicBool,
    label: Box<str>,
}

/// Shared, one-way validity token.
#[derive(Clone)]
pub struct Guard(Arc<GuardState>);

impl Guard {
    pub fn new(label: impl Into<Box<str>>) -> Self {
        Guard(Arc::new(GuardState {
            valid: AtomicBool::new(true),
            label: label.into(),
        }))
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0.valid.load(Ordering::Acquire)
    }

    /// Invalidate the guard. Returns `true` if this call flipped it.
    pub fn invalidate(&self) -> bool {
        let flipped = self.0.valid.swap(false, Ordering::AcqRel);
        if flipped {
            tracing::trace!(guard = %self.0.label, "guard invalidated");
        }
        flipped
    }

    pub fn label(&self) -> &str {
        &self.0.label
    }

    pub fn ptr_eq(a: &Guard, b: &Guard) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("label", &self.label())
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// A binding's current value paired with the guard that certifies it.
///
/// `value` is `None` while the binding exists but has never been assigned
/// (or was removed).
pub struct StableValue {
    value: Option<Value>,
    guard: Guard,
}

impl StableValue {
    pub fn new(value: Option<Value>, label: impl Into<Box<str>>) -> Self {
        StableValue {
            value,
            guard: Guard::new(label),
        }
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.guard.is_valid()
    }
}

impl fmt::Debug for StableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StableValue")
            .field("value", &self.value)
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Shared handle to a [`StableValue`].
#[derive(Clone, Debug)]
pub struct SharedStable(Arc<StableValue>);

impl SharedStable {
    pub fn new(stable: StableValue) -> Self {
        SharedStable(Arc::new(stable))
    }

    pub fn ptr_eq(a: &SharedStable, b: &SharedStable) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl std::ops::Deref for SharedStable {
    type Target = StableValue;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
