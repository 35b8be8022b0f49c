//! Interned identifiers.

use std::fmt;

/// Interned identifier used for formals, argument names, and bindings.
///
/// Two names compare equal exactly when they were interned from the same
/// string by the same [`StringInterner`](crate::StringInterner).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct Name(u32);

impl Name {
    /// Pre-interned empty string. Never a legal argument name.
    pub const EMPTY: Name = Name(0);

    /// Pre-interned `...`, the name under which a variadic group is bound.
    pub const VARIADIC: Name = Name(1);

    /// Get raw u32 value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Create from raw u32 value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Name(raw)
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == Self::EMPTY.0
    }

    #[inline]
    pub const fn is_variadic(self) -> bool {
        self.0 == Self::VARIADIC.0
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Name::EMPTY => write!(f, "Name(\"\")"),
            Name::VARIADIC => write!(f, "Name(...)"),
            Name(raw) => write!(f, "Name({raw})"),
        }
    }
}

impl Default for Name {
    fn default() -> Self {
        Self::EMPTY
    }
}
