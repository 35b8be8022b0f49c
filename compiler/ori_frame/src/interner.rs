//! String interner for identifiers.
//!
//! A single `RwLock`-protected table. Lookups of already-interned strings
//! take the read lock only; the write lock is taken on a miss and the table
//! is re-checked before inserting.

// Arc is the implementation of SharedInterner
#![expect(
    clippy::disallowed_types,
    reason = "Arc is the implementation of SharedInterner"
)]


use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::Name;

/// Error when the interner runs out of 32-bit indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InternError {
    pub count: usize,
}

impl fmt::Display for InternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "interner exhausted after {} names", self.count)
    }
}

impl std::error::Error for InternError {}

struct Table {
    map: FxHashMap<&'static str, Name>,
    strings: Vec<&'static str>,
}

/// Identifier interner.
///
/// Interned strings are leaked and live for the rest of the process, which
/// lets `lookup` hand out `&'static str` without holding the lock.
pub struct StringInterner {
    table: RwLock<Table>,
}

impl StringInterner {
    /// Create an interner with `""` and `...` pre-interned at their
    /// reserved indices.
    pub fn new() -> Self {
        let mut map = FxHashMap::default();
        map.insert("", Name::EMPTY);
        map.insert("...", Name::VARIADIC);
        StringInterner {
            table: RwLock::new(Table {
                map,
                strings: vec!["", "..."],
            }),
        }
    }

    /// Intern a string, reporting exhaustion instead of panicking.
    pub fn try_intern(&self, s: &str) -> Result<Name, InternError> {
        if let Some(&name) = self.table.read().map.get(s) {
            return Ok(name);
        }

        let mut table = self.table.write();
        if let Some(&name) = table.map.get(s) {
            return Ok(name);
        }

        let count = table.strings.len();
        let raw = u32::try_from(count).map_err(|_| InternError { count })?;
        let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
        let name = Name::from_raw(raw);
        table.strings.push(leaked);
        table.map.insert(leaked, name);
        Ok(name)
    }

    /// Intern a string.
    ///
    /// # Panics
    /// Panics if more than `u32::MAX` distinct names are interned.
    pub fn intern(&self, s: &str) -> Name {
        self.try_intern(s)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    /// Resolve a name back to its string. Names from another interner
    /// resolve to `"<unknown>"`.
    pub fn lookup(&self, name: Name) -> &'static str {
        let table = self.table.read();
        usize::try_from(name.raw())
            .ok()
            .and_then(|index| table.strings.get(index).copied())
            .unwrap_or("<unknown>")
    }

    pub fn len(&self) -> usize {
        self.table.read().strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StringInterner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringInterner")
            .field("len", &self.len())
            .finish()
    }
}

/// Interner shared between call sites, matchers, and invocations.
#[derive(Clone, Default)]
pub struct SharedInterner(Arc<StringInterner>);

impl SharedInterner {
    pub fn new() -> Self {
        SharedInterner(Arc::new(StringInterner::new()))
    }
}

impl std::ops::Deref for SharedInterner {
    type Target = StringInterner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for SharedInterner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
