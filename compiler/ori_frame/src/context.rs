//! Execution contexts.
//!
//! Several contexts can evaluate against the same singleton activations.
//! Each context is a small index; index 0 is the primordial context that
//! every program starts in. A fanned-out binding keeps one value per index.
//!
//! The current index is thread-local and set for a region with
//! [`ContextTable::enter`].

use std::cell::Cell;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Index of the context every program starts in.
pub const PRIMORDIAL_CONTEXT: usize = 0;

thread_local! {
    static CURRENT: Cell<usize> = const { Cell::new(PRIMORDIAL_CONTEXT) };
}

/// Process-wide registry of context indices.
pub struct ContextTable {
    count: AtomicUsize,
}

static CONTEXTS: ContextTable = ContextTable {
    count: AtomicUsize::new(1),
};

impl ContextTable {
    pub fn global() -> &'static ContextTable {
        &CONTEXTS
    }

    /// Number of indices handed out so far, including the primordial one.
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Reserve `additional` fresh indices.
    pub fn register(&self, additional: usize) -> Range<usize> {
        let start = self.count.fetch_add(additional, Ordering::AcqRel);
        tracing::debug!(start, additional, "execution contexts registered");
        start..start.saturating_add(additional)
    }

    /// Index of the context the current thread is evaluating in.
    pub fn current() -> usize {
        CURRENT.with(Cell::get)
    }

    /// Evaluate in context `index` until the returned scope is dropped.
    pub fn enter(index: usize) -> ContextScope {
        let previous = CURRENT.with(|current| current.replace(index));
        ContextScope { previous }
    }
}

/// Restores the previously current context on drop.
#[must_use = "the context is left as soon as the scope is dropped"]
pub struct ContextScope {
    previous: usize,
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        CURRENT.with(|current| current.set(self.previous));
    }
}
