//! Layout linkage and lookup memoization.
//!
//! Every layout records which names were looked up through it
//! (`previous_lookups`) and, for lookups that started at it, the memoized
//! result. Structural changes (a new slot, a relinked parent, an inserted
//! or removed scope) invalidate exactly the memoized results they could
//! have changed, following `children` downwards.
//!
//! All operations that touch more than one layout run under one
//! process-wide structural lock. Per-layout state sits behind its own
//! mutex, which is never held while another layout's mutex is taken.

use parking_lot::{const_mutex, Mutex, MutexGuard};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::{smallvec, SmallVec};

use super::{Layout, WeakLayout};
use crate::errors::InternalError;
use crate::guard::Guard;
use crate::lookup::LookupResult;
use crate::Name;

static STRUCTURE: Mutex<()> = const_mutex(());

/// Proof that the structural lock is held.
pub(crate) type StructureLock = MutexGuard<'static, ()>;

pub(crate) fn lock_structure() -> StructureLock {
    STRUCTURE.lock()
}

/// Layouts still to visit during an invalidation walk.
type Worklist = SmallVec<[Layout; 8]>;

pub(crate) struct Structure {
    label: Box<str>,
    enclosing: Option<WeakLayout>,
    enclosing_guard: Guard,
    children: Vec<WeakLayout>,
    previous_lookups: FxHashSet<Name>,
    lookup_results: FxHashMap<Name, LookupResult>,
}

impl Structure {
    pub(crate) fn new(label: &str) -> Self {
        Structure {
            label: label.into(),
            enclosing: None,
            enclosing_guard: Guard::new(format!("{label} enclosing")),
            children: Vec::new(),
            previous_lookups: FxHashSet::default(),
            lookup_results: FxHashMap::default(),
        }
    }

    fn relink(&mut self, enclosing: Option<&Layout>) {
        self.enclosing_guard.invalidate();
        self.enclosing = enclosing.map(Layout::downgrade);
        self.enclosing_guard = Guard::new(format!("{} enclosing", self.label));
    }

    /// The parent, if it is still alive.
    fn parent(&self) -> Option<Layout> {
        self.enclosing.as_ref().and_then(WeakLayout::upgrade)
    }

    fn live_children(&mut self) -> Vec<Layout> {
        self.children.retain(|child| child.upgrade().is_some());
        self.children.iter().filter_map(WeakLayout::upgrade).collect()
    }
}

impl Layout {
    pub fn enclosing(&self) -> Option<Layout> {
        self.0.structure.lock().parent()
    }

    /// Valid until this layout is relinked to another parent.
    pub fn enclosing_guard(&self) -> Guard {
        self.0.structure.lock().enclosing_guard.clone()
    }

    pub fn children(&self) -> Vec<Layout> {
        self.0.structure.lock().live_children()
    }

    /// Whether a lookup of `name` has walked through this layout since the
    /// last invalidation of that name here.
    pub fn has_looked_up(&self, name: Name) -> bool {
        self.0.structure.lock().previous_lookups.contains(&name)
    }

    pub(crate) fn is_enclosed_by(&self, parent: Option<&Layout>) -> bool {
        match (&self.0.structure.lock().enclosing, parent) {
            (Some(actual), Some(parent)) => actual.points_to(parent),
            (None, None) => true,
            _ => false,
        }
    }

    /// Link a fresh layout to its parent. Calling it again with the same
    /// parent is a no-op; a different parent is an error.
    pub fn initialize_enclosing(&self, parent: Option<&Layout>) -> Result<(), InternalError> {
        let _held = lock_structure();
        {
            let mut structure = self.0.structure.lock();
            match (structure.parent(), parent) {
                (Some(actual), Some(parent)) if Layout::ptr_eq(&actual, parent) => return Ok(()),
                (None, None) => return Ok(()),
                (None, Some(parent)) => structure.relink(Some(parent)),
                (actual, parent) => {
                    return Err(InternalError::EnclosingMismatch {
                        layout: self.label().to_string(),
                        expected: parent.map(|p| p.label().to_string()),
                        found: actual.as_ref().map(|a| a.label().to_string()),
                    });
                }
            }
        }
        if let Some(parent) = parent {
            parent.add_child(self);
        }
        Ok(())
    }

    /// Relink this layout to a new parent.
    pub fn set_enclosing(&self, parent: Option<&Layout>) {
        let held = lock_structure();
        self.set_enclosing_locked(parent, &held);
    }

    pub(crate) fn set_enclosing_locked(&self, parent: Option<&Layout>, held: &StructureLock) {
        self.invalidate_all_names_locked(held);
        let old = {
            let mut structure = self.0.structure.lock();
            let old = structure.parent();
            structure.relink(parent);
            old
        };
        if let Some(old) = old {
            old.remove_child(self);
        }
        if let Some(parent) = parent {
            parent.add_child(self);
        }
        tracing::debug!(
            layout = self.label(),
            parent = parent.map(Layout::label),
            "layout relinked"
        );
    }

    /// Insert `inserted` between this layout and its parent.
    pub(crate) fn attach_locked(
        &self,
        inserted: &Layout,
        held: &StructureLock,
    ) -> Result<(), InternalError> {
        let old = self.enclosing().ok_or_else(|| InternalError::NoEnclosingLayout {
            layout: self.label().to_string(),
        })?;

        inserted.invalidate_all_names_locked(held);
        self.invalidate_names_locked(&inserted.identifiers(), held);

        let inherited = old.0.structure.lock().previous_lookups.clone();
        {
            let mut structure = inserted.0.structure.lock();
            structure.previous_lookups = inherited;
            structure.relink(Some(&old));
        }
        self.0.structure.lock().relink(Some(inserted));

        inserted.add_child(self);
        old.remove_child(self);
        old.add_child(inserted);
        tracing::debug!(
            layout = self.label(),
            inserted = inserted.label(),
            "scope attached"
        );
        Ok(())
    }

    /// Remove this layout's parent from the chain, linking this layout to
    /// its grandparent.
    pub(crate) fn detach_locked(&self, held: &StructureLock) -> Result<(), InternalError> {
        let old = self.enclosing().ok_or_else(|| InternalError::NoEnclosingLayout {
            layout: self.label().to_string(),
        })?;
        let grandparent = old.enclosing();

        old.invalidate_names_locked(&old.identifiers(), held);
        self.0.structure.lock().relink(grandparent.as_ref());
        old.0.structure.lock().relink(None);

        old.remove_child(self);
        if let Some(grandparent) = grandparent {
            grandparent.remove_child(&old);
            grandparent.add_child(self);
        }
        tracing::debug!(layout = self.label(), detached = old.label(), "scope detached");
        Ok(())
    }

    /// Invalidate memoized lookups of `names` that passed through this
    /// layout, here and in every layout nested inside it.
    pub fn invalidate_names(&self, names: &[Name]) {
        let held = lock_structure();
        self.invalidate_names_locked(names, &held);
    }

    pub(crate) fn invalidate_names_locked(&self, names: &[Name], _held: &StructureLock) {
        let mut pending: Worklist = smallvec![self.clone()];
        while let Some(layout) = pending.pop() {
            let children = {
                let mut structure = layout.0.structure.lock();
                let mut hit = false;
                for name in names {
                    hit |= structure.previous_lookups.remove(name);
                }
                if !hit {
                    continue;
                }
                for name in names {
                    if let Some(result) = structure.lookup_results.remove(name) {
                        result.guard().invalidate();
                    }
                }
                structure.live_children()
            };
            tracing::trace!(layout = layout.label(), ?names, "lookups invalidated");
            pending.extend(children);
        }
    }

    /// Invalidate every memoized lookup here and, if anything was looked up
    /// through this layout, in every layout nested inside it.
    pub fn invalidate_all_names(&self) {
        let held = lock_structure();
        self.invalidate_all_names_locked(&held);
    }

    pub(crate) fn invalidate_all_names_locked(&self, _held: &StructureLock) {
        let mut pending: Worklist = smallvec![self.clone()];
        while let Some(layout) = pending.pop() {
            let children = {
                let mut structure = layout.0.structure.lock();
                for (_, result) in structure.lookup_results.drain() {
                    result.guard().invalidate();
                }
                if structure.previous_lookups.is_empty() {
                    continue;
                }
                structure.previous_lookups.clear();
                structure.live_children()
            };
            pending.extend(children);
        }
    }

    pub(crate) fn memoized_lookup(&self, name: Name) -> Option<LookupResult> {
        self.0.structure.lock().lookup_results.get(&name).cloned()
    }

    pub(crate) fn memoize_lookup(&self, name: Name, result: LookupResult) {
        let mut structure = self.0.structure.lock();
        structure.previous_lookups.insert(name);
        if let Some(stale) = structure.lookup_results.insert(name, result) {
            stale.guard().invalidate();
        }
    }

    pub(crate) fn record_lookup(&self, name: Name) {
        self.0.structure.lock().previous_lookups.insert(name);
    }

    fn add_child(&self, child: &Layout) {
        let mut structure = self.0.structure.lock();
        if !structure.children.iter().any(|weak| weak.points_to(child)) {
            structure.children.push(child.downgrade());
        }
    }

    fn remove_child(&self, child: &Layout) {
        self.0
            .structure
            .lock()
            .children
            .retain(|weak| !weak.points_to(child));
    }
}
