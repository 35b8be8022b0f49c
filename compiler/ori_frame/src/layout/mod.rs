//! Environment layouts.
//!
//! A [`Layout`] describes the shape of a scope: which names have slots, at
//! which index, and the metadata that lets lookups cache what they find.
//! Every activation of a function shares that function's layout; singleton
//! layouts (modules, the top level, scopes created at run time) have
//! exactly one live activation.
//!
//! # Guards
//!
//! Each slot carries its own guards (see [`SlotInfo`]). The layout adds a
//! `no_active_binding` guard, invalidated the first time any of its slots
//! holds an active binding.
//!
//! # Structure
//!
//! Layouts are linked to their lexically enclosing layout; the structural
//! operations and lookup memoization live in `structure`.

#![expect(
    clippy::disallowed_types,
    reason = "Arc/Weak are the implementation of Layout and WeakLayout"
)]

mod slot;
mod structure;


use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

pub use slot::{Slot, SlotInfo};
pub(crate) use structure::lock_structure;

use crate::activation::WeakActivation;
use crate::errors::InternalError;
use crate::guard::Guard;
use crate::{Activation, Name};
use structure::Structure;

static NEXT_LAYOUT_ID: AtomicU64 = AtomicU64::new(1);

/// What kind of scope a layout describes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LayoutKind {
    /// Shared by every activation of one function.
    Function,
    /// Module or package scope. One activation; may fan out per context.
    Singleton,
    /// The program's top level. Like `Singleton` with a tighter budget.
    TopLevel,
    /// A scope created at run time. One activation; never fans out.
    Fresh,
}

impl LayoutKind {
    /// Layouts with at most one live activation track stable values.
    pub fn is_singleton(self) -> bool {
        !matches!(self, LayoutKind::Function)
    }
}

/// How many value changes a tracked binding absorbs before lookups stop
/// caching its value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BindingPolicy {
    pub invalidation_budget: u32,
    pub top_level_budget: u32,
}

impl BindingPolicy {
    pub fn budget_for(self, kind: LayoutKind) -> u32 {
        match kind {
            LayoutKind::TopLevel => self.top_level_budget,
            LayoutKind::Function | LayoutKind::Singleton | LayoutKind::Fresh => {
                self.invalidation_budget
            }
        }
    }
}

impl Default for BindingPolicy {
    fn default() -> Self {
        BindingPolicy {
            invalidation_budget: 2,
            top_level_budget: 1,
        }
    }
}

#[derive(Default)]
struct SlotTable {
    index: FxHashMap<Name, usize>,
    slots: Vec<Slot>,
}

pub(crate) struct LayoutData {
    id: u64,
    label: Box<str>,
    kind: LayoutKind,
    policy: BindingPolicy,
    slots: RwLock<SlotTable>,
    structure: Mutex<Structure>,
    no_active_binding: Guard,
    singleton: RwLock<Option<WeakActivation>>,
}

/// Shared handle to a layout.
#[derive(Clone)]
pub struct Layout(Arc<LayoutData>);

/// Non-owning handle to a layout.
#[derive(Clone)]
pub struct WeakLayout(Weak<LayoutData>);

impl Layout {
    pub fn new(label: &str, kind: LayoutKind, policy: BindingPolicy) -> Self {
        let id = NEXT_LAYOUT_ID.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(layout = label, id, ?kind, "layout created");
        Layout(Arc::new(LayoutData {
            id,
            label: label.into(),
            kind,
            policy,
            slots: RwLock::new(SlotTable::default()),
            structure: Mutex::new(Structure::new(label)),
            no_active_binding: Guard::new(format!("{label} has no active bindings")),
            singleton: RwLock::new(None),
        }))
    }

    pub fn function(label: &str) -> Self {
        Layout::new(label, LayoutKind::Function, BindingPolicy::default())
    }

    pub fn singleton(label: &str) -> Self {
        Layout::new(label, LayoutKind::Singleton, BindingPolicy::default())
    }

    pub fn top_level(label: &str) -> Self {
        Layout::new(label, LayoutKind::TopLevel, BindingPolicy::default())
    }

    pub fn fresh(label: &str) -> Self {
        Layout::new(label, LayoutKind::Fresh, BindingPolicy::default())
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn label(&self) -> &str {
        &self.0.label
    }

    pub fn kind(&self) -> LayoutKind {
        self.0.kind
    }

    pub fn is_singleton(&self) -> bool {
        self.0.kind.is_singleton()
    }

    pub fn ptr_eq(a: &Layout, b: &Layout) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    pub fn downgrade(&self) -> WeakLayout {
        WeakLayout(Arc::downgrade(&self.0))
    }

    pub fn slot_index(&self, name: Name) -> Option<usize> {
        self.0.slots.read().index.get(&name).copied()
    }

    pub fn slot(&self, index: usize) -> Option<Slot> {
        self.0.slots.read().slots.get(index).cloned()
    }

    pub fn slot_count(&self) -> usize {
        self.0.slots.read().slots.len()
    }

    /// Names with a slot in this layout, in slot order.
    pub fn identifiers(&self) -> Vec<Name> {
        self.0.slots.read().slots.iter().map(|slot| slot.name()).collect()
    }

    /// Index of `name`'s slot, creating it if needed.
    ///
    /// A new slot can shadow a binding further out, so lookups of `name`
    /// that passed through this layout are invalidated.
    pub fn find_or_add_slot(&self, name: Name) -> usize {
        if let Some(index) = self.slot_index(name) {
            return index;
        }

        let index = {
            let mut table = self.0.slots.write();
            if let Some(&index) = table.index.get(&name) {
                return index;
            }
            let index = table.slots.len();
            let label = format!("{}[{}]", self.label(), index);
            table.slots.push(Slot::new(SlotInfo::new(
                name,
                label,
                self.0.kind,
                self.0.policy,
            )));
            table.index.insert(name, index);
            index
        };

        tracing::trace!(layout = self.label(), ?name, index, "slot added");
        self.invalidate_names(&[name]);
        index
    }

    /// Valid until any slot of this layout holds an active binding.
    pub fn no_active_binding(&self) -> &Guard {
        &self.0.no_active_binding
    }

    /// The live activation of a singleton layout.
    pub fn singleton_activation(&self) -> Option<Activation> {
        self.0.singleton.read().as_ref().and_then(WeakActivation::upgrade)
    }

    /// Record `activation` as the one live activation of this layout.
    ///
    /// A layout whose previous activation died starts over with every slot
    /// empty: stable values describing the dead activation's bindings are
    /// replaced and every lookup memoized through this layout is dropped.
    /// Must not be called with the structural lock held.
    pub(crate) fn claim_singleton(&self, activation: &Activation) -> Result<(), InternalError> {
        let reclaimed = {
            let mut singleton = self.0.singleton.write();
            if singleton.as_ref().and_then(WeakActivation::upgrade).is_some() {
                return Err(InternalError::SingletonTaken {
                    layout: self.label().to_string(),
                });
            }
            singleton.replace(activation.downgrade()).is_some()
        };
        if reclaimed {
            let slots = self.0.slots.read().slots.clone();
            for slot in &slots {
                slot.record_write(None);
            }
            self.invalidate_all_names();
            tracing::debug!(layout = self.label(), "singleton layout reactivated");
        }
        Ok(())
    }
}

impl fmt::Debug for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layout")
            .field("label", &self.label())
            .field("id", &self.id())
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

impl WeakLayout {
    pub fn upgrade(&self) -> Option<Layout> {
        self.0.upgrade().map(Layout)
    }

    pub fn ptr_eq(a: &WeakLayout, b: &WeakLayout) -> bool {
        Weak::ptr_eq(&a.0, &b.0)
    }

    fn points_to(&self, layout: &Layout) -> bool {
        std::ptr::eq(self.0.as_ptr(), Arc::as_ptr(&layout.0))
    }
}

impl fmt::Debug for WeakLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(layout) => write!(f, "WeakLayout({:?})", layout.label()),
            None => write!(f, "WeakLayout(<dropped>)"),
        }
    }
}
