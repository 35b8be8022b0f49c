//! Activations: the runtime instances of layouts.
//!
//! An activation owns one value per slot of its layout and a link to its
//! lexically enclosing activation. Writes go through here so the layout's
//! slot metadata (stable values, non-local-write guards, active-binding
//! guard) stays in step with the stored values.

#![expect(
    clippy::disallowed_types,
    reason = "Arc/Weak are the implementation of Activation and WeakActivation"
)]


use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::context::ContextTable;
use crate::errors::InternalError;
use crate::fanout::FanOutSlot;
use crate::layout::{lock_structure, Layout, Slot};
use crate::value::ActiveBinding;
use crate::{Name, Value};

static NEXT_ACTIVATION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
pub(crate) enum SlotContent {
    Empty,
    Value(Value),
    FanOut(FanOutSlot),
}

struct ActivationData {
    id: u64,
    layout: Layout,
    depth: usize,
    enclosing: RwLock<Option<Activation>>,
    slots: RwLock<Vec<SlotContent>>,
    irregular: AtomicBool,
}

/// Shared handle to an activation.
#[derive(Clone)]
pub struct Activation(Arc<ActivationData>);

/// Non-owning handle to an activation.
#[derive(Clone)]
pub struct WeakActivation(Weak<ActivationData>);

impl Activation {
    /// Create an activation of `layout` nested in `enclosing`.
    ///
    /// The layout is linked to the enclosing activation's layout on first
    /// use; a layout already linked elsewhere is an internal error.
    pub fn new(layout: &Layout, enclosing: Option<&Activation>) -> Result<Self, InternalError> {
        Self::with_depth(layout, enclosing, 0)
    }

    /// Create the activation for a call made at call depth `depth`.
    pub fn for_call(
        layout: &Layout,
        enclosing: Option<&Activation>,
        depth: usize,
    ) -> Result<Self, InternalError> {
        Self::with_depth(layout, enclosing, depth)
    }

    fn with_depth(
        layout: &Layout,
        enclosing: Option<&Activation>,
        depth: usize,
    ) -> Result<Self, InternalError> {
        let parent = enclosing.map(Activation::layout);
        if !layout.is_enclosed_by(parent) {
            layout.initialize_enclosing(parent)?;
        }
        let activation = Activation(Arc::new(ActivationData {
            id: NEXT_ACTIVATION_ID.fetch_add(1, Ordering::Relaxed),
            layout: layout.clone(),
            depth,
            enclosing: RwLock::new(enclosing.cloned()),
            slots: RwLock::new(Vec::new()),
            irregular: AtomicBool::new(false),
        }));
        if layout.is_singleton() {
            layout.claim_singleton(&activation)?;
        }
        Ok(activation)
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn layout(&self) -> &Layout {
        &self.0.layout
    }

    pub fn depth(&self) -> usize {
        self.0.depth
    }

    pub fn enclosing(&self) -> Option<Activation> {
        self.0.enclosing.read().clone()
    }

    pub fn downgrade(&self) -> WeakActivation {
        WeakActivation(Arc::downgrade(&self.0))
    }

    pub fn ptr_eq(a: &Activation, b: &Activation) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Mark this activation as reachable by means other than lexical
    /// nesting. Every later write to it counts as non-local.
    pub fn mark_irregular(&self) {
        if !self.0.irregular.swap(true, Ordering::AcqRel) {
            tracing::debug!(layout = self.layout().label(), "activation accessed irregularly");
        }
    }

    pub fn is_irregular(&self) -> bool {
        self.0.irregular.load(Ordering::Acquire)
    }

    /// Value of `slot` as seen from the current execution context.
    pub fn read(&self, slot: usize) -> Option<Value> {
        match self.content(slot) {
            SlotContent::Empty => None,
            SlotContent::Value(value) => Some(value),
            SlotContent::FanOut(fan) => fan.get(ContextTable::current()),
        }
    }

    pub fn read_name(&self, name: Name) -> Option<Value> {
        self.layout().slot_index(name).and_then(|slot| self.read(slot))
    }

    /// Bind `name` in this activation, creating its slot if needed.
    pub fn define(&self, name: Name, value: Value) -> Result<usize, InternalError> {
        let slot = self.layout().find_or_add_slot(name);
        self.write(slot, value, false)?;
        Ok(slot)
    }

    /// Assign `name` from a nested scope (`<<-`-style assignment).
    pub fn assign_non_local(&self, name: Name, value: Value) -> Result<usize, InternalError> {
        let slot = self.layout().find_or_add_slot(name);
        self.write(slot, value, true)?;
        Ok(slot)
    }

    /// Bind `name` to a getter evaluated on every read.
    pub fn set_active_binding(
        &self,
        name: Name,
        binding: ActiveBinding,
    ) -> Result<usize, InternalError> {
        self.define(name, Value::Active(binding))
    }

    /// Write `value` into `slot`.
    ///
    /// `non_local` marks writes made from a scope nested inside this one.
    pub fn write(&self, slot: usize, value: Value, non_local: bool) -> Result<(), InternalError> {
        let info = self.slot_info(slot)?;

        if matches!(value, Value::Active(_)) && self.layout().no_active_binding().invalidate() {
            tracing::debug!(layout = self.layout().label(), "layout now has active bindings");
        }

        // Stored value and stable value change together under the slot lock.
        let filled = self.update(slot, |entry| {
            if let SlotContent::FanOut(fan) = &*entry {
                fan.set(ContextTable::current(), Some(value));
                return false;
            }
            let filled = info.record_write(Some(&value));
            *entry = SlotContent::Value(value);
            filled
        });

        if filled {
            self.layout().invalidate_names(&[info.name()]);
        }
        info.note_write(non_local, self.is_irregular());
        Ok(())
    }

    /// Remove the binding of `name`. Returns `false` if it had none.
    pub fn remove(&self, name: Name) -> bool {
        let Some(slot) = self.layout().slot_index(name) else {
            return false;
        };
        let Some(info) = self.layout().slot(slot) else {
            return false;
        };

        let had_value = self.update(slot, |entry| {
            let previous = std::mem::replace(entry, SlotContent::Empty);
            let had_value = match previous {
                SlotContent::Empty => false,
                SlotContent::Value(_) => true,
                SlotContent::FanOut(fan) => {
                    let had_value = fan.take(ContextTable::current()).is_some();
                    *entry = SlotContent::FanOut(fan);
                    had_value
                }
            };
            info.record_write(None);
            had_value
        });

        info.note_write(false, self.is_irregular());
        self.layout().invalidate_names(&[name]);
        had_value
    }

    /// Relink this activation (and its singleton layout) to a new parent.
    pub fn set_enclosing(&self, parent: Option<&Activation>) -> Result<(), InternalError> {
        self.require_singleton()?;
        let held = lock_structure();
        self.layout()
            .set_enclosing_locked(parent.map(Activation::layout), &held);
        *self.0.enclosing.write() = parent.cloned();
        Ok(())
    }

    /// Insert `inserted` between this activation and its parent.
    pub fn attach(&self, inserted: &Activation) -> Result<(), InternalError> {
        let held = lock_structure();
        self.layout().attach_locked(inserted.layout(), &held)?;
        let old = self.0.enclosing.write().replace(inserted.clone());
        *inserted.0.enclosing.write() = old;
        Ok(())
    }

    /// Remove this activation's parent from the chain. Returns the removed
    /// activation.
    pub fn detach_enclosing(&self) -> Result<Option<Activation>, InternalError> {
        let held = lock_structure();
        self.layout().detach_locked(&held)?;
        let old = self.0.enclosing.write().take();
        let grandparent = old.as_ref().and_then(|old| old.0.enclosing.write().take());
        *self.0.enclosing.write() = grandparent;
        Ok(old)
    }

    pub(crate) fn slot_info(&self, slot: usize) -> Result<Slot, InternalError> {
        self.layout()
            .slot(slot)
            .ok_or_else(|| InternalError::UnknownSlot {
                layout: self.layout().label().to_string(),
                slot,
            })
    }

    pub(crate) fn require_singleton(&self) -> Result<(), InternalError> {
        if self.layout().is_singleton() {
            Ok(())
        } else {
            Err(InternalError::NotSingleton {
                layout: self.layout().label().to_string(),
            })
        }
    }

    pub(crate) fn content(&self, slot: usize) -> SlotContent {
        self.0
            .slots
            .read()
            .get(slot)
            .cloned()
            .unwrap_or(SlotContent::Empty)
    }

    /// Run `f` on the content of `slot` under the slot lock.
    pub(crate) fn update<R>(&self, slot: usize, f: impl FnOnce(&mut SlotContent) -> R) -> R {
        f(entry_mut(&mut self.0.slots.write(), slot))
    }
}

fn entry_mut(slots: &mut Vec<SlotContent>, slot: usize) -> &mut SlotContent {
    if slots.len() <= slot {
        slots.resize_with(slot + 1, || SlotContent::Empty);
    }
    &mut slots[slot]
}

impl fmt::Debug for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activation")
            .field("id", &self.id())
            .field("layout", &self.layout().label())
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}

impl WeakActivation {
    pub fn upgrade(&self) -> Option<Activation> {
        self.0.upgrade().map(Activation)
    }
}

impl fmt::Debug for WeakActivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(activation) => write!(f, "WeakActivation({})", activation.id()),
            None => write!(f, "WeakActivation(<dropped>)"),
        }
    }
}
