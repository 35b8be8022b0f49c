//! Per-context bindings.
//!
//! A singleton activation shared by several execution contexts can hold a
//! different value per context in one slot. Converting a slot is one-way:
//! the slot stops being tracked as a stable value, its `no_fan_out` guard
//! is invalidated, and from then on every read and write goes through the
//! current context's entry.

#![expect(
    clippy::disallowed_types,
    reason = "Arc is the implementation of FanOutSlot sharing"
)]

#[cfg(test)]
mod tests;

use std::sync::Arc;

use parking_lot::RwLock;

use crate::activation::SlotContent;
use crate::context::{ContextTable, PRIMORDIAL_CONTEXT};
use crate::errors::InternalError;
use crate::layout::lock_structure;
use crate::{Activation, Value};

/// One value per execution context.
#[derive(Clone)]
pub(crate) struct FanOutSlot(Arc<RwLock<Vec<Option<Value>>>>);

impl FanOutSlot {
    fn with_len(len: usize) -> Self {
        FanOutSlot(Arc::new(RwLock::new(vec![None; len])))
    }

    /// A new slot holding the same entries, sized for `len` contexts.
    fn extended(&self, len: usize) -> Self {
        let mut values = self.0.read().clone();
        if values.len() < len {
            values.resize(len, None);
        }
        FanOutSlot(Arc::new(RwLock::new(values)))
    }

    pub(crate) fn get(&self, context: usize) -> Option<Value> {
        self.0.read().get(context).cloned().flatten()
    }

    pub(crate) fn set(&self, context: usize, value: Option<Value>) {
        let mut values = self.0.write();
        if values.len() <= context {
            values.resize(context + 1, None);
        }
        values[context] = value;
    }

    pub(crate) fn take(&self, context: usize) -> Option<Value> {
        self.0.write().get_mut(context).and_then(Option::take)
    }

    fn set_all(&self, value: Option<&Value>, deep_copy: bool) {
        for entry in self.0.write().iter_mut() {
            *entry = value.map(|v| if deep_copy { v.copy_for_context() } else { v.clone() });
        }
    }

    fn clear_except_primordial(&self) {
        for entry in self.0.write().iter_mut().skip(PRIMORDIAL_CONTEXT + 1) {
            *entry = None;
        }
    }
}

fn context_len(at_least: usize) -> usize {
    ContextTable::global().len().max(at_least.saturating_add(1))
}

impl Activation {
    /// Write `value` into `slot` for the current execution context only.
    ///
    /// Outside the primordial context this converts the slot to
    /// per-context storage on first use; the value the slot held so far
    /// stays visible to the primordial context.
    pub fn write_in_context(&self, slot: usize, value: Value) -> Result<(), InternalError> {
        let info = self.slot_info(slot)?;
        let context = ContextTable::current();
        if context == PRIMORDIAL_CONTEXT {
            return self.write(slot, value, false);
        }
        if !info.possible_fan_out() {
            return Err(InternalError::NotSingleton {
                layout: self.layout().label().to_string(),
            });
        }

        let _held = lock_structure();
        let converted = self.update(slot, |entry| {
            let previous = match &*entry {
                SlotContent::FanOut(fan) => {
                    fan.set(context, Some(value));
                    return false;
                }
                SlotContent::Value(stored) => Some(stored.clone()),
                SlotContent::Empty => None,
            };

            info.not_modified_non_locally().invalidate();
            info.drop_stable();
            info.no_fan_out().invalidate();

            let fan = FanOutSlot::with_len(context_len(context));
            fan.set(PRIMORDIAL_CONTEXT, previous);
            fan.set(context, Some(value));
            *entry = SlotContent::FanOut(fan);
            true
        });
        if converted {
            tracing::debug!(
                layout = self.layout().label(),
                slot,
                context,
                "binding fanned out on write"
            );
        }
        Ok(())
    }

    /// Value of `slot` as seen from `context`.
    pub fn read_in_context(&self, slot: usize, context: usize) -> Option<Value> {
        match self.content(slot) {
            SlotContent::Empty => None,
            SlotContent::Value(value) => Some(value),
            SlotContent::FanOut(fan) => fan.get(context),
        }
    }

    pub fn is_fanned_out(&self, slot: usize) -> bool {
        matches!(self.content(slot), SlotContent::FanOut(_))
    }

    /// Prepare `slot` for evaluation in `contexts`.
    ///
    /// With `replicate`, each new context starts with its own copy of the
    /// current value (in-place-mutable values are deep-copied). Without it,
    /// the new contexts start empty and only the primordial context keeps
    /// the value. A tracked, immutable binding replicated to every context
    /// is left shared. Returns `true` if the slot was converted or extended.
    pub fn fan_out_slot(
        &self,
        slot: usize,
        contexts: &[usize],
        replicate: bool,
    ) -> Result<bool, InternalError> {
        self.require_singleton()?;
        let info = self.slot_info(slot)?;
        if !info.possible_fan_out() {
            return Ok(false);
        }

        let _held = lock_structure();
        let converted = self.update(slot, |entry| {
            let (existing, value) = match &*entry {
                SlotContent::Empty => (None, None),
                SlotContent::Value(value) => (None, Some(value.clone())),
                SlotContent::FanOut(fan) => (Some(fan.clone()), fan.get(PRIMORDIAL_CONTEXT)),
            };

            let stable = info.stable();
            let unsafe_value = value.as_ref().is_some_and(Value::is_context_unsafe)
                || stable
                    .as_ref()
                    .is_some_and(|stable| stable.value().is_some_and(Value::is_context_unsafe));
            if stable.is_some() && !unsafe_value && replicate {
                return false;
            }

            info.not_modified_non_locally().invalidate();
            info.drop_stable();
            info.no_fan_out().invalidate();

            let needed = context_len(contexts.iter().copied().max().unwrap_or(PRIMORDIAL_CONTEXT));
            let fan = match existing {
                Some(existing) => {
                    let fan = existing.extended(needed);
                    if replicate {
                        for &context in contexts {
                            fan.set(context, value.as_ref().map(Value::copy_for_context));
                        }
                    }
                    fan
                }
                None => {
                    let fan = FanOutSlot::with_len(needed);
                    if replicate {
                        fan.set_all(value.as_ref(), unsafe_value);
                    } else {
                        fan.set(PRIMORDIAL_CONTEXT, value);
                    }
                    fan
                }
            };
            *entry = SlotContent::FanOut(fan);
            true
        });
        if converted {
            tracing::debug!(
                layout = self.layout().label(),
                slot,
                contexts = contexts.len(),
                replicate,
                "binding fanned out"
            );
        }
        Ok(converted)
    }

    /// [`fan_out_slot`](Self::fan_out_slot) for every slot of this
    /// activation. Returns how many slots were converted or extended.
    pub fn fan_out_all(&self, contexts: &[usize], replicate: bool) -> Result<usize, InternalError> {
        self.require_singleton()?;
        let mut converted = 0;
        for slot in 0..self.layout().slot_count() {
            if self.fan_out_slot(slot, contexts, replicate)? {
                converted += 1;
            }
        }
        Ok(converted)
    }

    /// Drop per-context values: those of `contexts`, or of every context
    /// but the primordial one.
    pub fn clean_fan_out(&self, contexts: Option<&[usize]>) {
        for slot in 0..self.layout().slot_count() {
            self.update(slot, |entry| {
                if let SlotContent::FanOut(fan) = entry {
                    match contexts {
                        Some(contexts) => {
                            for &context in contexts {
                                fan.take(context);
                            }
                        }
                        None => fan.clear_except_primordial(),
                    }
                }
            });
        }
    }
}
