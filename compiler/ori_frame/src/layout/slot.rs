//! Per-slot binding metadata.

#![expect(
    clippy::disallowed_types,
    reason = "Arc is the implementation of Slot"
)]

use std::sync::Arc;

use parking_lot::RwLock;

use super::{BindingPolicy, LayoutKind};
use crate::guard::{Guard, SharedStable, StableValue};
use crate::{Name, Value};

struct StableState {
    stable: Option<SharedStable>,
    budget: u32,
}

/// Metadata for one binding of a layout, shared by every activation of it.
pub struct SlotInfo {
    name: Name,
    label: Box<str>,
    not_modified_non_locally: Guard,
    no_fan_out: Guard,
    possible_fan_out: bool,
    state: RwLock<StableState>,
}

impl SlotInfo {
    pub(crate) fn new(name: Name, label: String, kind: LayoutKind, policy: BindingPolicy) -> Self {
        let stable = kind
            .is_singleton()
            .then(|| SharedStable::new(StableValue::new(None, label.as_str())));
        SlotInfo {
            name,
            not_modified_non_locally: Guard::new(format!("{label} not modified non-locally")),
            no_fan_out: Guard::new(format!("{label} not fanned out")),
            possible_fan_out: matches!(kind, LayoutKind::Singleton | LayoutKind::TopLevel),
            state: RwLock::new(StableState {
                stable,
                budget: policy.budget_for(kind),
            }),
            label: label.into_boxed_str(),
        }
    }

    pub fn name(&self) -> Name {
        self.name
    }

    /// Valid until the binding is written from a nested scope or through
    /// an irregularly accessed activation.
    pub fn not_modified_non_locally(&self) -> &Guard {
        &self.not_modified_non_locally
    }

    /// Valid until the binding is converted to per-context storage.
    pub fn no_fan_out(&self) -> &Guard {
        &self.no_fan_out
    }

    pub fn possible_fan_out(&self) -> bool {
        self.possible_fan_out
    }

    /// The current stable value, if the binding is still tracked.
    pub fn stable(&self) -> Option<SharedStable> {
        self.state.read().stable.clone()
    }

    /// How many more value changes the binding may absorb before it stops
    /// being tracked.
    pub fn remaining_budget(&self) -> u32 {
        self.state.read().budget
    }

    /// Track a write (or, with `None`, a removal) against the stable value.
    ///
    /// Returns `true` when the binding went from empty to holding a value,
    /// which makes it visible to lookups that used to walk past it.
    pub(crate) fn record_write(&self, value: Option<&Value>) -> bool {
        let mut state = self.state.write();
        let Some(current) = state.stable.clone() else {
            return false;
        };

        let unchanged = match (current.value(), value) {
            (Some(old), Some(new)) => old.same_identity(new),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return false;
        }

        current.guard().invalidate();
        if state.budget > 0 {
            state.budget -= 1;
            state.stable = Some(SharedStable::new(StableValue::new(
                value.cloned(),
                &*self.label,
            )));
            tracing::trace!(slot = %self.label, budget = state.budget, "stable value replaced");
        } else {
            state.stable = None;
            tracing::debug!(slot = %self.label, "binding changed too often; no longer tracked");
        }
        current.value().is_none() && value.is_some()
    }

    /// Stop tracking the binding for good.
    pub(crate) fn drop_stable(&self) {
        let mut state = self.state.write();
        state.budget = 0;
        if let Some(stable) = state.stable.take() {
            stable.guard().invalidate();
        }
    }

    pub(crate) fn note_write(&self, non_local: bool, irregular: bool) {
        if (non_local || irregular) && self.not_modified_non_locally.invalidate() {
            tracing::debug!(slot = %self.label, non_local, irregular, "binding modified non-locally");
        }
    }
}

/// Shared handle to a [`SlotInfo`].
#[derive(Clone)]
pub struct Slot(Arc<SlotInfo>);

impl Slot {
    pub(crate) fn new(info: SlotInfo) -> Self {
        Slot(Arc::new(info))
    }
}

impl std::ops::Deref for Slot {
    type Target = SlotInfo;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
