//! Guarded name resolution.
//!
//! [`resolve`] walks the activation chain once and produces a
//! [`LookupResult`] that stays usable, without walking again, for as long
//! as its guard is valid:
//!
//! - `StableValue`: the binding is tracked and holds a value; valid while
//!   both the lookup guard and the value's own guard are.
//! - `BoundAt`: the binding lives in a singleton activation but its value
//!   changes too often to track; read it there each time.
//! - `Unbound`: nothing on the chain binds the name.
//!
//! A walk that meets a binding it cannot summarize (a slot of a function
//! layout, whose value differs per activation) or an activation chain that
//! disagrees with the layout chain gives up and returns `None`; the caller
//! then reads dynamically with [`lookup_dynamic`].

#[cfg(test)]
mod tests;

use std::fmt;

use parking_lot::RwLock;

use crate::activation::WeakActivation;
use crate::errors::{undefined_variable, EvalResult};
use crate::guard::{Guard, SharedStable};
use crate::layout::lock_structure;
use crate::{Activation, Name, StringInterner, Value};

/// Memoized answer to "what does this name resolve to from this layout".
#[derive(Clone)]
pub enum LookupResult {
    StableValue { stable: SharedStable, guard: Guard },
    BoundAt {
        activation: WeakActivation,
        slot: usize,
        guard: Guard,
    },
    Unbound { guard: Guard },
}

/// What a still-valid [`LookupResult`] says about a name right now.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolved {
    Value(Value),
    Unbound,
    /// The result is stale or its binding is empty; walk dynamically.
    NoInformation,
}

impl LookupResult {
    pub fn guard(&self) -> &Guard {
        match self {
            LookupResult::StableValue { guard, .. }
            | LookupResult::BoundAt { guard, .. }
            | LookupResult::Unbound { guard } => guard,
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            LookupResult::StableValue { stable, guard } => guard.is_valid() && stable.is_valid(),
            LookupResult::BoundAt { guard, .. } | LookupResult::Unbound { guard } => {
                guard.is_valid()
            }
        }
    }

    /// Read through the result, re-checking its guards.
    pub fn read(&self) -> Resolved {
        if !self.is_valid() {
            return Resolved::NoInformation;
        }
        match self {
            LookupResult::StableValue { stable, .. } => stable
                .value()
                .cloned()
                .map_or(Resolved::NoInformation, Resolved::Value),
            LookupResult::BoundAt {
                activation, slot, ..
            } => activation
                .upgrade()
                .and_then(|activation| activation.read(*slot))
                .map_or(Resolved::NoInformation, Resolved::Value),
            LookupResult::Unbound { .. } => Resolved::Unbound,
        }
    }
}

impl fmt::Debug for LookupResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupResult::StableValue { stable, .. } => f
                .debug_struct("StableValue")
                .field("value", &stable.value())
                .field("valid", &self.is_valid())
                .finish(),
            LookupResult::BoundAt {
                activation, slot, ..
            } => f
                .debug_struct("BoundAt")
                .field("activation", activation)
                .field("slot", slot)
                .field("valid", &self.is_valid())
                .finish(),
            LookupResult::Unbound { .. } => f
                .debug_struct("Unbound")
                .field("valid", &self.is_valid())
                .finish(),
        }
    }
}

/// Resolve `name` starting at `activation`.
///
/// Every layout the walk passes through records the name, so later
/// structural changes there can invalidate the result. The result is
/// memoized on the starting layout.
#[tracing::instrument(level = "trace", skip_all, fields(name = ?name, layout = activation.layout().label()))]
pub fn resolve(activation: &Activation, name: Name) -> Option<LookupResult> {
    let _held = lock_structure();
    let start = activation.layout();
    if let Some(result) = start.memoized_lookup(name) {
        if result.is_valid() {
            return Some(result);
        }
    }

    let guard = || Guard::new(format!("lookup {name:?} from {}", start.label()));
    let mut current = activation.clone();
    let result = loop {
        let layout = current.layout().clone();
        if let Some(slot) = layout.slot_index(name) {
            let info = layout.slot(slot)?;
            match info.stable() {
                Some(stable) if stable.value().is_some() => {
                    break LookupResult::StableValue {
                        stable,
                        guard: guard(),
                    };
                }
                Some(_) => {}
                None => {
                    let singleton = layout.singleton_activation()?;
                    break LookupResult::BoundAt {
                        activation: singleton.downgrade(),
                        slot,
                        guard: guard(),
                    };
                }
            }
        }

        let next = current.enclosing();
        if !layout.is_enclosed_by(next.as_ref().map(Activation::layout)) {
            tracing::debug!(layout = layout.label(), "activation chain diverges from layouts");
            return None;
        }
        match next {
            Some(next) => current = next,
            None => break LookupResult::Unbound { guard: guard() },
        }
    };

    record_walk(activation, &current, name);
    start.memoize_lookup(name, result.clone());
    Some(result)
}

/// Record `name` on every layout from `from` up to and including `to`.
fn record_walk(from: &Activation, to: &Activation, name: Name) {
    let mut current = Some(from.clone());
    while let Some(activation) = current {
        activation.layout().record_lookup(name);
        if Activation::ptr_eq(&activation, to) {
            break;
        }
        current = activation.enclosing();
    }
}

/// Walk the activation chain reading each binding of `name`; the first
/// non-empty one wins.
pub fn lookup_dynamic(activation: &Activation, name: Name) -> Option<Value> {
    let mut current = Some(activation.clone());
    while let Some(activation) = current {
        if let Some(value) = activation.read_name(name) {
            return Some(value);
        }
        current = activation.enclosing();
    }
    None
}

/// A read site for one name, caching the last lookup result.
pub struct LookupCache {
    name: Name,
    cached: RwLock<Option<(u64, LookupResult)>>,
}

impl LookupCache {
    pub fn new(name: Name) -> Self {
        LookupCache {
            name,
            cached: RwLock::new(None),
        }
    }

    pub fn name(&self) -> Name {
        self.name
    }

    /// The cached result, if one was recorded.
    pub fn cached(&self) -> Option<LookupResult> {
        self.cached.read().as_ref().map(|(_, result)| result.clone())
    }

    /// Value of the name as seen from `activation`, or `None` if unbound.
    /// Active bindings are evaluated.
    pub fn read(&self, activation: &Activation) -> Option<Value> {
        let layout_id = activation.layout().id();
        let cached = self
            .cached
            .read()
            .as_ref()
            .filter(|(id, _)| *id == layout_id)
            .map(|(_, result)| result.clone());
        if let Some(result) = cached {
            match result.read() {
                Resolved::Value(value) => return Some(value.force()),
                Resolved::Unbound => return None,
                Resolved::NoInformation => {}
            }
        }

        let value = match resolve(activation, self.name) {
            Some(result) => {
                let resolved = result.read();
                *self.cached.write() = Some((layout_id, result));
                match resolved {
                    Resolved::Value(value) => Some(value),
                    Resolved::Unbound => None,
                    Resolved::NoInformation => lookup_dynamic(activation, self.name),
                }
            }
            None => lookup_dynamic(activation, self.name),
        };
        value.map(Value::force)
    }

    /// Like [`read`](Self::read), reporting an unbound name as an error.
    pub fn read_or_error(&self, activation: &Activation, interner: &StringInterner) -> EvalResult {
        self.read(activation)
            .ok_or_else(|| undefined_variable(interner.lookup(self.name)))
    }
}

impl fmt::Debug for LookupCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupCache")
            .field("name", &self.name)
            .field("cached", &self.cached())
            .finish()
    }
}
