//! What a callee sees of its call.

use crate::errors::{missing_argument, EvalResult};
use crate::guard::Guard;
use crate::{Activation, Callable, Name, SharedInterner, Value, VariadicGroup, WeakActivation};

/// Per-call-site record of whether any callee has asked for the caller's
/// activation.
///
/// Until one does, calls hand the callee only a weak reference to the
/// caller. The first request flips the site to passing a strong handle on
/// every later call.
#[derive(Clone, Debug)]
pub struct CallerDemand {
    not_needed: Guard,
}

impl CallerDemand {
    pub fn new(needed: bool) -> Self {
        let not_needed = Guard::new("caller activation not needed");
        if needed {
            not_needed.invalidate();
        }
        CallerDemand { not_needed }
    }

    pub fn is_needed(&self) -> bool {
        !self.not_needed.is_valid()
    }

    /// Record that a callee asked for the caller.
    pub fn demand(&self) {
        if self.not_needed.invalidate() {
            tracing::debug!("caller activation demanded; materializing from now on");
        }
    }

    /// The handle to pass for a call made from `caller`.
    pub fn handle_for(&self, caller: &Activation) -> CallerHandle {
        if self.is_needed() {
            CallerHandle::Materialized(caller.clone())
        } else {
            CallerHandle::Elided {
                caller: caller.downgrade(),
                demand: self.clone(),
            }
        }
    }
}

/// How a callee reaches its caller's activation.
#[derive(Clone, Debug)]
pub enum CallerHandle {
    Materialized(Activation),
    Elided {
        caller: WeakActivation,
        demand: CallerDemand,
    },
}

impl CallerHandle {
    pub fn is_materialized(&self) -> bool {
        matches!(self, CallerHandle::Materialized(_))
    }
}

/// A closure call in progress.
pub struct Invocation {
    callable: Callable,
    activation: Activation,
    caller: CallerHandle,
    interner: SharedInterner,
}

impl Invocation {
    pub fn new(
        callable: Callable,
        activation: Activation,
        caller: CallerHandle,
        interner: SharedInterner,
    ) -> Self {
        Invocation {
            callable,
            activation,
            caller,
            interner,
        }
    }

    pub fn callable(&self) -> &Callable {
        &self.callable
    }

    /// The callee's own activation.
    pub fn activation(&self) -> &Activation {
        &self.activation
    }

    pub fn interner(&self) -> &SharedInterner {
        &self.interner
    }

    pub fn depth(&self) -> usize {
        self.activation.depth()
    }

    pub fn caller_handle(&self) -> &CallerHandle {
        &self.caller
    }

    /// The caller's activation. Asking for it makes the call site pass it
    /// eagerly from now on.
    pub fn caller(&self) -> Option<Activation> {
        match &self.caller {
            CallerHandle::Materialized(caller) => Some(caller.clone()),
            CallerHandle::Elided { caller, demand } => {
                demand.demand();
                caller.upgrade()
            }
        }
    }

    /// Value bound to formal `name`.
    pub fn argument(&self, name: Name) -> EvalResult {
        self.activation
            .read_name(name)
            .map(Value::force)
            .ok_or_else(|| missing_argument(self.interner.lookup(name)))
    }

    /// The group bound to the `...` formal, if the callee has one.
    pub fn variadic(&self) -> Option<VariadicGroup> {
        match self.activation.read_name(Name::VARIADIC) {
            Some(Value::Variadic(group)) => Some(group),
            _ => None,
        }
    }
}

/// An intrinsic call in progress.
pub struct IntrinsicCall<'a> {
    pub callable: &'a Callable,
    pub caller: &'a Activation,
    /// One entry per formal, in formal order; `None` for formals that were
    /// neither supplied nor defaulted.
    pub args: &'a [Option<Value>],
    pub interner: &'a SharedInterner,
}

impl IntrinsicCall<'_> {
    /// Argument for formal `index`.
    pub fn arg(&self, index: usize) -> EvalResult {
        if let Some(Some(value)) = self.args.get(index) {
            return Ok(value.clone().force());
        }
        let name = self
            .callable
            .formals()
            .get(index)
            .map_or("<unknown>", |formal| self.interner.lookup(formal.name));
        Err(missing_argument(name))
    }
}
