//! Transfer of control to a callee.
//!
//! Shared by every terminal cache node. Closures get a fresh activation of
//! their layout with the matched arguments bound to the formals' slots;
//! intrinsics run directly against the caller's activation.

use ori_frame::errors::{not_callable, stack_overflow};
use ori_frame::{
    Activation, CallTarget, Callable, CallerDemand, CallerHandle, EvalResult, IntrinsicCall,
    Invocation, SharedInterner, Value,
};

/// Call depth past which calls fail with a stack-overflow error.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 10_000;

/// Remaining stack below which a call runs on a freshly allocated segment.
#[cfg(not(target_arch = "wasm32"))]
const RED_ZONE: usize = 128 * 1024;

/// Size of each freshly allocated stack segment.
#[cfg(not(target_arch = "wasm32"))]
const STACK_SEGMENT: usize = 2 * 1024 * 1024;

#[cfg(not(target_arch = "wasm32"))]
#[inline]
fn with_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_SEGMENT, f)
}

#[cfg(target_arch = "wasm32")]
#[inline]
fn with_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

/// Invokes callables with already-matched arguments.
#[derive(Clone, Debug)]
pub struct Invoker {
    interner: SharedInterner,
    max_depth: usize,
}

impl Invoker {
    pub fn new(interner: SharedInterner) -> Self {
        Invoker {
            interner,
            max_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Call `callable` from `caller`.
    ///
    /// `args` has one entry per formal. `target` overrides the callable's
    /// shared body (a copy dedicated to one call site). `demand` decides
    /// whether the callee gets a strong or an elided caller handle.
    #[tracing::instrument(level = "trace", skip_all, fields(callee = callable.label()))]
    pub fn invoke(
        &self,
        caller: &Activation,
        callable: &Callable,
        target: Option<&CallTarget>,
        args: &[Option<Value>],
        demand: &CallerDemand,
    ) -> EvalResult {
        if let Some(intrinsic) = callable.intrinsic() {
            let call = IntrinsicCall {
                callable,
                caller,
                args,
                interner: &self.interner,
            };
            return with_stack(|| intrinsic(&call));
        }

        let (Some(layout), Some(target)) = (callable.layout(), target.or(callable.target())) else {
            return Err(not_callable(callable.label()));
        };

        let depth = caller.depth().saturating_add(1);
        if depth > self.max_depth {
            tracing::debug!(callee = callable.label(), depth, "call depth limit reached");
            return Err(stack_overflow(depth));
        }

        let activation = Activation::for_call(layout, callable.enclosing(), depth)?;
        for (formal, value) in callable.formals().iter().zip(args) {
            if let Some(value) = value {
                let slot = layout.find_or_add_slot(formal.name);
                activation.write(slot, value.clone(), false)?;
            }
        }

        let caller = if callable.wants_caller() {
            CallerHandle::Materialized(caller.clone())
        } else {
            demand.handle_for(caller)
        };
        let invocation = Invocation::new(
            callable.clone(),
            activation,
            caller,
            self.interner.clone(),
        );
        with_stack(|| target.call(&invocation))
    }
}
