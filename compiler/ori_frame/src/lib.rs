//! Environments for the Ori interpreter's adaptive execution core.
//!
//! This crate owns everything a call site or a read site needs to know
//! about where names live:
//!
//! - [`Layout`]: the shape of a scope, with per-slot guards and tracked
//!   stable values
//! - [`Activation`]: one runtime instance of a layout
//! - [`resolve`] / [`LookupCache`]: guarded name resolution memoized per
//!   layout and invalidated by structural change
//! - fan-out: per-execution-context values in shared singleton scopes
//! - [`Callable`] and [`Invocation`]: what gets called and what it sees
//!
//! Dispatch itself (inline caches, argument matching) lives in `ori_call`.

mod activation;
mod callable;
mod context;
pub mod errors;
mod fanout;
mod guard;
mod interner;
mod invocation;
mod layout;
mod lookup;
mod name;
mod value;

pub use activation::{Activation, WeakActivation};
pub use callable::{Callable, CallableBuilder, CallableFlags, CallTarget, Formal, IntrinsicFn};
pub use context::{ContextScope, ContextTable, PRIMORDIAL_CONTEXT};
pub use errors::{EvalError, EvalErrorKind, EvalResult, InternalError};
pub use guard::{Guard, SharedStable, StableValue};
pub use interner::{InternError, SharedInterner, StringInterner};
pub use invocation::{CallerDemand, CallerHandle, IntrinsicCall, Invocation};
pub use layout::{BindingPolicy, Layout, LayoutKind, Slot, SlotInfo, WeakLayout};
pub use lookup::{lookup_dynamic, resolve, LookupCache, LookupResult, Resolved};
pub use name::Name;
pub use value::{ActiveBinding, SharedList, Value, VariadicEntry, VariadicGroup};
