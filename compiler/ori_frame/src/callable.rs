//! Callable values.
//!
//! A [`Callable`] is compared by identity: call-site caches key their
//! entries on the exact callable they specialized for. Closures carry a
//! function layout (one slot per formal), the activation they close over,
//! and a [`CallTarget`], the executable body. Intrinsics carry a plain
//! function pointer and run without an activation of their own.

#![expect(
    clippy::disallowed_types,
    reason = "Arc is the implementation of Callable and CallTarget"
)]

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bitflags::bitflags;

use crate::errors::{EvalResult, InternalError};
use crate::invocation::{IntrinsicCall, Invocation};
use crate::{Activation, Layout, Name, Value};

bitflags! {
    /// Properties of a callable that change how call sites dispatch to it.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CallableFlags: u8 {
        /// Runs without an activation; arguments are handed over directly.
        const INTRINSIC = 1 << 0;
        /// Needs its caller's activation on every call.
        const WANTS_CALLER = 1 << 1;
        /// Each call site should run its own copy of the body.
        const WANTS_DEDICATED_COPY = 1 << 2;
    }
}

/// A formal parameter.
#[derive(Clone, Debug)]
pub struct Formal {
    pub name: Name,
    pub default: Option<Value>,
}

impl Formal {
    pub fn new(name: Name) -> Self {
        Formal {
            name,
            default: None,
        }
    }

    pub fn with_default(name: Name, default: Value) -> Self {
        Formal {
            name,
            default: Some(default),
        }
    }

    /// The `...` formal, collecting every argument no other formal takes.
    pub fn variadic() -> Self {
        Formal::new(Name::VARIADIC)
    }

    pub fn is_variadic(&self) -> bool {
        self.name.is_variadic()
    }
}

/// Body of an intrinsic.
pub type IntrinsicFn = fn(&IntrinsicCall<'_>) -> EvalResult;

type Body = dyn Fn(&Invocation) -> EvalResult + Send + Sync;

struct TargetState {
    body: Arc<Body>,
    dedicated: bool,
    calls: AtomicU64,
}

/// Executable form of a closure body.
#[derive(Clone)]
pub struct CallTarget(Arc<TargetState>);

impl CallTarget {
    fn new(body: Arc<Body>, dedicated: bool) -> Self {
        CallTarget(Arc::new(TargetState {
            body,
            dedicated,
            calls: AtomicU64::new(0),
        }))
    }

    pub fn call(&self, invocation: &Invocation) -> EvalResult {
        self.0.calls.fetch_add(1, Ordering::Relaxed);
        (self.0.body)(invocation)
    }

    /// Number of calls executed through this target.
    pub fn calls(&self) -> u64 {
        self.0.calls.load(Ordering::Relaxed)
    }

    /// Whether this is a copy made for one call site.
    pub fn is_dedicated(&self) -> bool {
        self.0.dedicated
    }

    pub fn ptr_eq(a: &CallTarget, b: &CallTarget) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallTarget")
            .field("dedicated", &self.is_dedicated())
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

enum CallableKind {
    Intrinsic(IntrinsicFn),
    Closure {
        layout: Layout,
        enclosing: Activation,
        target: CallTarget,
    },
}

struct CallableData {
    name: Name,
    label: Box<str>,
    formals: Box<[Formal]>,
    flags: CallableFlags,
    kind: CallableKind,
    dedicated_copies: AtomicUsize,
}

/// A function value.
#[derive(Clone)]
pub struct Callable(Arc<CallableData>);

impl Callable {
    pub fn builder(name: Name) -> CallableBuilder {
        CallableBuilder {
            name,
            label: None,
            formals: Vec::new(),
            flags: CallableFlags::empty(),
        }
    }

    pub fn name(&self) -> Name {
        self.0.name
    }

    pub fn label(&self) -> &str {
        &self.0.label
    }

    pub fn formals(&self) -> &[Formal] {
        &self.0.formals
    }

    pub fn flags(&self) -> CallableFlags {
        self.0.flags
    }

    pub fn is_intrinsic(&self) -> bool {
        self.0.flags.contains(CallableFlags::INTRINSIC)
    }

    pub fn wants_caller(&self) -> bool {
        self.0.flags.contains(CallableFlags::WANTS_CALLER)
    }

    pub fn wants_dedicated_copy(&self) -> bool {
        self.0.flags.contains(CallableFlags::WANTS_DEDICATED_COPY)
    }

    pub fn layout(&self) -> Option<&Layout> {
        match &self.0.kind {
            CallableKind::Closure { layout, .. } => Some(layout),
            CallableKind::Intrinsic(_) => None,
        }
    }

    pub fn enclosing(&self) -> Option<&Activation> {
        match &self.0.kind {
            CallableKind::Closure { enclosing, .. } => Some(enclosing),
            CallableKind::Intrinsic(_) => None,
        }
    }

    /// The shared executable body.
    pub fn target(&self) -> Option<&CallTarget> {
        match &self.0.kind {
            CallableKind::Closure { target, .. } => Some(target),
            CallableKind::Intrinsic(_) => None,
        }
    }

    pub fn intrinsic(&self) -> Option<IntrinsicFn> {
        match &self.0.kind {
            CallableKind::Intrinsic(f) => Some(*f),
            CallableKind::Closure { .. } => None,
        }
    }

    /// Make a private copy of the body for one call site.
    pub fn dedicated_copy(&self) -> Option<CallTarget> {
        let target = self.target()?;
        let copies = self.0.dedicated_copies.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(callee = self.label(), copies, "dedicated call target created");
        Some(CallTarget::new(Arc::clone(&target.0.body), true))
    }

    /// Number of dedicated copies made so far.
    pub fn dedicated_copies(&self) -> usize {
        self.0.dedicated_copies.load(Ordering::Relaxed)
    }

    pub fn ptr_eq(a: &Callable, b: &Callable) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.label())
    }
}

/// Builder for [`Callable`].
#[must_use]
pub struct CallableBuilder {
    name: Name,
    label: Option<String>,
    formals: Vec<Formal>,
    flags: CallableFlags,
}

impl CallableBuilder {
    /// Display name, used in diagnostics and traces.
    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn formal(mut self, formal: Formal) -> Self {
        self.formals.push(formal);
        self
    }

    pub fn formals(mut self, formals: impl IntoIterator<Item = Formal>) -> Self {
        self.formals.extend(formals);
        self
    }

    pub fn flags(mut self, flags: CallableFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn intrinsic(self, f: IntrinsicFn) -> Callable {
        let flags = self.flags | CallableFlags::INTRINSIC;
        self.finish(flags, CallableKind::Intrinsic(f))
    }

    /// Build a closure over `enclosing`. Its layout gets one slot per
    /// formal, in order.
    pub fn closure(
        self,
        enclosing: &Activation,
        body: impl Fn(&Invocation) -> EvalResult + Send + Sync + 'static,
    ) -> Result<Callable, InternalError> {
        let label = self.label.clone().unwrap_or_else(|| "<function>".to_string());
        let layout = Layout::function(&label);
        layout.initialize_enclosing(Some(enclosing.layout()))?;
        for formal in &self.formals {
            layout.find_or_add_slot(formal.name);
        }
        let flags = self.flags - CallableFlags::INTRINSIC;
        let body: Arc<Body> = Arc::new(body);
        Ok(self.finish(
            flags,
            CallableKind::Closure {
                layout,
                enclosing: enclosing.clone(),
                target: CallTarget::new(body, false),
            },
        ))
    }

    fn finish(self, flags: CallableFlags, kind: CallableKind) -> Callable {
        Callable(Arc::new(CallableData {
            name: self.name,
            label: self.label.unwrap_or_else(|| "<function>".to_string()).into(),
            formals: self.formals.into_boxed_slice(),
            flags,
            kind,
            dedicated_copies: AtomicUsize::new(0),
        }))
    }
}
