//! The call-site specialization chain.
//!
//! Each call site owns an arena of cache nodes. Node 0 is the root; a node
//! rewrites itself by replacing its own arena slot, so the graph never
//! holds owning cycles and a reader always sees either the old node or the
//! new one.
//!
//! ```text
//! Uninitialized ──specialize──▶ ChainLink{f} ─handler─▶ FixedTarget
//!                                    │
//!                                   next
//!                                    ▼
//!                               Uninitialized ─ ... ─▶ GenericFallback
//! ```
//!
//! Calls that forward `...` get a variadic subchain behind each link; see
//! [`variadic`].

#![expect(
    clippy::disallowed_types,
    reason = "Arc is the implementation of arena node sharing"
)]

mod variadic;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use ori_frame::{
    Activation, CallTarget, Callable, CallerDemand, EvalResult, InternalError, Name, SharedInterner,
    Value,
};

use crate::args::{CallArguments, VariadicSignature};
use crate::config::CacheLimits;
use crate::invoker::Invoker;
use crate::matcher::{CallSourceInfo, MatchedArguments, SharedMatcher};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct NodeId(usize);

impl NodeId {
    const ROOT: NodeId = NodeId(0);
}

/// State shared by the nodes that run a cached callable with pre-matched
/// arguments.
pub(crate) struct Dispatch {
    callable: Callable,
    matched: MatchedArguments,
    demand: CallerDemand,
    split_pending: AtomicBool,
    dedicated: OnceLock<CallTarget>,
}

impl Dispatch {
    fn new(callable: Callable, matched: MatchedArguments) -> Self {
        Dispatch {
            demand: CallerDemand::new(callable.wants_caller()),
            split_pending: AtomicBool::new(callable.wants_dedicated_copy()),
            dedicated: OnceLock::new(),
            callable,
            matched,
        }
    }

    /// The body to run: the shared one, or this node's own copy once the
    /// callable asked for one.
    fn target(&self) -> Option<CallTarget> {
        if self.split_pending.load(Ordering::Acquire)
            && self.split_pending.swap(false, Ordering::AcqRel)
        {
            if let Some(copy) = self.callable.dedicated_copy() {
                if self.dedicated.set(copy).is_err() {
                    tracing::trace!(
                        callee = self.callable.label(),
                        "dedicated copy already installed"
                    );
                }
            }
        }
        self.dedicated
            .get()
            .or_else(|| self.callable.target())
            .cloned()
    }

    fn run(
        &self,
        invoker: &Invoker,
        caller: &Activation,
        names: &[Option<Name>],
        values: &[Value],
    ) -> EvalResult {
        let bound = self.matched.bind(&self.callable, names, values);
        let target = self.target();
        invoker.invoke(caller, &self.callable, target.as_ref(), &bound, &self.demand)
    }
}

/// Runs a cached callable with arguments matched once, at installation.
pub(crate) struct FixedTarget {
    dispatch: Dispatch,
}

/// Re-matches on every call. Never replaced.
pub(crate) struct GenericFallback {
    demand: CallerDemand,
}

impl GenericFallback {
    fn new() -> Self {
        GenericFallback {
            demand: CallerDemand::new(false),
        }
    }
}

/// Runs a cached callable for one cached variadic shape.
pub(crate) struct VariadicDispatched {
    signature: VariadicSignature,
    dispatch: Dispatch,
    next: NodeId,
}

pub(crate) enum CacheNode {
    Uninitialized {
        depth: usize,
    },
    ChainLink {
        target: Callable,
        handler: NodeId,
        next: NodeId,
    },
    FixedTarget(FixedTarget),
    GenericFallback(GenericFallback),
    VariadicUninitialized {
        depth: usize,
    },
    VariadicDispatched(VariadicDispatched),
    VariadicGenericFallback(GenericFallback),
}

struct NodeArena {
    nodes: RwLock<Vec<Arc<CacheNode>>>,
}

impl NodeArena {
    fn new() -> Self {
        NodeArena {
            nodes: RwLock::new(vec![Arc::new(CacheNode::Uninitialized { depth: 0 })]),
        }
    }

    fn get(&self, id: NodeId) -> Result<Arc<CacheNode>, InternalError> {
        self.nodes
            .read()
            .get(id.0)
            .cloned()
            .ok_or(InternalError::MissingCacheNode { node: id.0 })
    }

    fn alloc(&self, node: CacheNode) -> NodeId {
        let mut nodes = self.nodes.write();
        nodes.push(Arc::new(node));
        NodeId(nodes.len() - 1)
    }

    /// Replace the node at `id`, returning the installed node.
    fn replace(&self, id: NodeId, node: CacheNode) -> Result<Arc<CacheNode>, InternalError> {
        let node = Arc::new(node);
        let mut nodes = self.nodes.write();
        let slot = nodes
            .get_mut(id.0)
            .ok_or(InternalError::MissingCacheNode { node: id.0 })?;
        *slot = Arc::clone(&node);
        Ok(node)
    }
}

/// Observable shape of a chain, for diagnostics and tests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChainShape {
    pub links: Vec<LinkShape>,
    /// Whether the tail is the generic fallback.
    pub generic: bool,
}

/// One cached callable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkShape {
    pub callee: String,
    /// Cached variadic shapes; 0 for a call without `...`.
    pub variadic_shapes: usize,
    /// Whether the variadic subchain ended in its generic fallback.
    pub variadic_generic: bool,
    /// Whether calls through this link hand the callee a strong caller
    /// handle.
    pub caller_materialized: bool,
}

/// The chain of one call site.
pub(crate) struct CallChain {
    arena: NodeArena,
    arguments: CallArguments,
    source: CallSourceInfo,
    limits: CacheLimits,
    matcher: SharedMatcher,
    invoker: Invoker,
    interner: SharedInterner,
}

impl CallChain {
    pub(crate) fn new(
        arguments: CallArguments,
        source: CallSourceInfo,
        limits: CacheLimits,
        matcher: SharedMatcher,
        invoker: Invoker,
        interner: SharedInterner,
    ) -> Self {
        CallChain {
            arena: NodeArena::new(),
            arguments,
            source,
            limits,
            matcher,
            invoker,
            interner,
        }
    }

    pub(crate) fn source(&self) -> &CallSourceInfo {
        &self.source
    }

    pub(crate) fn interner(&self) -> &SharedInterner {
        &self.interner
    }

    pub(crate) fn execute(&self, caller: &Activation, callable: &Callable) -> EvalResult {
        let mut id = NodeId::ROOT;
        loop {
            let node = self.arena.get(id)?;
            match &*node {
                CacheNode::Uninitialized { depth } => {
                    return self.specialize(id, *depth, caller, callable);
                }
                CacheNode::ChainLink {
                    target,
                    handler,
                    next,
                } => {
                    if Callable::ptr_eq(target, callable) {
                        id = *handler;
                    } else {
                        tracing::trace!(
                            call = self.source.label(),
                            cached = target.label(),
                            "chain link miss"
                        );
                        id = *next;
                    }
                }
                CacheNode::FixedTarget(fixed) => return self.run_fixed(fixed, caller),
                CacheNode::GenericFallback(generic) | CacheNode::VariadicGenericFallback(generic) => {
                    return self.run_generic(generic, caller, callable);
                }
                CacheNode::VariadicUninitialized { .. } | CacheNode::VariadicDispatched(_) => {
                    return self.execute_variadic(id, caller, callable);
                }
            }
        }
    }

    /// Install a link for `callable` in place of the `Uninitialized` node
    /// at `id`, then run through it.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(call = self.source.label(), callee = callable.label(), depth = depth)
    )]
    fn specialize(
        &self,
        id: NodeId,
        depth: usize,
        caller: &Activation,
        callable: &Callable,
    ) -> EvalResult {
        self.arguments.check_names()?;

        if depth >= self.limits.function_depth {
            let node = self
                .arena
                .replace(id, CacheNode::GenericFallback(GenericFallback::new()))?;
            tracing::debug!("call site went generic");
            return match &*node {
                CacheNode::GenericFallback(generic) => self.run_generic(generic, caller, callable),
                _ => Err(InternalError::MissingCacheNode { node: id.0 }.into()),
            };
        }

        let handler = if self.arguments.forwards_variadic() {
            CacheNode::VariadicUninitialized { depth: 0 }
        } else {
            let matched = self.matcher.match_arguments(
                callable,
                self.arguments.static_names(),
                &self.source,
                false,
            )?;
            CacheNode::FixedTarget(FixedTarget {
                dispatch: Dispatch::new(callable.clone(), matched),
            })
        };
        let next = if depth + 1 < self.limits.function_depth {
            CacheNode::Uninitialized { depth: depth + 1 }
        } else {
            CacheNode::GenericFallback(GenericFallback::new())
        };

        let handler = self.arena.alloc(handler);
        let next = self.arena.alloc(next);
        self.arena.replace(
            id,
            CacheNode::ChainLink {
                target: callable.clone(),
                handler,
                next,
            },
        )?;
        tracing::debug!("call site specialized");

        let node = self.arena.get(handler)?;
        match &*node {
            CacheNode::FixedTarget(fixed) => self.run_fixed(fixed, caller),
            _ => self.execute_variadic(handler, caller, callable),
        }
    }

    fn run_fixed(&self, fixed: &FixedTarget, caller: &Activation) -> EvalResult {
        let values = self.arguments.evaluate(caller, &[], &self.interner)?;
        fixed
            .dispatch
            .run(&self.invoker, caller, self.arguments.static_names(), &values)
    }

    fn run_generic(
        &self,
        generic: &GenericFallback,
        caller: &Activation,
        callable: &Callable,
    ) -> EvalResult {
        self.arguments.check_names()?;
        let groups = self.arguments.read_groups(caller)?;
        let names = self.arguments.flattened_names(&groups);
        let matched = self
            .matcher
            .match_arguments(callable, &names, &self.source, true)?;
        let values = self.arguments.evaluate(caller, &groups, &self.interner)?;
        let bound = matched.bind(callable, &names, &values);
        self.invoker
            .invoke(caller, callable, callable.target(), &bound, &generic.demand)
    }

    pub(crate) fn shape(&self) -> ChainShape {
        let mut shape = ChainShape::default();
        let mut id = NodeId::ROOT;
        while let Ok(node) = self.arena.get(id) {
            match &*node {
                CacheNode::ChainLink {
                    target,
                    handler,
                    next,
                } => {
                    shape.links.push(self.link_shape(target, *handler));
                    id = *next;
                }
                CacheNode::GenericFallback(_) => {
                    shape.generic = true;
                    break;
                }
                _ => break,
            }
        }
        shape
    }

    fn link_shape(&self, target: &Callable, handler: NodeId) -> LinkShape {
        let mut link = LinkShape {
            callee: target.label().to_string(),
            variadic_shapes: 0,
            variadic_generic: false,
            caller_materialized: false,
        };
        let mut id = handler;
        while let Ok(node) = self.arena.get(id) {
            match &*node {
                CacheNode::FixedTarget(fixed) => {
                    link.caller_materialized = fixed.dispatch.demand.is_needed();
                    break;
                }
                CacheNode::VariadicDispatched(dispatched) => {
                    link.variadic_shapes += 1;
                    link.caller_materialized |= dispatched.dispatch.demand.is_needed();
                    id = dispatched.next;
                }
                CacheNode::VariadicGenericFallback(_) => {
                    link.variadic_generic = true;
                    break;
                }
                _ => break,
            }
        }
        link
    }
}
