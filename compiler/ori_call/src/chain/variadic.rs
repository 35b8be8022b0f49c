//! The variadic subchain behind a link whose call forwards `...`.
//!
//! The flattened argument names are only known once the caller's `...` is
//! read, so matching is cached per [`VariadicSignature`] rather than per
//! callee.

use ori_frame::{Activation, Callable, EvalResult, InternalError, VariadicGroup};

use super::{CacheNode, CallChain, Dispatch, GenericFallback, NodeId, VariadicDispatched};
use crate::args::VariadicSignature;

impl CallChain {
    pub(super) fn execute_variadic(
        &self,
        start: NodeId,
        caller: &Activation,
        callable: &Callable,
    ) -> EvalResult {
        let groups = self.arguments.read_groups(caller)?;
        let signature = VariadicSignature::new(self.arguments.flattened_names(&groups));

        let mut id = start;
        loop {
            let node = self.arena.get(id)?;
            match &*node {
                CacheNode::VariadicDispatched(dispatched) => {
                    if dispatched.signature == signature {
                        let values = self.arguments.evaluate(caller, &groups, &self.interner)?;
                        return dispatched.dispatch.run(
                            &self.invoker,
                            caller,
                            signature.names(),
                            &values,
                        );
                    }
                    id = dispatched.next;
                }
                CacheNode::VariadicUninitialized { depth } => {
                    return self.grow(id, *depth, signature, &groups, caller, callable);
                }
                CacheNode::VariadicGenericFallback(generic) => {
                    return self.run_generic(generic, caller, callable);
                }
                _ => return Err(InternalError::MissingCacheNode { node: id.0 }.into()),
            }
        }
    }

    /// Cache `signature` in place of the `VariadicUninitialized` node at
    /// `id`, then run through it.
    fn grow(
        &self,
        id: NodeId,
        depth: usize,
        signature: VariadicSignature,
        groups: &[VariadicGroup],
        caller: &Activation,
        callable: &Callable,
    ) -> EvalResult {
        if depth >= self.limits.variadic_depth {
            let node = self
                .arena
                .replace(id, CacheNode::VariadicGenericFallback(GenericFallback::new()))?;
            tracing::debug!(
                call = self.source.label(),
                callee = callable.label(),
                "variadic subchain went generic"
            );
            return match &*node {
                CacheNode::VariadicGenericFallback(generic) => {
                    self.run_generic(generic, caller, callable)
                }
                _ => Err(InternalError::MissingCacheNode { node: id.0 }.into()),
            };
        }

        let matched =
            self.matcher
                .match_arguments(callable, signature.names(), &self.source, false)?;
        let next = if depth + 1 < self.limits.variadic_depth {
            CacheNode::VariadicUninitialized { depth: depth + 1 }
        } else {
            CacheNode::VariadicGenericFallback(GenericFallback::new())
        };
        let next = self.arena.alloc(next);
        let node = self.arena.replace(
            id,
            CacheNode::VariadicDispatched(VariadicDispatched {
                signature,
                dispatch: Dispatch::new(callable.clone(), matched),
                next,
            }),
        )?;
        tracing::debug!(
            call = self.source.label(),
            callee = callable.label(),
            depth,
            "variadic shape cached"
        );

        let CacheNode::VariadicDispatched(dispatched) = &*node else {
            return Err(InternalError::MissingCacheNode { node: id.0 }.into());
        };
        let values = self.arguments.evaluate(caller, groups, &self.interner)?;
        dispatched
            .dispatch
            .run(&self.invoker, caller, dispatched.signature.names(), &values)
    }
}
