//! Call sites: the unit the interpreter attaches to each call expression.

use ori_frame::errors::not_callable;
use ori_frame::{Activation, Callable, EvalResult, LookupCache, Name, SharedInterner, Value};

use crate::args::{ArgExpr, ArgSpec, CallArguments};
use crate::chain::{CallChain, ChainShape};
use crate::config::CacheLimits;
use crate::invoker::{Invoker, DEFAULT_MAX_CALL_DEPTH};
use crate::matcher::{ArgumentMatcher, CallSourceInfo, FormalMatcher, SharedMatcher};

/// What a call site calls.
pub enum CalleeExpr {
    /// Whatever `name` resolves to at the time of the call.
    Read(LookupCache),
    /// A fixed value.
    Value(Value),
}

impl CalleeExpr {
    pub fn read(name: Name) -> Self {
        CalleeExpr::Read(LookupCache::new(name))
    }
}

/// One call expression with its specialization chain.
///
/// `CallSite` is shared: any number of threads may execute it at once.
/// The chain grows as new callees and argument shapes are seen, up to the
/// configured [`CacheLimits`].
pub struct CallSite {
    callee: CalleeExpr,
    chain: CallChain,
}

impl CallSite {
    pub fn builder(interner: &SharedInterner, callee: CalleeExpr) -> CallSiteBuilder {
        CallSiteBuilder::new(interner, callee)
    }

    /// Evaluate the callee, then call it from `caller`.
    pub fn execute(&self, caller: &Activation) -> EvalResult {
        let value = match &self.callee {
            CalleeExpr::Read(cache) => cache.read_or_error(caller, self.chain.interner())?,
            CalleeExpr::Value(value) => value.clone(),
        };
        match value.force() {
            Value::Function(callable) => self.chain.execute(caller, &callable),
            other => Err(not_callable(other.type_name())),
        }
    }

    /// Call an already evaluated callee through this site's chain.
    pub fn execute_with(&self, caller: &Activation, callable: &Callable) -> EvalResult {
        self.chain.execute(caller, callable)
    }

    pub fn shape(&self) -> ChainShape {
        self.chain.shape()
    }

    pub fn source(&self) -> &CallSourceInfo {
        self.chain.source()
    }
}

/// Builder for [`CallSite`].
pub struct CallSiteBuilder {
    interner: SharedInterner,
    callee: CalleeExpr,
    args: Vec<ArgSpec>,
    source: CallSourceInfo,
    limits: CacheLimits,
    matcher: Option<SharedMatcher>,
    max_call_depth: usize,
}

impl CallSiteBuilder {
    pub fn new(interner: &SharedInterner, callee: CalleeExpr) -> Self {
        CallSiteBuilder {
            interner: interner.clone(),
            callee,
            args: Vec::new(),
            source: CallSourceInfo::default(),
            limits: CacheLimits::default(),
            matcher: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    #[must_use]
    pub fn arg(mut self, spec: ArgSpec) -> Self {
        self.args.push(spec);
        self
    }

    #[must_use]
    pub fn args(mut self, specs: impl IntoIterator<Item = ArgSpec>) -> Self {
        self.args.extend(specs);
        self
    }

    #[must_use]
    pub fn positional(self, expr: ArgExpr) -> Self {
        self.arg(ArgSpec::positional(expr))
    }

    #[must_use]
    pub fn named(self, name: &str, expr: ArgExpr) -> Self {
        let name = self.interner.intern(name);
        self.arg(ArgSpec::named(name, expr))
    }

    /// Forward the caller's `...` at this position.
    #[must_use]
    pub fn forward(self) -> Self {
        self.arg(ArgSpec::forward())
    }

    #[must_use]
    pub fn source(mut self, label: &str) -> Self {
        self.source = CallSourceInfo::new(label);
        self
    }

    #[must_use]
    pub fn limits(mut self, limits: CacheLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn matcher(mut self, matcher: impl ArgumentMatcher + 'static) -> Self {
        self.matcher = Some(SharedMatcher::new(matcher));
        self
    }

    #[must_use]
    pub fn max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn build(self) -> CallSite {
        let matcher = self
            .matcher
            .unwrap_or_else(|| SharedMatcher::new(FormalMatcher::new(self.interner.clone())));
        let invoker = Invoker::new(self.interner.clone()).with_max_depth(self.max_call_depth);
        CallSite {
            callee: self.callee,
            chain: CallChain::new(
                CallArguments::new(self.args),
                self.source,
                self.limits,
                matcher,
                invoker,
                self.interner,
            ),
        }
    }
}
