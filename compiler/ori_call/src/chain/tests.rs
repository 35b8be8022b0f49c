#![expect(clippy::unwrap_used, reason = "tests use unwrap for brevity")]

use super::*;
use crate::args::ArgExpr;
use crate::call_site::{CallSite, CalleeExpr};
use ori_frame::{
    CallableFlags, EvalErrorKind, Formal, IntrinsicCall, Invocation, Layout, LayoutKind,
};
use pretty_assertions::assert_eq;

struct Fixture {
    interner: SharedInterner,
    global: Activation,
}

impl Fixture {
    fn new() -> Self {
        let layout = Layout::top_level("global");
        Fixture {
            interner: SharedInterner::default(),
            global: Activation::new(&layout, None).unwrap(),
        }
    }

    fn name(&self, s: &str) -> Name {
        self.interner.intern(s)
    }

    /// `function(x) x + offset`
    fn adder(&self, label: &str, offset: i64) -> Callable {
        let x = self.name("x");
        Callable::builder(self.name(label))
            .label(label)
            .formal(Formal::new(x))
            .closure(&self.global, move |inv: &Invocation| match inv.argument(x)? {
                Value::Int(n) => Ok(Value::int(n + offset)),
                other => Ok(other),
            })
            .unwrap()
    }

    /// A site calling `callable(1)`.
    fn site(&self, callable: &Callable, limits: CacheLimits) -> CallSite {
        CallSite::builder(&self.interner, CalleeExpr::Value(callable.clone().into()))
            .positional(ArgExpr::constant(Value::int(1)))
            .limits(limits)
            .source("f(1)")
            .build()
    }
}

fn link(callee: &str) -> LinkShape {
    LinkShape {
        callee: callee.to_string(),
        variadic_shapes: 0,
        variadic_generic: false,
        caller_materialized: false,
    }
}

#[test]
fn test_fresh_site_has_no_links() {
    let fx = Fixture::new();
    let f = fx.adder("f", 0);
    let site = fx.site(&f, CacheLimits::default());

    assert_eq!(site.shape(), ChainShape::default());
}

#[test]
fn test_first_call_installs_link() {
    let fx = Fixture::new();
    let f = fx.adder("f", 10);
    let site = fx.site(&f, CacheLimits::default());

    assert_eq!(site.execute(&fx.global).unwrap(), Value::int(11));
    assert_eq!(
        site.shape(),
        ChainShape {
            links: vec![link("f")],
            generic: false,
        }
    );
}

#[test]
fn test_repeat_calls_reuse_link() {
    let fx = Fixture::new();
    let f = fx.adder("f", 1);
    let site = fx.site(&f, CacheLimits::default());

    for _ in 0..5 {
        assert_eq!(site.execute(&fx.global).unwrap(), Value::int(2));
    }
    assert_eq!(site.shape().links.len(), 1);
    assert_eq!(f.target().unwrap().calls(), 5);
}

#[test]
fn test_distinct_callees_grow_then_go_generic() {
    let fx = Fixture::new();
    let callees: Vec<_> = (0..3).map(|i| fx.adder(&format!("f{i}"), i)).collect();
    let site = fx.site(&callees[0], CacheLimits::default().with_function_depth(2));

    for (i, callee) in (0_i64..).zip(&callees) {
        assert_eq!(site.execute_with(&fx.global, callee).unwrap(), Value::int(1 + i));
    }
    assert_eq!(
        site.shape(),
        ChainShape {
            links: vec![link("f0"), link("f1")],
            generic: true,
        }
    );

    // Cached links still dispatch; the third callee runs through the fallback.
    for (i, callee) in (0_i64..).zip(&callees) {
        assert_eq!(site.execute_with(&fx.global, callee).unwrap(), Value::int(1 + i));
    }
    assert_eq!(site.shape().links.len(), 2);
}

#[test]
fn test_zero_depth_is_generic_from_the_start() {
    let fx = Fixture::new();
    let f = fx.adder("f", 0);
    let site = fx.site(&f, CacheLimits::default().with_function_depth(0));

    assert_eq!(site.execute(&fx.global).unwrap(), Value::int(1));
    assert_eq!(
        site.shape(),
        ChainShape {
            links: vec![],
            generic: true,
        }
    );
}

#[test]
fn test_match_failure_installs_nothing() {
    let fx = Fixture::new();
    let f = fx.adder("f", 0);
    let site = CallSite::builder(&fx.interner, CalleeExpr::Value(f.into()))
        .named("w", ArgExpr::constant(Value::int(1)))
        .build();

    for _ in 0..2 {
        let err = site.execute(&fx.global).unwrap_err();
        assert_eq!(
            err.kind,
            EvalErrorKind::UnusedArgument {
                name: "w".to_string()
            }
        );
    }
    assert_eq!(site.shape(), ChainShape::default());
}

#[test]
fn test_dedicated_copy_made_once_per_link() {
    let fx = Fixture::new();
    let f = Callable::builder(fx.name("f"))
        .label("f")
        .formal(Formal::new(fx.name("x")))
        .flags(CallableFlags::WANTS_DEDICATED_COPY)
        .closure(&fx.global, |_: &Invocation| Ok(Value::Null))
        .unwrap();
    let first = fx.site(&f, CacheLimits::default());
    let second = fx.site(&f, CacheLimits::default());

    for _ in 0..3 {
        first.execute(&fx.global).unwrap();
        second.execute(&fx.global).unwrap();
    }
    assert_eq!(f.dedicated_copies(), 2);
    assert_eq!(f.target().unwrap().calls(), 0);
}

#[test]
fn test_caller_materialized_after_first_request() {
    let fx = Fixture::new();
    let x = fx.name("x");
    let f = Callable::builder(fx.name("f"))
        .label("f")
        .formal(Formal::new(x))
        .closure(&fx.global, |inv: &Invocation| {
            let materialized = inv.caller_handle().is_materialized();
            inv.caller();
            Ok(Value::bool(materialized))
        })
        .unwrap();
    let site = fx.site(&f, CacheLimits::default());

    assert_eq!(site.execute(&fx.global).unwrap(), Value::bool(false));
    assert!(site.shape().links[0].caller_materialized);
    assert_eq!(site.execute(&fx.global).unwrap(), Value::bool(true));
}

#[test]
fn test_wants_caller_materializes_immediately() {
    let fx = Fixture::new();
    let f = Callable::builder(fx.name("f"))
        .label("f")
        .formal(Formal::new(fx.name("x")))
        .flags(CallableFlags::WANTS_CALLER)
        .closure(&fx.global, |inv: &Invocation| {
            Ok(Value::bool(inv.caller_handle().is_materialized()))
        })
        .unwrap();
    let site = fx.site(&f, CacheLimits::default());

    assert_eq!(site.execute(&fx.global).unwrap(), Value::bool(true));
    assert!(site.shape().links[0].caller_materialized);
}

#[test]
fn test_arena_reports_missing_node() {
    let arena = NodeArena::new();
    let err = arena.get(NodeId(3)).err().unwrap();
    assert_eq!(err, InternalError::MissingCacheNode { node: 3 });

    let id = arena.alloc(CacheNode::Uninitialized { depth: 1 });
    assert_eq!(id, NodeId(1));
    arena
        .replace(id, CacheNode::GenericFallback(GenericFallback::new()))
        .unwrap();
    assert!(matches!(
        &*arena.get(id).unwrap(),
        CacheNode::GenericFallback(_)
    ));
}

#[test]
fn test_arena_replace_rejects_missing_node() {
    let arena = NodeArena::new();
    let err = arena
        .replace(NodeId(2), CacheNode::GenericFallback(GenericFallback::new()))
        .err()
        .unwrap();
    assert_eq!(err, InternalError::MissingCacheNode { node: 2 });
    assert!(arena.get(NodeId(2)).is_err());
}

/// `function(x) x * 100`, or `NULL` unless called straight from the top
/// level.
fn hundredfold(call: &IntrinsicCall<'_>) -> EvalResult {
    if call.caller.depth() != 0 || call.caller.layout().kind() != LayoutKind::TopLevel {
        return Ok(Value::Null);
    }
    match call.arg(0)? {
        Value::Int(n) => Ok(Value::int(n * 100)),
        other => Ok(other),
    }
}

#[test]
fn test_intrinsic_and_closure_share_a_site() {
    let fx = Fixture::new();
    let intrinsic = Callable::builder(fx.name("hundredfold"))
        .label("hundredfold")
        .formal(Formal::new(fx.name("x")))
        .intrinsic(hundredfold);
    let f = fx.adder("f", 10);
    let site = fx.site(&intrinsic, CacheLimits::default());

    for _ in 0..3 {
        assert_eq!(site.execute_with(&fx.global, &intrinsic).unwrap(), Value::int(100));
        assert_eq!(site.execute_with(&fx.global, &f).unwrap(), Value::int(11));
    }
    assert_eq!(
        site.shape(),
        ChainShape {
            links: vec![link("hundredfold"), link("f")],
            generic: false,
        }
    );
    assert!(intrinsic.target().is_none());
    assert_eq!(f.target().unwrap().calls(), 3);
}

#[test]
fn test_runaway_recursion_hits_depth_limit() {
    let fx = Fixture::new();
    let f = fx.name("f");
    let recurse = Callable::builder(f)
        .label("f")
        .closure(&fx.global, move |inv: &Invocation| {
            CallSite::builder(inv.interner(), CalleeExpr::read(f))
                .max_call_depth(50)
                .build()
                .execute(inv.activation())
        })
        .unwrap();
    fx.global.define(f, recurse.into()).unwrap();

    let site = CallSite::builder(&fx.interner, CalleeExpr::read(f))
        .max_call_depth(50)
        .build();
    let err = site.execute(&fx.global).unwrap_err();
    assert_eq!(err.kind, EvalErrorKind::StackOverflow { depth: 51 });
}
