//! Fixtures shared by the call-site integration tests.

#![allow(dead_code, reason = "each test crate uses a different subset")]
#![allow(clippy::unwrap_used, reason = "Tests can panic")]
#![allow(clippy::disallowed_types, reason = "Closure bodies share call sites through Arc")]

use std::sync::Arc;

use ori_call::{ArgExpr, CacheLimits, CallSite, CalleeExpr};
use ori_frame::{
    Activation, Callable, EvalError, Formal, Invocation, Layout, SharedInterner, Value,
};

pub fn int(value: &Value) -> i64 {
    match value {
        Value::Int(n) => *n,
        other => panic!("expected int, got {other:?}"),
    }
}

/// `function(a, b) a * 10 + b`, under `label`, defined in `global`.
pub fn pair(
    interner: &SharedInterner,
    global: &Activation,
    label: &str,
    formals: [&str; 2],
) -> Callable {
    let [a, b] = formals.map(|f| interner.intern(f));
    Callable::builder(interner.intern(label))
        .label(label)
        .formals([Formal::new(a), Formal::new(b)])
        .closure(global, move |inv: &Invocation| {
            let a = int(&inv.argument(a)?);
            let b = int(&inv.argument(b)?);
            Ok(Value::int(a * 10 + b))
        })
        .unwrap()
}

/// `g <- function(...) f(...)` with `f <- function(x, y, z = 0)`.
pub struct Forwarding {
    pub interner: SharedInterner,
    pub global: Activation,
    pub g: Callable,
    pub inner: Arc<CallSite>,
}

impl Forwarding {
    pub fn new(limits: CacheLimits) -> Self {
        let interner = SharedInterner::default();
        let global = Activation::new(&Layout::top_level("global"), None).unwrap();
        let [x, y, z] = ["x", "y", "z"].map(|n| interner.intern(n));

        let f = Callable::builder(interner.intern("f"))
            .label("f")
            .formals([
                Formal::new(x),
                Formal::new(y),
                Formal::with_default(z, Value::int(0)),
            ])
            .closure(&global, move |inv: &Invocation| {
                let x = int(&inv.argument(x)?);
                let y = int(&inv.argument(y)?);
                let z = int(&inv.argument(z)?);
                Ok(Value::int(x * 100 + y * 10 + z))
            })
            .unwrap();
        global.define(interner.intern("f"), f.into()).unwrap();

        let inner = Arc::new(
            CallSite::builder(&interner, CalleeExpr::read(interner.intern("f")))
                .forward()
                .limits(limits)
                .source("f(...)")
                .build(),
        );
        let body_site = Arc::clone(&inner);
        let g = Callable::builder(interner.intern("g"))
            .label("g")
            .formal(Formal::variadic())
            .closure(&global, move |inv: &Invocation| {
                body_site.execute(inv.activation())
            })
            .unwrap();

        Forwarding {
            interner,
            global,
            g,
            inner,
        }
    }

    /// Call `g` with `(name, value)` arguments.
    pub fn call(&self, args: &[(Option<&str>, i64)]) -> Result<Value, EvalError> {
        let callee = CalleeExpr::Value(self.g.clone().into());
        let mut builder = CallSite::builder(&self.interner, callee);
        for &(name, value) in args {
            let expr = ArgExpr::constant(Value::int(value));
            builder = match name {
                Some(name) => builder.named(name, expr),
                None => builder.positional(expr),
            };
        }
        builder.build().execute(&self.global)
    }
}
