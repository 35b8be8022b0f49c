//! Call sites and environments shared across threads.

#![allow(clippy::unwrap_used, reason = "Tests can panic")]
#![allow(
    clippy::disallowed_types,
    reason = "Closure bodies share call sites through Arc"
)]

use ori_call::{ArgExpr, CacheLimits, CallSite, CalleeExpr};
use ori_frame::{
    Activation, Callable, ContextTable, Formal, Invocation, Layout, LookupCache, SharedInterner,
    Value, PRIMORDIAL_CONTEXT,
};
use pretty_assertions::assert_eq;
use rayon::prelude::*;

mod common;

use common::{int, pair, Forwarding};

#[test]
fn one_site_many_threads() {
    let interner = SharedInterner::default();
    let global = Activation::new(&Layout::top_level("global"), None).unwrap();
    let callees: Vec<Callable> = (0..8)
        .map(|i| pair(&interner, &global, &format!("f{i}"), ["a", "b"]))
        .collect();
    let site = CallSite::builder(&interner, CalleeExpr::Value(Value::Null))
        .positional(ArgExpr::constant(Value::int(3)))
        .positional(ArgExpr::constant(Value::int(4)))
        .build();

    let results: Vec<_> = (0..2_000)
        .into_par_iter()
        .map(|i| site.execute_with(&global, &callees[i % callees.len()]))
        .collect();

    for result in results {
        assert_eq!(result.unwrap(), Value::int(34));
    }
    let shape = site.shape();
    assert!(shape.links.len() <= CacheLimits::default().function_depth);
    assert!(shape.generic);
}

#[test]
fn forwarding_site_many_threads() {
    let fw = Forwarding::new(CacheLimits::default().with_variadic_depth(3));
    let shapes: [&[(Option<&str>, i64)]; 5] = [
        &[(None, 1), (None, 2)],
        &[(Some("x"), 1), (Some("y"), 2)],
        &[(Some("y"), 2), (Some("x"), 1)],
        &[(None, 1), (Some("y"), 2), (None, 3)],
        &[(Some("z"), 3), (None, 1), (None, 2)],
    ];
    let expected = [120, 120, 120, 123, 123];

    (0..1_000).into_par_iter().for_each(|i| {
        let which = i % shapes.len();
        let result = fw.call(shapes[which]).unwrap();
        assert_eq!(result, Value::int(expected[which]));
    });

    let link = &fw.inner.shape().links[0];
    assert!(link.variadic_shapes <= 3);
    assert!(link.variadic_generic);
}

#[test]
fn fanned_out_module_binding_per_context() {
    let interner = SharedInterner::default();
    let module = Activation::new(&Layout::singleton("module"), None).unwrap();
    let n = interner.intern("n");
    let slot = module.define(n, Value::int(0)).unwrap();

    let contexts = ContextTable::global().register(4);

    let reader = Callable::builder(interner.intern("read_n"))
        .label("read_n")
        .formal(Formal::new(interner.intern("k")))
        .closure(&module, {
            let cache = LookupCache::new(n);
            let interner = interner.clone();
            move |inv: &Invocation| {
                let k = int(&inv.argument(inv.interner().intern("k"))?);
                let n = int(&cache.read_or_error(inv.activation(), &interner)?);
                Ok(Value::int(n * 100 + k))
            }
        })
        .unwrap();
    let site = CallSite::builder(&interner, CalleeExpr::Value(reader.into()))
        .positional(ArgExpr::constant(Value::int(7)))
        .build();

    let seen: Vec<_> = contexts
        .clone()
        .into_par_iter()
        .map(|context| {
            let _context = ContextTable::enter(context);
            let value = i64::try_from(context).unwrap();
            module.write_in_context(slot, Value::int(value)).unwrap();
            (value, site.execute(&module).unwrap())
        })
        .collect();

    for (value, result) in seen {
        assert_eq!(result, Value::int(value * 100 + 7));
    }
    assert!(module.is_fanned_out(slot));
    assert_eq!(
        module.read_in_context(slot, PRIMORDIAL_CONTEXT),
        Some(Value::int(0))
    );
    assert_eq!(site.execute(&module).unwrap(), Value::int(7));
}
