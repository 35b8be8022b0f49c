#![expect(clippy::unwrap_used, reason = "tests use unwrap for brevity")]

use super::*;
use crate::{InternalError, Layout, SharedInterner, SharedList};
use pretty_assertions::assert_eq;

fn two_contexts() -> (usize, usize) {
    let range = ContextTable::global().register(2);
    (range.start, range.start + 1)
}

#[test]
fn test_write_in_context_converts_slot() {
    let interner = SharedInterner::default();
    let n = interner.intern("n");
    let (ctx, _) = two_contexts();

    let module = Layout::singleton("module");
    let m = Activation::new(&module, None).unwrap();
    let slot = m.define(n, Value::int(1)).unwrap();
    let info = module.slot(slot).unwrap();

    {
        let _scope = ContextTable::enter(ctx);
        m.write_in_context(slot, Value::int(2)).unwrap();
        assert_eq!(m.read(slot), Some(Value::int(2)));
    }

    assert!(m.is_fanned_out(slot));
    assert!(!info.no_fan_out().is_valid());
    assert!(!info.not_modified_non_locally().is_valid());
    assert!(info.stable().is_none());
    assert_eq!(m.read(slot), Some(Value::int(1)));
    assert_eq!(m.read_in_context(slot, ctx), Some(Value::int(2)));
}

#[test]
fn test_primordial_write_in_context_is_plain_write() {
    let interner = SharedInterner::default();
    let n = interner.intern("n");

    let module = Layout::singleton("module");
    let m = Activation::new(&module, None).unwrap();
    let slot = m.define(n, Value::int(1)).unwrap();
    m.write_in_context(slot, Value::int(2)).unwrap();
    assert!(!m.is_fanned_out(slot));
    assert_eq!(m.read(slot), Some(Value::int(2)));
}

#[test]
fn test_write_in_context_rejects_fresh_scope() {
    let interner = SharedInterner::default();
    let n = interner.intern("n");
    let (ctx, _) = two_contexts();

    let scope = Layout::fresh("scope");
    let s = Activation::new(&scope, None).unwrap();
    let slot = s.define(n, Value::int(1)).unwrap();

    let _context = ContextTable::enter(ctx);
    let err = s.write_in_context(slot, Value::int(2)).unwrap_err();
    assert!(matches!(err, InternalError::NotSingleton { .. }));
}

#[test]
fn test_replicating_immutable_stable_value_keeps_it_shared() {
    let interner = SharedInterner::default();
    let n = interner.intern("n");
    let (a, b) = two_contexts();

    let module = Layout::singleton("module");
    let m = Activation::new(&module, None).unwrap();
    let slot = m.define(n, Value::int(1)).unwrap();

    assert!(!m.fan_out_slot(slot, &[a, b], true).unwrap());
    assert!(!m.is_fanned_out(slot));
    assert!(module.slot(slot).unwrap().no_fan_out().is_valid());
}

#[test]
fn test_replicating_mutable_value_deep_copies() {
    let interner = SharedInterner::default();
    let xs = interner.intern("xs");
    let (a, b) = two_contexts();

    let module = Layout::singleton("module");
    let m = Activation::new(&module, None).unwrap();
    let original = SharedList::new(vec![Value::int(1)]);
    let slot = m.define(xs, Value::List(original.clone())).unwrap();

    assert!(m.fan_out_slot(slot, &[a, b], true).unwrap());

    let Some(Value::List(in_a)) = m.read_in_context(slot, a) else {
        panic!("expected a list in context {a}");
    };
    let Some(Value::List(in_b)) = m.read_in_context(slot, b) else {
        panic!("expected a list in context {b}");
    };
    assert!(!in_a.ptr_eq(&original));
    assert!(!in_a.ptr_eq(&in_b));

    in_a.push(Value::int(2));
    assert_eq!(in_a.len(), 2);
    assert_eq!(in_b.len(), 1);
    assert_eq!(original.len(), 1);
}

#[test]
fn test_fan_out_without_replication_leaves_new_contexts_empty() {
    let interner = SharedInterner::default();
    let n = interner.intern("n");
    let (a, _) = two_contexts();

    let module = Layout::singleton("module");
    let m = Activation::new(&module, None).unwrap();
    let slot = m.define(n, Value::int(1)).unwrap();

    assert!(m.fan_out_slot(slot, &[a], false).unwrap());
    assert_eq!(m.read_in_context(slot, PRIMORDIAL_CONTEXT), Some(Value::int(1)));
    assert_eq!(m.read_in_context(slot, a), None);
}

#[test]
fn test_extending_fan_out_preserves_entries() {
    let interner = SharedInterner::default();
    let n = interner.intern("n");
    let (a, b) = two_contexts();

    let module = Layout::singleton("module");
    let m = Activation::new(&module, None).unwrap();
    let slot = m.define(n, Value::int(1)).unwrap();
    {
        let _scope = ContextTable::enter(a);
        m.write_in_context(slot, Value::int(10)).unwrap();
    }

    assert!(m.fan_out_slot(slot, &[b], true).unwrap());
    assert_eq!(m.read_in_context(slot, PRIMORDIAL_CONTEXT), Some(Value::int(1)));
    assert_eq!(m.read_in_context(slot, a), Some(Value::int(10)));
    assert_eq!(m.read_in_context(slot, b), Some(Value::int(1)));
}

#[test]
fn test_fan_out_all_and_clean() {
    let interner = SharedInterner::default();
    let (a, b) = two_contexts();

    let module = Layout::singleton("module");
    let m = Activation::new(&module, None).unwrap();
    m.define(interner.intern("x"), Value::int(1)).unwrap();
    let ys = m.define(interner.intern("ys"), Value::list(vec![])).unwrap();
    m.define(interner.intern("z"), Value::int(3)).unwrap();

    // Only the mutable binding needs its own copies.
    assert_eq!(m.fan_out_all(&[a, b], true).unwrap(), 1);
    assert!(m.read_in_context(ys, b).is_some());

    m.clean_fan_out(Some(&[b]));
    assert!(m.read_in_context(ys, a).is_some());
    assert!(m.read_in_context(ys, b).is_none());

    m.clean_fan_out(None);
    assert!(m.read_in_context(ys, a).is_none());
    assert!(m.read_in_context(ys, PRIMORDIAL_CONTEXT).is_some());
}

#[test]
fn test_fan_out_rejects_function_activation() {
    let layout = Layout::function("f");
    let activation = Activation::new(&layout, None).unwrap();
    let err = activation.fan_out_all(&[1], true).unwrap_err();
    assert!(matches!(err, InternalError::NotSingleton { .. }));
}

#[test]
fn test_conversion_keeps_latest_primordial_value() {
    let interner = SharedInterner::default();
    let n = interner.intern("n");
    let (ctx, _) = two_contexts();

    let module = Layout::singleton("module");
    let m = Activation::new(&module, None).unwrap();
    let slot = m.define(n, Value::int(1)).unwrap();
    m.write(slot, Value::int(2), false).unwrap();

    {
        let _scope = ContextTable::enter(ctx);
        m.write_in_context(slot, Value::int(10)).unwrap();
    }
    assert_eq!(m.read_in_context(slot, PRIMORDIAL_CONTEXT), Some(Value::int(2)));
    assert_eq!(m.read_in_context(slot, ctx), Some(Value::int(10)));
}

#[test]
fn test_conversion_racing_primordial_writes_loses_none() {
    let interner = SharedInterner::default();
    let n = interner.intern("n");

    for round in 0..20 {
        let (ctx, _) = two_contexts();
        let module = Layout::singleton(&format!("module{round}"));
        let m = Activation::new(&module, None).unwrap();
        let slot = m.define(n, Value::int(0)).unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 1..=200 {
                    m.write(slot, Value::int(i), false).unwrap();
                }
            });
            scope.spawn(|| {
                let _scope = ContextTable::enter(ctx);
                m.write_in_context(slot, Value::int(-1)).unwrap();
            });
        });

        assert!(m.is_fanned_out(slot));
        assert_eq!(m.read_in_context(slot, PRIMORDIAL_CONTEXT), Some(Value::int(200)));
        assert_eq!(m.read_in_context(slot, ctx), Some(Value::int(-1)));
        assert!(module.slot(slot).unwrap().stable().is_none());
    }
}
