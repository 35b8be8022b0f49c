#![expect(clippy::unwrap_used, reason = "tests use unwrap for brevity")]

use super::*;
use crate::{ActiveBinding, Layout, SharedInterner};
use pretty_assertions::assert_eq;

#[test]
fn test_siblings_share_stable_value() {
    let interner = SharedInterner::default();
    let n = interner.intern("n");

    let module = Layout::singleton("module");
    let m = Activation::new(&module, None).unwrap();
    m.define(n, Value::int(10)).unwrap();

    let left = Activation::new(&Layout::function("left"), Some(&m)).unwrap();
    let right = Activation::new(&Layout::function("right"), Some(&m)).unwrap();

    let (Some(LookupResult::StableValue { stable: a, .. }), Some(LookupResult::StableValue { stable: b, .. })) =
        (resolve(&left, n), resolve(&right, n))
    else {
        panic!("expected stable values");
    };
    assert!(SharedStable::ptr_eq(&a, &b));
    assert_eq!(a.value(), Some(&Value::int(10)));
}

#[test]
fn test_resolve_is_memoized_per_layout() {
    let interner = SharedInterner::default();
    let n = interner.intern("n");

    let module = Layout::singleton("module");
    let m = Activation::new(&module, None).unwrap();
    m.define(n, Value::int(1)).unwrap();
    let inner = Layout::function("inner");
    let first = Activation::new(&inner, Some(&m)).unwrap();
    let second = Activation::new(&inner, Some(&m)).unwrap();

    let a = resolve(&first, n).unwrap();
    let b = resolve(&second, n).unwrap();
    assert!(Guard::ptr_eq(a.guard(), b.guard()));
}

#[test]
fn test_unbound_until_defined() {
    let interner = SharedInterner::default();
    let n = interner.intern("n");

    let global = Layout::top_level("global");
    let g = Activation::new(&global, None).unwrap();
    let inner = Activation::new(&Layout::function("inner"), Some(&g)).unwrap();

    let unbound = resolve(&inner, n).unwrap();
    assert_eq!(unbound.read(), Resolved::Unbound);

    g.define(n, Value::int(3)).unwrap();
    assert!(!unbound.is_valid());
    assert_eq!(unbound.read(), Resolved::NoInformation);
    assert_eq!(resolve(&inner, n).unwrap().read(), Resolved::Value(Value::int(3)));
}

#[test]
fn test_empty_tracked_slot_is_walked_past() {
    let interner = SharedInterner::default();
    let n = interner.intern("n");

    let global = Layout::top_level("global");
    let g = Activation::new(&global, None).unwrap();
    g.define(n, Value::int(1)).unwrap();
    let module = Layout::singleton("module");
    let m = Activation::new(&module, Some(&g)).unwrap();
    module.find_or_add_slot(n);

    let result = resolve(&m, n).unwrap();
    assert_eq!(result.read(), Resolved::Value(Value::int(1)));

    // Filling the slot makes it visible.
    m.define(n, Value::int(2)).unwrap();
    assert!(!result.is_valid());
    assert_eq!(resolve(&m, n).unwrap().read(), Resolved::Value(Value::int(2)));
}

#[test]
fn test_untracked_singleton_binding_is_bound_at() {
    let interner = SharedInterner::default();
    let n = interner.intern("n");

    let module = Layout::singleton("module");
    let m = Activation::new(&module, None).unwrap();
    let slot = m.define(n, Value::int(1)).unwrap();
    m.write(slot, Value::int(2), false).unwrap();
    m.write(slot, Value::int(3), false).unwrap();

    let result = resolve(&m, n).unwrap();
    assert!(matches!(result, LookupResult::BoundAt { slot: 0, .. }));
    assert_eq!(result.read(), Resolved::Value(Value::int(3)));

    m.write(slot, Value::int(4), false).unwrap();
    assert!(result.is_valid());
    assert_eq!(result.read(), Resolved::Value(Value::int(4)));
}

#[test]
fn test_function_local_is_not_summarized() {
    let interner = SharedInterner::default();
    let n = interner.intern("n");

    let layout = Layout::function("f");
    let activation = Activation::new(&layout, None).unwrap();
    activation.define(n, Value::int(5)).unwrap();

    assert!(resolve(&activation, n).is_none());
    assert_eq!(lookup_dynamic(&activation, n), Some(Value::int(5)));
}

#[test]
fn test_lookup_dynamic_skips_empty_slots() {
    let interner = SharedInterner::default();
    let n = interner.intern("n");

    let module = Layout::singleton("module");
    let m = Activation::new(&module, None).unwrap();
    m.define(n, Value::int(1)).unwrap();
    let layout = Layout::function("f");
    layout.find_or_add_slot(n);
    let activation = Activation::new(&layout, Some(&m)).unwrap();

    assert_eq!(lookup_dynamic(&activation, n), Some(Value::int(1)));
}

#[test]
fn test_lookup_cache_follows_writes() {
    let interner = SharedInterner::default();
    let n = interner.intern("n");

    let module = Layout::singleton("module");
    let m = Activation::new(&module, None).unwrap();
    let inner = Activation::new(&Layout::function("inner"), Some(&m)).unwrap();
    let cache = LookupCache::new(n);

    let err = cache.read_or_error(&inner, &interner).unwrap_err();
    assert_eq!(err.message, "object `n` not found");

    let slot = m.define(n, Value::int(1)).unwrap();
    assert_eq!(cache.read(&inner), Some(Value::int(1)));
    for value in 2..6 {
        m.write(slot, Value::int(value), false).unwrap();
        assert_eq!(cache.read(&inner), Some(Value::int(value)));
    }
    assert!(matches!(cache.cached(), Some(LookupResult::BoundAt { .. })));
}

#[test]
fn test_lookup_cache_forces_active_binding() {
    let interner = SharedInterner::default();
    let n = interner.intern("n");

    let module = Layout::singleton("module");
    let m = Activation::new(&module, None).unwrap();
    m.set_active_binding(n, ActiveBinding::new(|| Value::int(42)))
        .unwrap();

    let cache = LookupCache::new(n);
    assert_eq!(cache.read(&m), Some(Value::int(42)));
}

#[test]
fn test_removed_binding_falls_back_outward() {
    let interner = SharedInterner::default();
    let n = interner.intern("n");

    let global = Layout::top_level("global");
    let g = Activation::new(&global, None).unwrap();
    g.define(n, Value::int(1)).unwrap();
    let module = Layout::singleton("module");
    let m = Activation::new(&module, Some(&g)).unwrap();
    m.define(n, Value::int(2)).unwrap();

    let cache = LookupCache::new(n);
    assert_eq!(cache.read(&m), Some(Value::int(2)));
    assert!(m.remove(n));
    assert!(!m.remove(interner.intern("missing")));
    assert_eq!(cache.read(&m), Some(Value::int(1)));
}
