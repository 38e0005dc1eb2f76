//! Lazy construction, memoization and release of delegates

use super::*;

/// Keeps private per-delegate state so fresh delegates are observable
mod tally {
    use super::*;

    pub struct Methods {
        pub calls: i64,
    }

    impl Capability for Methods {
        fn create(_host: &Host) -> Self {
            Self { calls: 0 }
        }

        fn declare(methods: &mut MethodTable<Self>) {
            methods
                .define("call", |cx, _| {
                    cx.state_mut().calls += 1;
                    Ok(Value::Int(cx.state().calls))
                })
                .define("again", |cx, _| match cx.get_field("self_delegate") {
                    Value::Delegate(handle) => handle.send("call", &[]),
                    _ => Ok(Value::Nil),
                });
        }
    }
}

fn composed() -> (Runtime, HostRef) {
    let mut runtime = Runtime::new();
    let widget = Host::new_type("Widget");
    runtime
        .compose::<tally::Methods>(&widget, &["call", "again"], ComposeOptions::instance())
        .unwrap();
    (runtime, widget)
}

#[test]
fn test_delegate_is_created_lazily() {
    let (mut runtime, widget) = composed();
    let object = Host::instantiate(&widget);

    assert_eq!(runtime.delegate_count(), 0);
    runtime.send(&object, "call", &[]).unwrap();
    assert_eq!(runtime.delegate_count(), 1);
}

#[test]
fn test_accessor_returns_memoized_delegate() {
    let (mut runtime, widget) = composed();
    let object = Host::instantiate(&widget);
    let accessor = accessor_name::<tally::Methods>();
    assert!(accessor.ends_with("__tally__methods"));

    let Value::Delegate(first) = runtime.send(&object, &accessor, &[]).unwrap() else {
        panic!("accessor should return a delegate");
    };
    let Value::Delegate(second) = runtime.send(&object, &accessor, &[]).unwrap() else {
        panic!("accessor should return a delegate");
    };

    assert!(first.ptr_eq(&second));
    assert!(first.ptr_eq(&runtime.delegate::<tally::Methods>(&object).unwrap()));
    assert_eq!(runtime.delegate_count(), 1);
}

#[test]
fn test_state_persists_across_calls() {
    let (mut runtime, widget) = composed();
    let object = Host::instantiate(&widget);

    runtime.send(&object, "call", &[]).unwrap();
    assert_eq!(runtime.send(&object, "call", &[]).unwrap(), Value::Int(2));
    assert!(object.field_names().is_empty());
}

#[test]
fn test_typed_delegate_requires_composition() {
    let (mut runtime, _widget) = composed();
    let stranger = Host::instantiate(&Host::new_type("Stranger"));

    let err = runtime.delegate::<tally::Methods>(&stranger).unwrap_err();
    assert!(err.is_undeclared_method());
}

#[test]
fn test_detach_builds_fresh_delegate() {
    let (mut runtime, widget) = composed();
    let object = Host::instantiate(&widget);

    runtime.send(&object, "call", &[]).unwrap();
    runtime.send(&object, "call", &[]).unwrap();
    assert!(runtime.detach::<tally::Methods>(&object));
    assert!(!runtime.detach::<tally::Methods>(&object));

    assert_eq!(runtime.send(&object, "call", &[]).unwrap(), Value::Int(1));
}

#[test]
fn test_release_and_sweep() {
    let (mut runtime, widget) = composed();
    let kept = Host::instantiate(&widget);
    let released = Host::instantiate(&widget);
    let dropped = Host::instantiate(&widget);

    for host in [&kept, &released, &dropped] {
        runtime.send(host, "call", &[]).unwrap();
    }
    assert_eq!(runtime.delegate_count(), 3);

    assert_eq!(runtime.release(&released), 1);
    drop(dropped);
    assert_eq!(runtime.sweep(), 1);
    assert_eq!(runtime.delegate_count(), 1);
}

#[test]
fn test_reentrant_call_is_an_error() {
    let (mut runtime, widget) = composed();
    let object = Host::instantiate(&widget);
    let handle = runtime.delegate::<tally::Methods>(&object).unwrap();
    object.set_field("self_delegate", Value::Delegate(handle));

    let err = runtime.send(&object, "again", &[]).unwrap_err();
    assert!(matches!(err, SandboxError::Reentrant { .. }));
}

#[test]
fn test_handles_outlive_detach() {
    let (mut runtime, widget) = composed();
    let object = Host::instantiate(&widget);
    let handle = runtime.delegate::<tally::Methods>(&object).unwrap();

    runtime.detach::<tally::Methods>(&object);
    assert_eq!(handle.send("call", &[]).unwrap(), Value::Int(1));
    assert_eq!(handle.with::<tally::Methods, _>(|d| d.state().calls), Some(1));
}

#[test]
fn test_delegates_of_dropped_hosts_are_reclaimed() {
    let (mut runtime, widget) = composed();

    for _ in 0..100 {
        let temporary = Host::instantiate(&widget);
        runtime.send(&temporary, "call", &[]).unwrap();
    }

    assert_eq!(runtime.delegate_count(), 0);
    // Creation already swept most of them
    assert!(runtime.sweep() < 100);
    assert_eq!(runtime.sweep(), 0);
}

#[test]
fn test_module_state_cannot_keep_host_alive() {
    let (mut runtime, widget) = composed();
    let object = Host::instantiate(&widget);
    let handle = runtime.delegate::<tally::Methods>(&object).unwrap();
    let weak = std::rc::Rc::downgrade(&object);

    drop(object);

    assert!(weak.upgrade().is_none());
    assert!(handle.host().is_none());
    assert!(matches!(
        handle.send("call", &[]),
        Err(SandboxError::Detached { .. })
    ));
}

