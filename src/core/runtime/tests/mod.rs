//! Tests for composing capabilities onto hosts

use crate::core::capability::{accessor_name, Capability, MethodTable};
use crate::core::error::SandboxError;
use crate::core::host::{Host, HostRef};
use crate::core::runtime::{ComposeOptions, Runtime};
use crate::core::value::Value;

/// Capability whose public `foo` relies on an internal `my_name` helper
pub mod foo {
    use super::*;

    pub struct Methods;

    impl Capability for Methods {
        fn create(_host: &Host) -> Self {
            Methods
        }

        fn declare(methods: &mut MethodTable<Self>) {
            methods
                .define("foo", |cx, _| cx.send("my_name", &[]))
                .define("baz", |_, _| Ok(Value::sym("baz")))
                // internal
                .define("my_name", |_, _| Ok(Value::sym("foo")));
        }
    }
}

/// Same shape as `foo`, with a colliding internal helper
pub mod bar {
    use super::*;

    pub struct Methods;

    impl Capability for Methods {
        fn create(_host: &Host) -> Self {
            Methods
        }

        fn declare(methods: &mut MethodTable<Self>) {
            methods
                .define("bar", |cx, _| cx.send("my_name", &[]))
                .define("baz", |_, _| Ok(Value::sym("baz")))
                // internal
                .define("my_name", |_, _| Ok(Value::sym("bar")));
        }
    }
}

/// Compose `foo` and `bar` onto a fresh `FooBar` type
pub fn foo_bar(options: ComposeOptions) -> (Runtime, HostRef) {
    let mut runtime = Runtime::new();
    let foo_bar = Host::new_type("FooBar");

    runtime
        .compose::<foo::Methods>(&foo_bar, &["foo"], options)
        .expect("compose foo");
    runtime
        .compose::<bar::Methods>(&foo_bar, &["bar"], options)
        .expect("compose bar");

    (runtime, foo_bar)
}

pub fn assert_undeclared(result: crate::core::error::Result<Value>, method: &str) {
    match result {
        Err(SandboxError::UndeclaredMethod { method: name, .. }) => assert_eq!(name, method),
        other => panic!("expected undeclared `{method}`, got {other:?}"),
    }
}

mod lifecycle;
