use crate::core::capability::{Capability, MethodTable};
use crate::core::error::SandboxError;
use crate::core::host::Host;
use crate::core::value::Value;
use crate::register_capability;

/// Keeps a running total in the host's `count` field
///
/// The step size lives in the delegate, so two hosts never share it and the
/// host never sees it as a field.
#[derive(Debug)]
pub struct Counter {
    step: i64,
    calls: u64,
}

impl Counter {
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Capability for Counter {
    fn create(_host: &Host) -> Self {
        Self { step: 1, calls: 0 }
    }

    fn declare(methods: &mut MethodTable<Self>) {
        methods
            .define("increment", |cx, _| {
                cx.state_mut().calls += 1;
                let current = cx.attr("count")?.as_int().unwrap_or(0);
                let step = cx.send("step", &[])?.as_int().unwrap_or(1);
                let next = current.checked_add(step).ok_or_else(|| {
                    SandboxError::InvalidArguments {
                        method: "increment".to_string(),
                        message: format!("count {current} overflows when stepped by {step}"),
                    }
                })?;
                cx.assign("count", next)
            })
            .define("count", |cx, _| {
                Ok(Value::Int(cx.get_field("count").as_int().unwrap_or(0)))
            })
            .define("reset", |cx, _| cx.assign("count", 0i64))
            .define("step_by", |cx, args| {
                let step = args.first().and_then(Value::as_int).ok_or_else(|| {
                    SandboxError::InvalidArguments {
                        method: "step_by".to_string(),
                        message: "expected an integer step".to_string(),
                    }
                })?;
                cx.state_mut().step = step;
                Ok(Value::Int(step))
            })
            // internal
            .define("step", |cx, _| Ok(Value::Int(cx.state().step)));
    }
}

register_capability!(Counter, "counter", "Counts calls in the host's `count` field");
