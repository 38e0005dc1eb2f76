use crate::core::capability::{Capability, MethodTable};
use crate::core::error::SandboxError;
use crate::core::host::Host;
use crate::core::value::Value;
use crate::register_capability;

/// Maintains a normalized tag list in the host's `tags` field
pub struct Tagging;

impl Capability for Tagging {
    fn create(_host: &Host) -> Self {
        Tagging
    }

    fn declare(methods: &mut MethodTable<Self>) {
        methods
            .define("tag", |cx, args| {
                let mut tags = current_tags(&cx.attr("tags")?);
                for arg in args {
                    let tag = cx.send("normalize", std::slice::from_ref(arg))?;
                    if !tags.contains(&tag) {
                        tags.push(tag);
                    }
                }
                cx.assign("tags", tags)
            })
            .define("tags", |cx, _| Ok(Value::List(current_tags(&cx.get_field("tags")))))
            .define("tagged?", |cx, args| {
                let [tag] = args else {
                    return Err(SandboxError::InvalidArguments {
                        method: "tagged?".to_string(),
                        message: format!("expected 1 argument(s), got {}", args.len()),
                    });
                };
                let tag = cx.send("normalize", std::slice::from_ref(tag))?;
                Ok(Value::Bool(current_tags(&cx.get_field("tags")).contains(&tag)))
            })
            // internal
            .define("normalize", |_, args| {
                let name = args.first().and_then(Value::as_name).unwrap_or_default();
                Ok(Value::sym(name.trim().to_lowercase()))
            });
    }
}

fn current_tags(value: &Value) -> Vec<Value> {
    value.as_list().map(<[Value]>::to_vec).unwrap_or_default()
}

register_capability!(Tagging, "tagging", "Keeps a normalized tag list in the host's `tags` field");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::runtime::{ComposeOptions, Runtime};

    #[test]
    fn test_tagging_normalizes_and_dedupes() {
        let post = Host::new_type("Post");
        let mut runtime = Runtime::new();
        runtime
            .compose::<Tagging>(&post, &["tag", "tags", "tagged?"], ComposeOptions::instance())
            .unwrap();

        let host = Host::instantiate(&post);
        runtime
            .send(&host, "tag", &[Value::from(" Rust "), Value::sym("rust"), Value::from("Mixins")])
            .unwrap();

        assert_eq!(
            host.get_field("tags"),
            Value::List(vec![Value::sym("rust"), Value::sym("mixins")])
        );
        assert_eq!(
            runtime.send(&host, "tagged?", &[Value::from("MIXINS")]).unwrap(),
            Value::Bool(true)
        );
        assert!(runtime
            .send(&host, "normalize", &[Value::from("x")])
            .unwrap_err()
            .is_undeclared_method());
    }

    #[test]
    fn test_tagged_requires_one_argument() {
        let post = Host::new_type("Post");
        let mut runtime = Runtime::new();
        runtime
            .compose::<Tagging>(&post, &["tagged?"], ComposeOptions::instance())
            .unwrap();

        let host = Host::instantiate(&post);
        let err = runtime.send(&host, "tagged?", &[]).unwrap_err();
        assert!(matches!(err, SandboxError::InvalidArguments { .. }));
    }
}
