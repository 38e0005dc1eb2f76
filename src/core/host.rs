use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::value::Value;

/// Shared handle to a host object
pub type HostRef = Rc<Host>;

/// Process-unique host identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(u64);

impl HostId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        HostId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
enum HostKind {
    /// A host type; acts as the shared host for class-level capabilities
    Type { name: String },
    /// An instance of a host type
    Instance { of: HostRef },
}

/// An object capability modules are composed onto
///
/// Every host owns a dynamically extensible name -> value field map. Host
/// types are hosts too, so class-level compositions keep their state on
/// the type itself.
pub struct Host {
    id: HostId,
    kind: HostKind,
    fields: RefCell<BTreeMap<String, Value>>,
}

impl Host {
    /// Create a new host type
    pub fn new_type(name: impl Into<String>) -> HostRef {
        Rc::new(Self {
            id: HostId::next(),
            kind: HostKind::Type { name: name.into() },
            fields: RefCell::new(BTreeMap::new()),
        })
    }

    /// Create an instance of `host_type`
    ///
    /// Instantiating an instance creates a sibling of the same type.
    pub fn instantiate(host_type: &HostRef) -> HostRef {
        let of = match &host_type.kind {
            HostKind::Type { .. } => Rc::clone(host_type),
            HostKind::Instance { of } => Rc::clone(of),
        };
        Rc::new(Self {
            id: HostId::next(),
            kind: HostKind::Instance { of },
            fields: RefCell::new(BTreeMap::new()),
        })
    }

    /// Create an instance and seed its fields
    pub fn instantiate_with<I, K, V>(host_type: &HostRef, fields: I) -> HostRef
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let host = Self::instantiate(host_type);
        for (name, value) in fields {
            host.set_field(name, value);
        }
        host
    }

    pub fn id(&self) -> HostId {
        self.id
    }

    pub fn is_type(&self) -> bool {
        matches!(self.kind, HostKind::Type { .. })
    }

    /// The type of an instance; `None` for a host type
    pub fn host_type(&self) -> Option<&HostRef> {
        match &self.kind {
            HostKind::Type { .. } => None,
            HostKind::Instance { of } => Some(of),
        }
    }

    /// Name of the host type (the type's own name for a type)
    pub fn type_name(&self) -> &str {
        match &self.kind {
            HostKind::Type { name } => name,
            HostKind::Instance { of } => of.type_name(),
        }
    }

    /// Read a field; `None` when it was never set
    pub fn field(&self, name: &str) -> Option<Value> {
        self.fields.borrow().get(name).cloned()
    }

    /// Read a field, returning `Value::Nil` when it was never set
    pub fn get_field(&self, name: &str) -> Value {
        self.field(name).unwrap_or_default()
    }

    /// Write a field, overwriting any prior value
    pub fn set_field(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.borrow_mut().insert(name.into(), value.into());
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.borrow().contains_key(name)
    }

    /// Names of all fields currently set, sorted
    pub fn field_names(&self) -> Vec<String> {
        self.fields.borrow().keys().cloned().collect()
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("id", &self.id)
            .field("type", &self.type_name())
            .field("is_type", &self.is_type())
            .field("fields", &self.fields.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_are_dynamically_extensible() {
        let foo_bar = Host::new_type("FooBar");
        let host = Host::instantiate(&foo_bar);

        assert_eq!(host.field("name"), None);
        assert_eq!(host.get_field("name"), Value::Nil);

        host.set_field("name", Value::sym("base"));
        assert_eq!(host.get_field("name"), Value::sym("base"));

        host.set_field("name", Value::sym("foo"));
        assert_eq!(host.get_field("name"), Value::sym("foo"));
        assert_eq!(host.field_names(), vec!["name".to_string()]);
    }

    #[test]
    fn test_instances_have_separate_storage() {
        let foo_bar = Host::new_type("FooBar");
        let first = Host::instantiate_with(&foo_bar, [("name", Value::sym("first"))]);
        let second = Host::instantiate(&foo_bar);

        assert_ne!(first.id(), second.id());
        assert_eq!(second.field("name"), None);
        assert!(!foo_bar.has_field("name"));
        assert_eq!(first.type_name(), "FooBar");
    }

    #[test]
    fn test_instantiate_from_instance_uses_its_type() {
        let foo_bar = Host::new_type("FooBar");
        let first = Host::instantiate(&foo_bar);
        let sibling = Host::instantiate(&first);

        assert!(foo_bar.is_type());
        assert!(!sibling.is_type());
        assert_eq!(sibling.host_type().map(|t| t.id()), Some(foo_bar.id()));
    }
}
