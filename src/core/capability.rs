//! Capability modules and the delegates that sandbox them.
//!
//! A capability module is an ordinary Rust type implementing [`Capability`].
//! Its instance is the module's private state; its [`MethodTable`] lists the
//! methods that can be dispatched by name. Each (host, module) pair gets one
//! [`Delegate`] holding that state and a weak back-reference to the host.
//! Methods run against a [`Context`] whose field access always goes to the
//! host, never to the delegate.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::core::error::{Result, SandboxError};
use crate::core::host::{Host, HostRef};
use crate::core::naming;
use crate::core::value::Value;

/// Operations every delegate answers to before consulting the module's own table
pub const BUILTIN_METHODS: [&str; 4] = ["attach", "host", "get_field", "set_field"];

/// Returns true when `name` is one of the four delegate built-ins
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_METHODS.contains(&name)
}

/// A method implementation dispatched by name on a delegate
pub type Method<C> = fn(&mut Context<'_, C>, &[Value]) -> Result<Value>;

/// A reusable bundle of methods with private per-host state
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct Methods;
///
/// impl Capability for Methods {
///     fn create(_host: &Host) -> Self {
///         Methods
///     }
///
///     fn declare(methods: &mut MethodTable<Self>) {
///         methods
///             .define("foo", |cx, _| cx.send("my_name", &[]))
///             .define("my_name", |_, _| Ok(Value::sym("foo")));
///     }
/// }
/// ```
pub trait Capability: Sized + 'static {
    /// Identity of the module, also the source of its accessor name
    fn qualified_name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Build the private state for a delegate attached to `host`
    ///
    /// The host is only borrowed here; the delegate keeps a weak reference.
    fn create(host: &Host) -> Self;

    /// Register every method of the module, public and internal alike
    fn declare(methods: &mut MethodTable<Self>);
}

/// Name of the implicit accessor installed for `C`
pub fn accessor_name<C: Capability>() -> String {
    naming::accessor_name(C::qualified_name())
}

/// Declared method names of `C`, in declaration order
pub fn declared_names<C: Capability>() -> Vec<String> {
    MethodTable::<C>::build().names().map(str::to_string).collect()
}

/// Methods a capability module declares, in declaration order
pub struct MethodTable<C> {
    methods: Vec<(String, Method<C>)>,
}

impl<C: Capability> MethodTable<C> {
    pub fn new() -> Self {
        Self {
            methods: Vec::new(),
        }
    }

    /// Build the table by running the module's declaration
    pub fn build() -> Self {
        let mut table = Self::new();
        C::declare(&mut table);
        table
    }

    /// Declare a method; redeclaring a name replaces its implementation
    pub fn define(&mut self, name: impl Into<String>, method: Method<C>) -> &mut Self {
        let name = name.into();
        match self.methods.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = method,
            None => self.methods.push((name, method)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<Method<C>> {
        self.methods
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, method)| *method)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.iter().map(|(name, _)| name.as_str())
    }

    /// Declared names that lose to a built-in of the same name
    pub fn shadowed_builtins(&self) -> Vec<&str> {
        self.names().filter(|name| is_builtin(name)).collect()
    }

    /// Names exposed when a composition lists none: everything but the built-ins
    pub fn public_surface(&self) -> Vec<String> {
        self.names()
            .filter(|name| !is_builtin(name))
            .map(str::to_string)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl<C: Capability> Default for MethodTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-(host, module) isolation object
///
/// Holds the module's private state and a non-owning reference to its host.
/// It never keeps copies of host fields.
pub struct Delegate<C: Capability> {
    state: C,
    host: Weak<Host>,
    methods: Rc<MethodTable<C>>,
}

impl<C: Capability> Delegate<C> {
    /// Construct a delegate bound to `host`
    pub fn attach(host: &HostRef) -> Self {
        Self::with_table(host, Rc::new(MethodTable::build()))
    }

    pub(crate) fn with_table(host: &HostRef, methods: Rc<MethodTable<C>>) -> Self {
        Self {
            state: C::create(host),
            host: Rc::downgrade(host),
            methods,
        }
    }

    pub fn state(&self) -> &C {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut C {
        &mut self.state
    }

    /// The host this delegate is bound to, if it is still alive
    pub fn host(&self) -> Option<HostRef> {
        self.host.upgrade()
    }

    /// Read `name` from the host's fields; `Nil` when unset or detached
    pub fn get_field(&self, name: &str) -> Value {
        self.host()
            .map(|host| host.get_field(name))
            .unwrap_or_default()
    }

    /// Write `name` into the host's fields
    pub fn set_field(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let host = self.live_host()?;
        host.set_field(name, value);
        Ok(())
    }

    /// Dispatch `name` with the built-in, declared, then field-access tiers
    pub fn send(&mut self, name: &str, args: &[Value]) -> Result<Value> {
        let host = self.live_host()?;
        let mut cx = Context {
            state: &mut self.state,
            host: &host,
            methods: &*self.methods,
        };
        cx.send(name, args)
    }

    fn live_host(&self) -> Result<HostRef> {
        self.host().ok_or_else(|| SandboxError::Detached {
            module: C::qualified_name().to_string(),
        })
    }
}

impl<C: Capability> fmt::Debug for Delegate<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegate")
            .field("module", &C::qualified_name())
            .field("host", &self.host().map(|host| host.id()))
            .finish()
    }
}

/// View a running method has of its delegate and host
pub struct Context<'a, C> {
    state: &'a mut C,
    host: &'a HostRef,
    methods: &'a MethodTable<C>,
}

impl<'a, C: Capability> Context<'a, C> {
    /// Private module state, invisible to the host
    pub fn state(&self) -> &C {
        &*self.state
    }

    pub fn state_mut(&mut self) -> &mut C {
        &mut *self.state
    }

    /// The host the current call was forwarded from
    pub fn host(&self) -> &HostRef {
        self.host
    }

    /// Read a host field, `Nil` when unset
    pub fn get_field(&self, name: &str) -> Value {
        self.host.get_field(name)
    }

    /// Write a host field, overwriting any prior value
    pub fn set_field(&self, name: &str, value: impl Into<Value>) {
        self.host.set_field(name, value);
    }

    /// Attribute-style read, same as [`Context::get_field`] through dispatch
    pub fn attr(&mut self, name: &str) -> Result<Value> {
        self.send(name, &[])
    }

    /// Attribute-style write (`name=`) through dispatch
    pub fn assign(&mut self, name: &str, value: impl Into<Value>) -> Result<Value> {
        self.send(&format!("{name}="), &[value.into()])
    }

    /// Dispatch a message on this delegate
    ///
    /// Built-ins win, then the module's declared methods, then field access:
    /// `name=` with one argument writes the host field, any other name with
    /// no arguments reads it. Everything else is an undeclared method.
    pub fn send(&mut self, name: &str, args: &[Value]) -> Result<Value> {
        if let Some(result) = self.send_builtin(name, args) {
            return result;
        }

        if let Some(method) = self.methods.get(name) {
            return method(self, args);
        }

        match (name.strip_suffix('='), args) {
            (Some(field), [value]) if !field.is_empty() => {
                self.set_field(field, value.clone());
                Ok(value.clone())
            }
            (None, []) => Ok(self.get_field(name)),
            _ => Err(SandboxError::undeclared(
                format!("{} delegate", naming::short_name(C::qualified_name())),
                name,
            )),
        }
    }

    fn send_builtin(&mut self, name: &str, args: &[Value]) -> Option<Result<Value>> {
        let result = match name {
            "host" => expect_arity(name, args, 0).map(|_| Value::Host(self.host.clone())),
            "get_field" => expect_arity(name, args, 1)
                .and_then(|_| field_name(name, &args[0]))
                .map(|field| self.get_field(field)),
            "set_field" => expect_arity(name, args, 2)
                .and_then(|_| field_name(name, &args[0]))
                .map(|field| {
                    self.set_field(field, args[1].clone());
                    args[1].clone()
                }),
            "attach" => expect_arity(name, args, 1).and_then(|_| match &args[0] {
                Value::Host(host) => Ok(Value::Delegate(DelegateHandle::new(
                    Delegate::<C>::with_table(host, Rc::new(MethodTable::build())),
                ))),
                other => Err(SandboxError::InvalidArguments {
                    method: name.to_string(),
                    message: format!("expected a host, got {}", other.type_name()),
                }),
            }),
            _ => return None,
        };
        Some(result)
    }
}

fn expect_arity(method: &str, args: &[Value], expected: usize) -> Result<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(SandboxError::InvalidArguments {
            method: method.to_string(),
            message: format!("expected {expected} argument(s), got {}", args.len()),
        })
    }
}

fn field_name<'v>(method: &str, value: &'v Value) -> Result<&'v str> {
    value.as_name().ok_or_else(|| SandboxError::InvalidArguments {
        method: method.to_string(),
        message: format!("field name must be a string or symbol, got {}", value.type_name()),
    })
}

/// Object-safe view of a `Delegate<C>` used by the registry
pub(crate) trait ErasedDelegate {
    fn send(&mut self, name: &str, args: &[Value]) -> Result<Value>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<C: Capability> ErasedDelegate for Delegate<C> {
    fn send(&mut self, name: &str, args: &[Value]) -> Result<Value> {
        Delegate::send(self, name, args)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Shared, type-erased handle to a delegate
///
/// This is what the implicit accessor returns. Clones refer to the same
/// delegate.
#[derive(Clone)]
pub struct DelegateHandle {
    inner: Rc<RefCell<dyn ErasedDelegate>>,
    module: &'static str,
    module_id: TypeId,
    host: Weak<Host>,
}

impl DelegateHandle {
    pub fn new<C: Capability>(delegate: Delegate<C>) -> Self {
        let host = delegate.host.clone();
        Self {
            inner: Rc::new(RefCell::new(delegate)),
            module: C::qualified_name(),
            module_id: TypeId::of::<C>(),
            host,
        }
    }

    /// Qualified name of the capability module behind this handle
    pub fn module_name(&self) -> &'static str {
        self.module
    }

    pub fn is<C: Capability>(&self) -> bool {
        self.module_id == TypeId::of::<C>()
    }

    pub fn host(&self) -> Option<HostRef> {
        self.host.upgrade()
    }

    pub(crate) fn is_orphaned(&self) -> bool {
        self.host.strong_count() == 0
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Dispatch directly on the delegate, bypassing the host's exposure list
    pub fn send(&self, name: &str, args: &[Value]) -> Result<Value> {
        let mut delegate = self
            .inner
            .try_borrow_mut()
            .map_err(|_| SandboxError::Reentrant {
                module: self.module.to_string(),
            })?;
        delegate.send(name, args)
    }

    /// Inspect the typed delegate; `None` if `C` is not this handle's module
    /// or the delegate is currently running
    pub fn with<C: Capability, R>(&self, f: impl FnOnce(&Delegate<C>) -> R) -> Option<R> {
        let delegate = self.inner.try_borrow().ok()?;
        delegate.as_any().downcast_ref::<Delegate<C>>().map(f)
    }

    /// Mutate the typed delegate; `None` under the same conditions as [`DelegateHandle::with`]
    pub fn with_mut<C: Capability, R>(
        &self,
        f: impl FnOnce(&mut Delegate<C>) -> R,
    ) -> Option<R> {
        let mut delegate = self.inner.try_borrow_mut().ok()?;
        delegate.as_any_mut().downcast_mut::<Delegate<C>>().map(f)
    }
}

impl fmt::Debug for DelegateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateHandle")
            .field("module", &self.module)
            .field("host", &self.host().map(|host| host.id()))
            .finish()
    }
}
