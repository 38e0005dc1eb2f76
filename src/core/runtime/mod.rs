//! Composition of capability modules onto hosts and dispatch through forwarders.

use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use tracing::{debug, warn};

use crate::config::{ConflictPolicy, SandboxSettings};
use crate::core::auto_register::CapabilityDescriptor;
use crate::core::capability::{accessor_name, Capability, DelegateHandle, MethodTable};
use crate::core::error::{Result, SandboxError};
use crate::core::host::{HostId, HostRef};
use crate::core::naming;
use crate::core::registry::{factory_for, DelegateFactory, DelegateRegistry};
use crate::core::value::Value;

#[cfg(test)]
mod tests;

/// Where a composition installs its forwarders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForwardingTarget {
    /// A single host; for a host type this is class-level composition
    Object(HostId),
    /// Every instance of a host type
    InstancesOf(HostId),
}

impl fmt::Display for ForwardingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardingTarget::Object(id) => write!(f, "object {id}"),
            ForwardingTarget::InstancesOf(id) => write!(f, "instances of {id}"),
        }
    }
}

/// Options accepted by [`Runtime::compose`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComposeOptions {
    /// Forward through the host's type, which then holds the shared state
    pub class: bool,
}

impl ComposeOptions {
    pub fn instance() -> Self {
        Self { class: false }
    }

    pub fn class() -> Self {
        Self { class: true }
    }
}

/// Summary of an installed composition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composition {
    pub module: &'static str,
    pub target: ForwardingTarget,
    pub accessor: String,
    pub exposed: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForwarderKind {
    Method,
    Accessor,
}

#[derive(Clone)]
struct Forwarder {
    module: TypeId,
    module_name: &'static str,
    kind: ForwarderKind,
    factory: DelegateFactory,
}

/// Owns every forwarder table and the delegate registry
///
/// Single-threaded: hosts and delegates are `Rc`-based, so a runtime cannot
/// leave the thread that created it.
#[derive(Default)]
pub struct Runtime {
    settings: SandboxSettings,
    forwarders: HashMap<ForwardingTarget, BTreeMap<String, Forwarder>>,
    /// Type of every instance that carries its own forwarders
    instance_types: HashMap<HostId, HostId>,
    delegates: DelegateRegistry,
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: SandboxSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &SandboxSettings {
        &self.settings
    }

    /// Compose capability `C` onto `host`, exposing `names`
    ///
    /// An empty `names` exposes every method `C` declares except the
    /// built-ins. The implicit accessor is always installed. Either every
    /// forwarder is installed or, on error, none is.
    pub fn compose<C: Capability>(
        &mut self,
        host: &HostRef,
        names: &[&str],
        options: ComposeOptions,
    ) -> Result<Composition> {
        let module = C::qualified_name();
        let table = MethodTable::<C>::build();

        let shadowed = table.shadowed_builtins();
        if !shadowed.is_empty() {
            if self.settings.reject_builtin_shadowing {
                return Err(SandboxError::Composition(format!(
                    "{module} declares built-in name(s) {}",
                    shadowed.join(", ")
                )));
            }
            warn!(
                "{module} declares {}; the built-in operation takes priority",
                shadowed.join(", ")
            );
        }

        let exposed = if names.is_empty() {
            table.public_surface()
        } else {
            validate_names(module, names)?
        };

        let target = Self::forwarding_target(host, options);
        let accessor = accessor_name::<C>();
        let module_id = TypeId::of::<C>();

        let entries: Vec<(String, ForwarderKind)> = exposed
            .iter()
            .map(|name| (name.clone(), ForwarderKind::Method))
            .chain(std::iter::once((accessor.clone(), ForwarderKind::Accessor)))
            .collect();

        let instance_of = match target {
            ForwardingTarget::Object(id) if id == host.id() => {
                host.host_type().map(|host_type| host_type.id())
            }
            _ => None,
        };
        self.check_conflicts(target, instance_of, module_id, module, &entries)?;

        if let Some(type_id) = instance_of {
            self.instance_types.insert(host.id(), type_id);
        }
        let table = self.forwarders.entry(target).or_default();
        for (name, kind) in entries {
            table.insert(
                name,
                Forwarder {
                    module: module_id,
                    module_name: module,
                    kind,
                    factory: factory_for::<C>(),
                },
            );
        }

        debug!(
            "Composed {} onto {} {} ({target}): {}",
            naming::short_name(module),
            host.type_name(),
            host.id(),
            exposed.join(", ")
        );

        Ok(Composition {
            module,
            target,
            accessor,
            exposed,
        })
    }

    /// Compose an auto-registered capability by its registered or qualified name
    pub fn compose_registered(
        &mut self,
        host: &HostRef,
        module: &str,
        names: &[&str],
        options: ComposeOptions,
    ) -> Result<Composition> {
        let descriptor = CapabilityDescriptor::find(module).ok_or_else(|| {
            SandboxError::Composition(format!("no registered capability named '{module}'"))
        })?;
        (descriptor.compose)(self, host, names, options)
    }

    /// Invoke a public name on `receiver`
    ///
    /// Looks at the receiver's own forwarders, then those installed for
    /// instances of its type, then the type's class-level forwarders (with
    /// the type as the host). Anything else is an undeclared method.
    pub fn send(&mut self, receiver: &HostRef, name: &str, args: &[Value]) -> Result<Value> {
        let (host, forwarder) = self
            .resolve(receiver, name)
            .ok_or_else(|| SandboxError::undeclared(describe(receiver), name))?;

        let handle = self
            .delegates
            .get_or_create(&host, forwarder.module, forwarder.factory);

        match forwarder.kind {
            ForwarderKind::Accessor => Ok(Value::Delegate(handle)),
            ForwarderKind::Method => handle.send(name, args),
        }
    }

    /// The memoized delegate of `C` for `host`, created on first access
    pub fn delegate<C: Capability>(&mut self, host: &HostRef) -> Result<DelegateHandle> {
        let accessor = accessor_name::<C>();
        match self.send(host, &accessor, &[])? {
            Value::Delegate(handle) if handle.is::<C>() => Ok(handle),
            _ => Err(SandboxError::undeclared(describe(host), accessor)),
        }
    }

    /// True when `name` is forwarded for `receiver`
    pub fn responds_to(&self, receiver: &HostRef, name: &str) -> bool {
        self.resolve(receiver, name).is_some()
    }

    /// Every name `receiver` answers to, sorted, accessors included
    pub fn exposed(&self, receiver: &HostRef) -> Vec<String> {
        let mut names: Vec<String> = self
            .lookup_chain(receiver)
            .into_iter()
            .filter_map(|(target, _)| self.forwarders.get(&target))
            .flat_map(|table| table.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Qualified names of the modules whose forwarders `receiver` can reach
    pub fn modules(&self, receiver: &HostRef) -> Vec<&'static str> {
        let mut modules: Vec<&'static str> = self
            .lookup_chain(receiver)
            .into_iter()
            .filter_map(|(target, _)| self.forwarders.get(&target))
            .flat_map(|table| table.values().map(|forwarder| forwarder.module_name))
            .collect();
        modules.sort();
        modules.dedup();
        modules
    }

    /// Drop the delegate of `C` for `host`; the next access builds a new one
    pub fn detach<C: Capability>(&mut self, host: &HostRef) -> bool {
        let removed = self.delegates.remove(host, TypeId::of::<C>());
        if removed {
            debug!(
                "Detached {} from {} {}",
                naming::short_name(C::qualified_name()),
                host.type_name(),
                host.id()
            );
        }
        removed
    }

    /// Drop every delegate attached to `host`
    pub fn release(&mut self, host: &HostRef) -> usize {
        self.delegates.release(host.id())
    }

    /// Drop delegates whose host has been destroyed
    pub fn sweep(&mut self) -> usize {
        self.delegates.sweep()
    }

    /// Number of live delegates
    pub fn delegate_count(&self) -> usize {
        self.delegates.len()
    }

    fn forwarding_target(host: &HostRef, options: ComposeOptions) -> ForwardingTarget {
        match (options.class, host.host_type()) {
            (true, Some(host_type)) => ForwardingTarget::Object(host_type.id()),
            (true, None) => ForwardingTarget::Object(host.id()),
            (false, Some(_)) => ForwardingTarget::Object(host.id()),
            (false, None) => ForwardingTarget::InstancesOf(host.id()),
        }
    }

    /// Targets consulted for `receiver`, paired with the host that holds state
    fn lookup_chain(&self, receiver: &HostRef) -> Vec<(ForwardingTarget, HostRef)> {
        let mut chain = vec![(ForwardingTarget::Object(receiver.id()), receiver.clone())];
        if let Some(host_type) = receiver.host_type() {
            chain.push((ForwardingTarget::InstancesOf(host_type.id()), receiver.clone()));
            chain.push((ForwardingTarget::Object(host_type.id()), host_type.clone()));
        }
        chain
    }

    fn resolve(&self, receiver: &HostRef, name: &str) -> Option<(HostRef, Forwarder)> {
        self.lookup_chain(receiver)
            .into_iter()
            .find_map(|(target, host)| {
                self.forwarders
                    .get(&target)
                    .and_then(|table| table.get(name))
                    .map(|forwarder| (host, forwarder.clone()))
            })
    }

    /// Targets whose forwarders can answer for some receiver that `target` also serves
    ///
    /// `instance_of` is the type of `target` when it is an instance's own table.
    fn overlapping_targets(
        &self,
        target: ForwardingTarget,
        instance_of: Option<HostId>,
    ) -> Vec<ForwardingTarget> {
        let type_id = match (target, instance_of) {
            (ForwardingTarget::Object(_), Some(type_id)) => {
                return vec![
                    target,
                    ForwardingTarget::InstancesOf(type_id),
                    ForwardingTarget::Object(type_id),
                ];
            }
            (ForwardingTarget::Object(id), None) | (ForwardingTarget::InstancesOf(id), _) => id,
        };

        let mut targets = vec![
            ForwardingTarget::Object(type_id),
            ForwardingTarget::InstancesOf(type_id),
        ];
        targets.extend(
            self.instance_types
                .iter()
                .filter(|(_, of)| **of == type_id)
                .map(|(instance, _)| ForwardingTarget::Object(*instance)),
        );
        targets
    }

    fn check_conflicts(
        &self,
        target: ForwardingTarget,
        instance_of: Option<HostId>,
        module_id: TypeId,
        module: &str,
        entries: &[(String, ForwarderKind)],
    ) -> Result<()> {
        for other in self.overlapping_targets(target, instance_of) {
            let Some(table) = self.forwarders.get(&other) else {
                continue;
            };

            for (name, _) in entries {
                let Some(existing) = table.get(name) else {
                    continue;
                };
                if existing.module == module_id {
                    continue;
                }
                match (self.settings.conflict_policy, other == target) {
                    (ConflictPolicy::Reject, true) => {
                        return Err(SandboxError::Composition(format!(
                            "`{name}` on {target} is already forwarded to {}",
                            existing.module_name
                        )));
                    }
                    (ConflictPolicy::Reject, false) => {
                        return Err(SandboxError::Composition(format!(
                            "`{name}` on {target} overlaps {} on {other}",
                            existing.module_name
                        )));
                    }
                    (ConflictPolicy::Replace, true) => warn!(
                        "`{name}` on {target} moves from {} to {module}",
                        existing.module_name
                    ),
                    (ConflictPolicy::Replace, false) => warn!(
                        "`{name}` on {target} overlaps {} on {other}; lookup order decides which answers",
                        existing.module_name
                    ),
                }
            }
        }
        Ok(())
    }
}

fn validate_names(module: &str, names: &[&str]) -> Result<Vec<String>> {
    let mut exposed: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        if !naming::is_valid_method_name(name) {
            return Err(SandboxError::Composition(format!(
                "{module}: malformed method name '{name}'"
            )));
        }
        if !exposed.iter().any(|existing| existing == name) {
            exposed.push(name.to_string());
        }
    }
    Ok(exposed)
}

fn describe(receiver: &HostRef) -> String {
    if receiver.is_type() {
        format!("{}:Type", receiver.type_name())
    } else {
        format!("#<{}>", receiver.type_name())
    }
}
