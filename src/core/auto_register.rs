use crate::core::capability::{accessor_name, Capability, MethodTable};
use crate::core::error::Result;
use crate::core::host::HostRef;
use crate::core::runtime::{ComposeOptions, Composition, Runtime};

/// Capability descriptor for auto-registration
#[derive(Debug, Clone)]
pub struct CapabilityDescriptor {
    /// Short registered name, e.g. `counter`
    pub name: &'static str,
    pub description: &'static str,
    pub qualified_name: fn() -> &'static str,
    pub accessor: fn() -> String,
    /// Methods exposed when composed without an explicit list
    pub surface: fn() -> Vec<String>,
    pub compose: fn(&mut Runtime, &HostRef, &[&str], ComposeOptions) -> Result<Composition>,
}

// Inventory collection for auto-registering capabilities
inventory::collect!(CapabilityDescriptor);

impl CapabilityDescriptor {
    /// All registered capabilities, sorted by name
    pub fn all() -> Vec<&'static CapabilityDescriptor> {
        let mut descriptors: Vec<_> = inventory::iter::<CapabilityDescriptor>.into_iter().collect();
        descriptors.sort_by_key(|descriptor| descriptor.name);
        descriptors
    }

    /// Find a registered capability by registered or qualified name
    pub fn find(name: &str) -> Option<&'static CapabilityDescriptor> {
        inventory::iter::<CapabilityDescriptor>
            .into_iter()
            .find(|descriptor| descriptor.name == name || (descriptor.qualified_name)() == name)
    }
}

/// Public surface of `C` as exposed by a composition without explicit names
pub fn public_surface<C: Capability>() -> Vec<String> {
    MethodTable::<C>::build().public_surface()
}

/// Accessor name helper usable as a plain fn pointer
pub fn accessor_for<C: Capability>() -> String {
    accessor_name::<C>()
}

/// Convenience macro for auto-registering capabilities
///
/// Usage:
/// ```rust,ignore
/// register_capability!(Counter, "counter", "Counts calls on the host");
/// ```
#[macro_export]
macro_rules! register_capability {
    ($capability:ty, $name:literal, $description:literal) => {
        inventory::submit! {
            $crate::core::auto_register::CapabilityDescriptor {
                name: $name,
                description: $description,
                qualified_name: <$capability as $crate::core::capability::Capability>::qualified_name,
                accessor: $crate::core::auto_register::accessor_for::<$capability>,
                surface: $crate::core::auto_register::public_surface::<$capability>,
                compose: $crate::core::runtime::Runtime::compose::<$capability>,
            }
        }
    };
}
