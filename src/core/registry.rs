use std::any::TypeId;
use std::collections::HashMap;

use tracing::debug;

use crate::core::capability::{Capability, Delegate, DelegateHandle};
use crate::core::host::{HostId, HostRef};

/// Builds a fresh delegate for one capability module
pub type DelegateFactory = fn(&HostRef) -> DelegateHandle;

/// Factory for `C`, usable where the module type has been erased
pub fn factory_for<C: Capability>() -> DelegateFactory {
    spawn::<C>
}

fn spawn<C: Capability>(host: &HostRef) -> DelegateHandle {
    DelegateHandle::new(Delegate::<C>::attach(host))
}

/// Entry count at which the first automatic sweep runs
const MIN_SWEEP_THRESHOLD: usize = 64;

/// Memoized delegates keyed by (host identity, module identity)
///
/// Delegates are created on first access and cached until they are detached,
/// their host is released, or a sweep finds their host gone. Creation sweeps
/// automatically whenever the map has doubled since the last sweep, so
/// delegates of dropped hosts never pile up. Not thread-safe: the registry
/// lives inside a single-threaded runtime.
pub struct DelegateRegistry {
    entries: HashMap<(HostId, TypeId), DelegateHandle>,
    sweep_threshold: usize,
}

impl Default for DelegateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DelegateRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            sweep_threshold: MIN_SWEEP_THRESHOLD,
        }
    }

    /// Return the delegate for (host, module), creating it with `factory` if needed
    pub fn get_or_create(
        &mut self,
        host: &HostRef,
        module: TypeId,
        factory: DelegateFactory,
    ) -> DelegateHandle {
        let key = (host.id(), module);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.sweep_threshold {
            self.sweep();
        }

        self.entries
            .entry(key)
            .or_insert_with(|| {
                let handle = factory(host);
                debug!(
                    "Attached {} to {} {}",
                    handle.module_name(),
                    host.type_name(),
                    host.id()
                );
                handle
            })
            .clone()
    }

    pub fn contains(&self, host: &HostRef, module: TypeId) -> bool {
        self.entries.contains_key(&(host.id(), module))
    }

    /// Drop the delegate for (host, module); true if one existed
    pub fn remove(&mut self, host: &HostRef, module: TypeId) -> bool {
        self.entries.remove(&(host.id(), module)).is_some()
    }

    /// Drop every delegate attached to `host`, returning how many were dropped
    pub fn release(&mut self, host: HostId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(owner, _), _| *owner != host);
        before - self.entries.len()
    }

    /// Drop delegates whose host no longer exists
    pub fn sweep(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, handle| !handle.is_orphaned());
        let swept = before - self.entries.len();
        self.sweep_threshold = MIN_SWEEP_THRESHOLD.max(self.entries.len() * 2);
        if swept > 0 {
            debug!("Swept {swept} delegate(s) of released hosts");
        }
        swept
    }

    /// Number of delegates whose host is still alive
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .filter(|handle| !handle.is_orphaned())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
