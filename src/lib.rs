// Library interface for sandboxed-methods
pub mod capabilities;
pub mod config;
pub mod core;
pub mod symbols;

// Re-export commonly used types
pub use crate::config::{Config, ConflictPolicy, SandboxSettings};
pub use crate::core::capability::{Capability, Context, Delegate, DelegateHandle, MethodTable};
pub use crate::core::error::{Result, SandboxError};
pub use crate::core::host::{Host, HostId, HostRef};
pub use crate::core::runtime::{ComposeOptions, Composition, ForwardingTarget, Runtime};
pub use crate::core::value::Value;
