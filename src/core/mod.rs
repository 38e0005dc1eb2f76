pub mod assembly;
pub mod auto_register;
pub mod capability;
pub mod error;
pub mod host;
pub mod naming;
pub mod registry;
pub mod runtime;
pub mod value;
