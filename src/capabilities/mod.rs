//! Capability modules bundled with the crate
//!
//! Each module registers itself through `register_capability!` so it can be
//! composed by name from configuration.

pub mod counter;
pub mod tagging;

pub use counter::Counter;
pub use tagging::Tagging;
