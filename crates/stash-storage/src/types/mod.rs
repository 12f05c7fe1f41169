//! Type definitions for stash storage.

mod ids;
mod secrets;

// Re-export all types from submodules
pub use ids::*;
pub use secrets::*;
