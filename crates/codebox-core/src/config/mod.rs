//! Configuration module
//!
//! YAML-backed configuration for the sandbox image, resource limits, the
//! engine connection and the HTTP front end.

pub mod loader;
pub mod types;

pub use loader::*;
pub use types::*;

#[cfg(test)]
mod tests;
