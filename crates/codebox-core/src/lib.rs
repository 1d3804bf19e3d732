//! Ephemeral sandboxed code execution.
//!
//! Source text submitted by a caller is written into a private scratch
//! directory, run once inside a throwaway container with bounded memory, CPU
//! and wall-clock time, and reported back as a single `ExecutionResult`.
//!
//! # Architecture Overview
//!
//! - **Workspace**: per-request directory, removed when its guard drops
//! - **Executors**: container engine seam (`ContainerEngine`), the Docker
//!   implementation and the one-shot `SandboxRunner`
//! - **Reporter**: maps raw engine outcomes to `ExecutionResult`
//! - **Facade**: `CodeRunner::run_request`, the entry point for callers
//! - **Configuration**: YAML file plus `CODEBOX_*` environment overrides

pub mod config;
pub mod errors;
pub mod executors;
pub mod facade;
pub mod reporter;
pub mod request;
pub mod workspace;

pub use config::*;
pub use errors::{CodeboxError, EngineError};
pub use executors::{ContainerEngine, DockerEngine, SandboxRunner};
pub use facade::CodeRunner;
pub use reporter::{classify, ExecutionResult, RawOutcome};
pub use request::ExecutionRequest;
pub use workspace::{Workspace, WorkspaceManager};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
