//! Prelude module for convenient imports.

pub use crate::error::{FailureKind, SandboxFailure};
pub use crate::sandbox::{
    config::SandboxConfig,
    executor::{ExecutionMode, ExecutionRecord, PythonSandbox, SandboxOptions},
    namespace::VariableBinding,
};
