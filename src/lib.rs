//! # Python Code Sandbox
//!
//! Restricted Python execution with static safety gating and an execution
//! ledger.
//!
//! This crate embeds a RustPython interpreter and runs submitted code
//! through three stages:
//!
//! - **Safety classifier**: the source is parsed and its syntax tree is
//!   checked against denylists of imports, calls, method calls, and
//!   attribute accesses. Rejected code is never evaluated.
//! - **Execution engine**: accepted code runs in a fresh interpreter with a
//!   curated namespace (safe stdlib modules pre-imported, dangerous builtins
//!   removed, imports gated), either isolated per call or against a
//!   persistent variable store. Evaluation is raced against a wall-clock
//!   timeout.
//! - **Execution ledger**: every attempt, including rejections and
//!   timeouts, is appended as a structured record.
//!
//! ## Example
//!
//! ```rust,ignore
//! use python_code_sandbox::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SandboxConfig::builder()
//!         .default_timeout(Duration::from_secs(5))
//!         .build();
//!
//!     let sandbox = PythonSandbox::new(config);
//!     let record = sandbox.execute("print(1 + 1)", SandboxOptions::transient()).await;
//!
//!     assert!(record.succeeded);
//!     assert_eq!(record.output, "2");
//! }
//! ```
//!
//! ## Security Model
//!
//! The sandbox layers its restrictions:
//!
//! 1. **Static classification**: denylisted constructs are rejected from
//!    the syntax tree before any evaluation.
//! 2. **Namespace curation**: each run gets a fresh interpreter with
//!    `open`/`eval`/`exec` and friends removed and `__import__` replaced by
//!    an allow-list gate.
//! 3. **Timeout enforcement**: evaluation runs on an abandonable worker
//!    thread; an expired run produces a timeout record and commits nothing.
//! 4. **Copy-then-commit state**: persistent variables cross the boundary
//!    as JSON snapshots, so a timed-out run can never leave the store in a
//!    half-mutated state.

pub mod error;
pub mod prelude;
pub mod sandbox;

// Re-export main types at crate root for convenience
pub use error::{FailureKind, SandboxFailure};
pub use sandbox::classifier::{classify, ClassificationVerdict, SafetyPolicy};
pub use sandbox::config::{SandboxConfig, SandboxConfigBuilder};
pub use sandbox::executor::{ExecutionMode, ExecutionRecord, PythonSandbox, SandboxOptions};
pub use sandbox::history::{ExecutionHistory, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
pub use sandbox::namespace::{VariableBinding, SAFE_MODULES};
