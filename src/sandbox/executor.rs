//! Core execution engine for the Python sandbox.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rustpython_vm::compiler::Mode;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::SandboxFailure;
use crate::sandbox::classifier::{classify, ClassificationVerdict, SafetyPolicy};
use crate::sandbox::config::SandboxConfig;
use crate::sandbox::history::ExecutionHistory;
use crate::sandbox::io;
use crate::sandbox::namespace::{self, VariableBinding};

/// Variable scope selection for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Fresh namespace, discarded afterwards.
    #[default]
    Transient,
    /// Seeded from the engine's variable store; results are committed back.
    Persistent,
}

/// Per-execution options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SandboxOptions {
    /// Variable scope for this execution.
    pub mode: ExecutionMode,
    /// Timeout override; `None` uses the configured default. Clamped to
    /// the configured maximum either way.
    pub timeout: Option<Duration>,
}

impl SandboxOptions {
    /// Options for an isolated execution.
    pub fn transient() -> Self {
        Self {
            mode: ExecutionMode::Transient,
            timeout: None,
        }
    }

    /// Options for an execution against the persistent variable store.
    pub fn persistent() -> Self {
        Self {
            mode: ExecutionMode::Persistent,
            timeout: None,
        }
    }

    /// Set a per-execution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// The outcome of one execution attempt, as appended to the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    /// The submitted source, verbatim.
    pub source: String,
    /// True only when evaluation completed without a failure.
    pub succeeded: bool,
    /// Trimmed captured stdout, with a `[stderr]` section appended when
    /// stderr was non-empty.
    pub output: String,
    /// The failure, when any stage failed.
    pub error: Option<SandboxFailure>,
    /// `name = repr` block of the committed variables; persistent-mode
    /// successes only.
    pub variables_preview: Option<String>,
    /// Wall-clock seconds spent evaluating (zero for rejected submissions).
    pub elapsed_seconds: f64,
    /// The scope the execution ran under.
    pub mode: ExecutionMode,
    /// When the attempt finished.
    pub created_at: DateTime<Utc>,
}

/// What the worker thread reports back for a completed evaluation.
struct RunOutcome {
    result: Result<(), SandboxFailure>,
    stdout: String,
    stderr: String,
    bindings: Vec<VariableBinding>,
    elapsed: Duration,
}

/// A sandboxed Python execution environment.
///
/// Owns the persistent variable store and the execution ledger. Cheap to
/// share behind an `Arc`; all methods take `&self`.
pub struct PythonSandbox {
    config: SandboxConfig,
    policy: SafetyPolicy,
    variables: tokio::sync::Mutex<Vec<VariableBinding>>,
    history: Arc<Mutex<ExecutionHistory>>,
    executions: AtomicUsize,
}

impl PythonSandbox {
    /// Create a sandbox with the given configuration and the default policy.
    pub fn new(config: SandboxConfig) -> Self {
        Self::with_policy(config, SafetyPolicy::default())
    }

    /// Create a sandbox with an explicit safety policy.
    pub fn with_policy(config: SandboxConfig, policy: SafetyPolicy) -> Self {
        Self {
            config,
            policy,
            variables: tokio::sync::Mutex::new(Vec::new()),
            history: Arc::new(Mutex::new(ExecutionHistory::new())),
            executions: AtomicUsize::new(0),
        }
    }

    /// Execute Python code in the sandbox.
    ///
    /// Never returns an `Err`: every outcome, including rejections and
    /// timeouts, is reported as an [`ExecutionRecord`] and appended to the
    /// ledger. Evaluation runs on a dedicated worker thread raced against
    /// the timeout; an expired worker is abandoned and its namespace never
    /// committed.
    pub async fn execute(&self, source: &str, options: SandboxOptions) -> ExecutionRecord {
        let timeout = self.config.resolve_timeout(options.timeout);

        if let ClassificationVerdict::Rejected(failure) = classify(source, &self.policy) {
            let record = ExecutionRecord {
                source: source.to_string(),
                succeeded: false,
                output: String::new(),
                error: Some(failure),
                variables_preview: None,
                elapsed_seconds: 0.0,
                mode: options.mode,
                created_at: Utc::now(),
            };
            return self.finish(record);
        }

        let record = match options.mode {
            ExecutionMode::Transient => {
                let attempt = self.run_with_timeout(source, Vec::new(), timeout).await;
                self.build_record(source, options.mode, timeout, attempt, None)
            }
            ExecutionMode::Persistent => {
                // The store lock is held for the whole call so concurrent
                // persistent executions serialize on it.
                let mut store = self.variables.lock().await;
                let seed = store.clone();
                let attempt = self.run_with_timeout(source, seed, timeout).await;
                let committed = match &attempt {
                    // Commit on success and on runtime errors alike:
                    // statements that already ran keep their effects. An
                    // abandoned (timed out) worker commits nothing.
                    Ok(outcome) => {
                        *store = outcome.bindings.clone();
                        Some(store.clone())
                    }
                    Err(_) => None,
                };
                self.build_record(source, options.mode, timeout, attempt, committed)
            }
        };

        self.finish(record)
    }

    /// The committed persistent variables, name-sorted.
    pub async fn list_variables(&self) -> Vec<VariableBinding> {
        self.variables.lock().await.clone()
    }

    /// Drop all persistent variables, returning how many were removed.
    pub async fn clear_variables(&self) -> usize {
        let mut store = self.variables.lock().await;
        let removed = store.len();
        store.clear();
        removed
    }

    /// The most recent ledger records, oldest of the window first.
    pub fn recent_executions(&self, limit: Option<usize>) -> Vec<ExecutionRecord> {
        self.lock_history().recent(limit)
    }

    /// Drop all ledger records, returning how many were removed.
    pub fn clear_history(&self) -> usize {
        self.lock_history().clear()
    }

    /// Total executions attempted since the sandbox was created. Unlike the
    /// ledger, this survives `clear_history`.
    pub fn execution_count(&self) -> usize {
        self.executions.load(Ordering::Relaxed)
    }

    /// Run the worker thread and race it against the timeout.
    async fn run_with_timeout(
        &self,
        source: &str,
        seed: Vec<VariableBinding>,
        timeout: Duration,
    ) -> Result<RunOutcome, SandboxFailure> {
        let source = source.to_string();
        let (tx, rx) = oneshot::channel();
        std::thread::spawn(move || {
            let outcome = run_in_interpreter(&source, &seed);
            let _ = tx.send(outcome);
        });

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(SandboxFailure::runtime(
                "interpreter thread exited before reporting a result",
            )),
            // The worker is abandoned; its thread-local buffers and scope
            // go with it.
            Err(_) => Err(SandboxFailure::timeout(timeout)),
        }
    }

    fn build_record(
        &self,
        source: &str,
        mode: ExecutionMode,
        timeout: Duration,
        attempt: Result<RunOutcome, SandboxFailure>,
        committed: Option<Vec<VariableBinding>>,
    ) -> ExecutionRecord {
        match attempt {
            Ok(outcome) => {
                let succeeded = outcome.result.is_ok();
                let (output, error) = match outcome.result {
                    Ok(()) => (io::merge_streams(&outcome.stdout, &outcome.stderr), None),
                    // On failure stderr travels with the error; the output
                    // keeps only what reached stdout before the raise.
                    Err(mut failure) => {
                        let stderr = outcome.stderr.trim();
                        if !stderr.is_empty() {
                            failure.message = format!("{}\n{}", failure.message, stderr);
                        }
                        (outcome.stdout.trim().to_string(), Some(failure))
                    }
                };
                let variables_preview = if succeeded {
                    committed.as_deref().and_then(namespace::render_preview)
                } else {
                    None
                };
                ExecutionRecord {
                    source: source.to_string(),
                    succeeded,
                    output,
                    error,
                    variables_preview,
                    elapsed_seconds: outcome.elapsed.as_secs_f64(),
                    mode,
                    created_at: Utc::now(),
                }
            }
            Err(failure) => {
                // Only a real timeout spent the full window waiting.
                let elapsed_seconds = if failure.is_timeout() {
                    timeout.as_secs_f64()
                } else {
                    0.0
                };
                ExecutionRecord {
                    source: source.to_string(),
                    succeeded: false,
                    output: String::new(),
                    error: Some(failure),
                    variables_preview: None,
                    elapsed_seconds,
                    mode,
                    created_at: Utc::now(),
                }
            }
        }
    }

    /// Append the record to the ledger and bump the attempt counter.
    fn finish(&self, record: ExecutionRecord) -> ExecutionRecord {
        self.executions.fetch_add(1, Ordering::Relaxed);
        self.lock_history().append(record.clone());
        record
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, ExecutionHistory> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for PythonSandbox {
    fn default() -> Self {
        Self::new(SandboxConfig::default())
    }
}

/// One evaluation in a fresh interpreter. Runs on the worker thread.
fn run_in_interpreter(source: &str, seed: &[VariableBinding]) -> RunOutcome {
    io::reset_buffers();
    let interpreter = namespace::new_interpreter();
    interpreter.enter(|vm| {
        let scope = match namespace::prepare_scope(vm) {
            Ok(scope) => scope,
            Err(exc) => {
                return failed_outcome(SandboxFailure::runtime(format!(
                    "namespace setup failed: {}",
                    namespace::format_exception(vm, &exc)
                )))
            }
        };

        if let Err(exc) = namespace::inject_bindings(vm, &scope, seed) {
            return failed_outcome(SandboxFailure::runtime(format!(
                "variable seeding failed: {}",
                namespace::format_exception(vm, &exc)
            )));
        }

        let code = match vm.compile(source, Mode::Exec, "<sandbox>".to_string()) {
            Ok(code) => code,
            Err(err) => return failed_outcome(SandboxFailure::syntax(err.to_string())),
        };

        // Elapsed time covers evaluation only, not interpreter construction.
        let started = Instant::now();
        let run = vm.run_code_obj(code, scope.clone());
        let elapsed = started.elapsed();

        let result = match run {
            Ok(_) => Ok(()),
            Err(exc) => Err(SandboxFailure::runtime(namespace::format_exception(
                vm, &exc,
            ))),
        };
        let bindings = namespace::extract_bindings(vm, &scope);
        let (stdout, stderr) = io::take_captured();
        RunOutcome {
            result,
            stdout,
            stderr,
            bindings,
            elapsed,
        }
    })
}

fn failed_outcome(failure: SandboxFailure) -> RunOutcome {
    let (stdout, stderr) = io::take_captured();
    RunOutcome {
        result: Err(failure),
        stdout,
        stderr,
        bindings: Vec::new(),
        elapsed: Duration::ZERO,
    }
}
