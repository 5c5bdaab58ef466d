//! Tests for persistent state, the execution ledger, and timeout handling.

use python_code_sandbox::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn test_config() -> SandboxConfig {
    SandboxConfig::builder()
        .default_timeout(Duration::from_secs(5))
        .build()
}

/// Persistent variables survive across executions and updates are visible.
#[tokio::test]
async fn test_persistent_state_accumulates() {
    let sandbox = PythonSandbox::new(test_config());

    let first = sandbox.execute("x = 1", SandboxOptions::persistent()).await;
    assert!(first.succeeded);

    let second = sandbox
        .execute("x += 1\nprint(x)", SandboxOptions::persistent())
        .await;
    assert!(second.succeeded);
    assert_eq!(second.output, "2");

    let variables = sandbox.list_variables().await;
    assert_eq!(variables.len(), 1);
    assert_eq!(variables[0].name, "x");
    assert_eq!(variables[0].repr, "2");
    assert_eq!(variables[0].type_name, "int");
}

/// Runtime errors keep the effects of statements that already ran.
#[tokio::test]
async fn test_runtime_error_still_commits() {
    let sandbox = PythonSandbox::new(test_config());

    let record = sandbox
        .execute("x = 5\n1 / 0", SandboxOptions::persistent())
        .await;
    assert!(!record.succeeded);

    let variables = sandbox.list_variables().await;
    assert_eq!(variables.len(), 1);
    assert_eq!(variables[0].name, "x");
}

/// A classifier rejection leaves the store untouched.
#[tokio::test]
async fn test_rejection_commits_nothing() {
    let sandbox = PythonSandbox::new(test_config());

    sandbox.execute("x = 1", SandboxOptions::persistent()).await;
    sandbox
        .execute("y = 2\nimport os", SandboxOptions::persistent())
        .await;

    let variables = sandbox.list_variables().await;
    let names: Vec<&str> = variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["x"]);
}

/// Clearing variables reports the removed count and is idempotent.
#[tokio::test]
async fn test_clear_variables_idempotent() {
    let sandbox = PythonSandbox::new(test_config());

    sandbox
        .execute("a = 1\nb = 'two'\nc = [3]", SandboxOptions::persistent())
        .await;
    assert_eq!(sandbox.clear_variables().await, 3);
    assert_eq!(sandbox.clear_variables().await, 0);
    assert!(sandbox.list_variables().await.is_empty());
}

/// The ledger preserves insertion order and windows from the tail.
#[tokio::test]
async fn test_ledger_ordering() {
    let sandbox = PythonSandbox::new(test_config());

    for source in ["a = 1", "b = 2", "c = 3"] {
        sandbox.execute(source, SandboxOptions::transient()).await;
    }

    let window = sandbox.recent_executions(Some(2));
    let sources: Vec<&str> = window.iter().map(|r| r.source.as_str()).collect();
    assert_eq!(sources, vec!["b = 2", "c = 3"]);

    let all = sandbox.recent_executions(Some(10));
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].source, "a = 1");
}

/// Every outcome lands in the ledger, failures included.
#[tokio::test]
async fn test_ledger_records_failures() {
    let sandbox = PythonSandbox::new(test_config());

    sandbox
        .execute("print('ok')", SandboxOptions::transient())
        .await;
    sandbox.execute("import os", SandboxOptions::transient()).await;
    sandbox.execute("1 / 0", SandboxOptions::transient()).await;
    sandbox.execute("def f(:", SandboxOptions::transient()).await;

    let records = sandbox.recent_executions(None);
    assert_eq!(records.len(), 4);
    assert!(records[0].succeeded);
    assert_eq!(
        records[1].error.as_ref().map(|e| e.kind),
        Some(FailureKind::ForbiddenConstruct)
    );
    assert_eq!(
        records[2].error.as_ref().map(|e| e.kind),
        Some(FailureKind::RuntimeError)
    );
    assert_eq!(
        records[3].error.as_ref().map(|e| e.kind),
        Some(FailureKind::SyntaxError)
    );
}

/// Clearing the ledger reports the removed count; the attempt counter
/// keeps running.
#[tokio::test]
async fn test_clear_history() {
    let sandbox = PythonSandbox::new(test_config());

    sandbox.execute("x = 1", SandboxOptions::transient()).await;
    sandbox.execute("y = 2", SandboxOptions::transient()).await;

    assert_eq!(sandbox.clear_history(), 2);
    assert_eq!(sandbox.clear_history(), 0);
    assert!(sandbox.recent_executions(None).is_empty());
    assert_eq!(sandbox.execution_count(), 2);
}

/// An unbounded loop is cut off near the configured timeout, the record
/// carries the timeout failure, and the caller gets control back.
#[tokio::test]
async fn test_infinite_loop_times_out() {
    let sandbox = PythonSandbox::new(test_config());

    let started = Instant::now();
    let record = sandbox
        .execute(
            "while True:\n    pass",
            SandboxOptions::transient().with_timeout(Duration::from_millis(300)),
        )
        .await;
    let waited = started.elapsed();

    assert!(!record.succeeded);
    let failure = record.error.expect("timeout expected");
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert!(
        waited < Duration::from_secs(5),
        "caller should regain control promptly, waited {:?}",
        waited
    );
}

/// A timed-out persistent run commits nothing.
#[tokio::test]
async fn test_timeout_never_commits() {
    let sandbox = PythonSandbox::new(test_config());

    sandbox
        .execute("stable = 1", SandboxOptions::persistent())
        .await;
    let record = sandbox
        .execute(
            "doomed = 2\nwhile True:\n    pass",
            SandboxOptions::persistent().with_timeout(Duration::from_millis(300)),
        )
        .await;
    assert_eq!(
        record.error.as_ref().map(|e| e.kind),
        Some(FailureKind::Timeout)
    );
    assert!(record.variables_preview.is_none());

    let variables = sandbox.list_variables().await;
    let names: Vec<&str> = variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["stable"]);
}

/// Concurrent persistent executions serialize on the store; both updates
/// land.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_persistent_executions_serialize() {
    let sandbox = Arc::new(PythonSandbox::new(test_config()));
    sandbox
        .execute("counter = 0", SandboxOptions::persistent())
        .await;

    let a = {
        let sandbox = Arc::clone(&sandbox);
        tokio::spawn(async move {
            sandbox
                .execute("counter += 1", SandboxOptions::persistent())
                .await
        })
    };
    let b = {
        let sandbox = Arc::clone(&sandbox);
        tokio::spawn(async move {
            sandbox
                .execute("counter += 1", SandboxOptions::persistent())
                .await
        })
    };
    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    assert!(a.succeeded && b.succeeded);

    let variables = sandbox.list_variables().await;
    assert_eq!(variables.len(), 1);
    assert_eq!(variables[0].repr, "2");
}

/// Stderr output is kept separate from stdout under a label.
#[tokio::test]
async fn test_stderr_is_labeled() {
    let sandbox = PythonSandbox::new(test_config());

    let record = sandbox
        .execute(
            "print('to stdout')\nsys.stderr.write('to stderr\\n')",
            SandboxOptions::transient(),
        )
        .await;

    assert!(record.succeeded, "error: {:?}", record.error);
    assert!(record.output.starts_with("to stdout"));
    assert!(record.output.contains("[stderr]\nto stderr"));
}

/// On failure, stderr written before the raise travels with the error
/// message; the output keeps only the stdout that made it out.
#[tokio::test]
async fn test_failure_stderr_joins_error() {
    let sandbox = PythonSandbox::new(test_config());

    let record = sandbox
        .execute(
            "print('partial')\nsys.stderr.write('diagnostic\\n')\n1 / 0",
            SandboxOptions::transient(),
        )
        .await;

    assert!(!record.succeeded);
    let failure = record.error.expect("runtime failure expected");
    assert!(failure.message.starts_with("ZeroDivisionError"));
    assert!(failure.message.contains("diagnostic"));
    assert_eq!(record.output, "partial");
    assert!(!record.output.contains("[stderr]"));
}

/// Tuple elements survive the persistent round trip.
#[tokio::test]
async fn test_persistent_tuple_elements_survive() {
    let sandbox = PythonSandbox::new(test_config());

    sandbox
        .execute("t = (1, 2)", SandboxOptions::persistent())
        .await;
    let record = sandbox
        .execute("print(t[0])", SandboxOptions::persistent())
        .await;

    assert!(record.succeeded, "error: {:?}", record.error);
    assert_eq!(record.output, "1");
}

/// The serialized record matches the documented envelope.
#[tokio::test]
async fn test_record_envelope() {
    let sandbox = PythonSandbox::new(test_config());

    let record = sandbox
        .execute("total = 2 + 2\nprint(total)", SandboxOptions::persistent())
        .await;
    let json = serde_json::to_value(&record).unwrap();

    assert_eq!(json["source"], "total = 2 + 2\nprint(total)");
    assert_eq!(json["succeeded"], true);
    assert_eq!(json["output"], "4");
    assert!(json["error"].is_null());
    assert_eq!(json["variables_preview"], "total = 4");
    assert_eq!(json["mode"], "persistent");
    assert!(json["elapsed_seconds"].is_number());
    assert!(json["created_at"].is_string());
}
