//! Basic example of executing Python code in the sandbox.
//!
//! Run with: cargo run --example basic_execution

use python_code_sandbox::prelude::*;
use std::time::Duration;

#[tokio::main]
async fn main() {
    // Configure the sandbox
    let config = SandboxConfig::builder()
        .default_timeout(Duration::from_secs(5))
        .build();

    let sandbox = PythonSandbox::new(config);

    // Execute simple arithmetic
    println!("=== Test 1: Simple arithmetic ===");
    let record = sandbox
        .execute("print(1 + 1)", SandboxOptions::transient())
        .await;
    println!("output: {}", record.output);
    println!("succeeded: {}", record.succeeded);
    println!("elapsed: {:.4}s", record.elapsed_seconds);

    // Execute with a loop
    println!("\n=== Test 2: Loop execution ===");
    let code = r#"
for i in range(5):
    print(f"Count: {i}")
"#;
    let record = sandbox.execute(code, SandboxOptions::transient()).await;
    println!("output:\n{}", record.output);

    // Test error handling
    println!("\n=== Test 3: Python error ===");
    let record = sandbox
        .execute("raise ValueError('test error')", SandboxOptions::transient())
        .await;
    match record.error {
        Some(failure) => println!("failure: {}", failure),
        None => println!("output: {}", record.output),
    }

    // Test the safety classifier
    println!("\n=== Test 4: Rejected code ===");
    let record = sandbox
        .execute("import os\nos.system('ls')", SandboxOptions::transient())
        .await;
    match record.error {
        Some(failure) => println!("failure: {}", failure),
        None => println!("output: {}", record.output),
    }

    // Test timeout enforcement
    println!("\n=== Test 5: Timeout ===");
    let record = sandbox
        .execute(
            "while True:\n    pass",
            SandboxOptions::transient().with_timeout(Duration::from_millis(500)),
        )
        .await;
    match record.error {
        Some(failure) => println!("failure: {}", failure),
        None => println!("output: {}", record.output),
    }

    println!("\ntotal executions: {}", sandbox.execution_count());
}
