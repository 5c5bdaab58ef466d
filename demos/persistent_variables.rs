//! Example of the persistent variable store and the execution ledger.
//!
//! Run with: cargo run --example persistent_variables

use python_code_sandbox::prelude::*;

#[tokio::main]
async fn main() {
    let sandbox = PythonSandbox::new(SandboxConfig::default());

    // Build up state across executions
    sandbox
        .execute("total = 0", SandboxOptions::persistent())
        .await;
    sandbox
        .execute(
            "for i in range(10):\n    total += i",
            SandboxOptions::persistent(),
        )
        .await;
    let record = sandbox
        .execute("print(f'total is {total}')", SandboxOptions::persistent())
        .await;
    println!("output: {}", record.output);
    if let Some(preview) = &record.variables_preview {
        println!("variables:\n{}", preview);
    }

    // Inspect the store directly
    println!("\n=== Stored variables ===");
    for binding in sandbox.list_variables().await {
        println!("{}: {} = {}", binding.type_name, binding.name, binding.repr);
    }

    // A transient execution cannot see the store
    println!("\n=== Transient isolation ===");
    let record = sandbox
        .execute("print(total)", SandboxOptions::transient())
        .await;
    match record.error {
        Some(failure) => println!("failure: {}", failure),
        None => println!("output: {}", record.output),
    }

    // Walk the ledger
    println!("\n=== Recent executions ===");
    for record in sandbox.recent_executions(Some(5)) {
        println!(
            "[{}] succeeded={} source={:?}",
            record.created_at.format("%H:%M:%S"),
            record.succeeded,
            record.source
        );
    }

    // Reset everything
    let removed = sandbox.clear_variables().await;
    println!("\ncleared {} variables", removed);
}
