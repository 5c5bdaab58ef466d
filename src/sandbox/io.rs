//! Capture buffers for sandboxed stdout and stderr.
//!
//! Each execution runs on its own worker thread, so the buffers are
//! thread-local: the worker resets them before evaluation, the injected
//! `print` and the interpreter's stderr hooks append to them, and the worker
//! drains them once evaluation finishes. An abandoned worker takes its
//! buffers with it; nothing leaks to later executions.

use std::cell::RefCell;

thread_local! {
    static STDOUT_BUFFER: RefCell<String> = RefCell::new(String::new());
    static STDERR_BUFFER: RefCell<String> = RefCell::new(String::new());
}

/// Clear both buffers on the current thread.
pub fn reset_buffers() {
    STDOUT_BUFFER.with(|buffer| buffer.borrow_mut().clear());
    STDERR_BUFFER.with(|buffer| buffer.borrow_mut().clear());
}

/// Append text to the captured stdout stream.
pub fn append_stdout(text: &str) {
    STDOUT_BUFFER.with(|buffer| buffer.borrow_mut().push_str(text));
}

/// Append text to the captured stderr stream.
pub fn append_stderr(text: &str) {
    STDERR_BUFFER.with(|buffer| buffer.borrow_mut().push_str(text));
}

/// Drain both buffers, returning `(stdout, stderr)`.
pub fn take_captured() -> (String, String) {
    let stdout = STDOUT_BUFFER.with(|buffer| std::mem::take(&mut *buffer.borrow_mut()));
    let stderr = STDERR_BUFFER.with(|buffer| std::mem::take(&mut *buffer.borrow_mut()));
    (stdout, stderr)
}

/// Merge the captured streams into the single output field of a record.
///
/// Stdout is trimmed; a non-empty stderr is appended under a `[stderr]`
/// label so callers can tell the streams apart in one string.
pub fn merge_streams(stdout: &str, stderr: &str) -> String {
    let stdout = stdout.trim();
    let stderr = stderr.trim();
    if stderr.is_empty() {
        stdout.to_string()
    } else if stdout.is_empty() {
        format!("[stderr]\n{}", stderr)
    } else {
        format!("{}\n[stderr]\n{}", stdout, stderr)
    }
}
