//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT call sleep methods.
//! **Exception**: the async job poll loop (`workflow/orchestrator.rs`,
//! `fn poll`), which waits between status requests and races that wait
//! against cancellation.

use architectural_enforcement::{code_part, enclosing_fn, rust_files, PRODUCTION_DIRS};

const POLL_LOOP_FILE: &str = "adapter/core/src/workflow/orchestrator.rs";
const POLL_LOOP_FN: &str = "poll";

fn is_sleep_call(code: &str) -> bool {
    code.contains("::sleep(") || code.contains(".sleep(")
}

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        for file in rust_files(dir) {
            for (line_number, line) in file.production_lines() {
                if !is_sleep_call(code_part(line)) {
                    continue;
                }
                let allowed = file.relative == POLL_LOOP_FILE
                    && enclosing_fn(&file.lines, line_number - 1) == Some(POLL_LOOP_FN);
                if !allowed {
                    violations.push(format!("{}:{} - {}", file.relative, line_number, line.trim()));
                }
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\nSleep calls found in production code:");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nOnly the job poll loop may sleep, and only under tokio::select! with cancellation.");
        panic!("Found {} sleep violation(s) in production code", violations.len());
    }
}

/// The exception must stay cancellable
#[test]
fn test_poll_sleep_is_raced_against_cancellation() {
    let files = rust_files("adapter/core/src/workflow");
    let Some(file) = files.iter().find(|f| f.relative == POLL_LOOP_FILE) else {
        panic!("{POLL_LOOP_FILE} not found");
    };

    for (line_number, line) in file.production_lines() {
        if !is_sleep_call(code_part(line)) {
            continue;
        }
        let window = &file.lines[line_number.saturating_sub(6)..line_number];
        assert!(
            window.iter().any(|l| l.contains("cancelled()")),
            "{}:{} sleeps without racing the cancellation token",
            file.relative,
            line_number
        );
    }
}

#[test]
fn test_sleep_detection() {
    assert!(is_sleep_call("    tokio::time::sleep(Duration::from_millis(10)).await;"));
    assert!(is_sleep_call("std::thread::sleep(d);"));
    assert!(!is_sleep_call("let sleeper = 3;"));
}
