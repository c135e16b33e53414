//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: async functions in production code MUST NOT use blocking I/O.
//! **Required**: `tokio::fs` inside async code. Synchronous helpers (config
//! loading before the runtime does real work) may use `std::fs`.

use architectural_enforcement::{code_part, in_async_fn, rust_files, PRODUCTION_DIRS};

const FORBIDDEN: &[&str] = &[
    "std::fs::",
    "std::net::",
    "std::process::Command",
    "reqwest::blocking",
    "std::thread::sleep",
];

#[test]
fn test_no_blocking_io_in_async_code() {
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        for file in rust_files(dir) {
            for (line_number, line) in file.production_lines() {
                let code = code_part(line);
                if !FORBIDDEN.iter().any(|pattern| code.contains(pattern)) {
                    continue;
                }
                if in_async_fn(&file.lines, line_number - 1) {
                    violations.push(format!("{}:{} - {}", file.relative, line_number, line.trim()));
                }
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\nBlocking I/O found in async functions:");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nUse tokio::fs / tokio::net / tokio::process instead.");
        panic!("Found {} blocking I/O violation(s)", violations.len());
    }
}
