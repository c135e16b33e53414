//! Integration Test: Provider Neutrality
//!
//! **Policy**: the engine knows no provider. Hostnames belong in profiles,
//! never in `adapter/core/src` production code.

use architectural_enforcement::{code_part, rust_files};

const PROVIDER_HOSTS: &[&str] = &[
    "api.openai.com",
    "api.anthropic.com",
    "generativelanguage.googleapis.com",
    "aiplatform.googleapis.com",
    "api.stability.ai",
    "api.replicate.com",
    "api.elevenlabs.io",
    "dashscope.aliyuncs.com",
    "openai.azure.com",
];

#[test]
fn test_no_provider_hostnames_in_engine() {
    let mut violations = Vec::new();

    for file in rust_files("adapter/core/src") {
        for (line_number, line) in file.production_lines() {
            let code = code_part(line);
            if let Some(host) = PROVIDER_HOSTS.iter().find(|h| code.contains(*h)) {
                violations.push(format!("{}:{} - {host}", file.relative, line_number));
            }
        }
    }

    assert!(
        violations.is_empty(),
        "Provider hostnames found in engine code:\n  {}",
        violations.join("\n  ")
    );
}
