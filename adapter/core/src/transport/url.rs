//! URL assembly
//!
//! Profiles are written by hand, so base URLs and paths arrive with every
//! combination of trailing/leading slashes and duplicated version prefixes.

use std::sync::LazyLock;

use regex::Regex;

static VERSION_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v\d+[a-z0-9]*$").expect("version pattern is valid")
});

/// Join a base URL and a path
///
/// Duplicate slashes are collapsed, and a base ending in a version segment
/// (`/v1`, `/v1beta`) is not repeated when the path starts with the same
/// segment.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    let path = path.trim().trim_start_matches('/');
    if path.is_empty() {
        return base.to_string();
    }

    let mut path = format!("/{path}");
    while path.contains("//") {
        path = path.replace("//", "/");
    }

    if let Some(version) = trailing_version(base) {
        let prefix = format!("/{version}");
        if path == prefix {
            return base.to_string();
        }
        if path.starts_with(&format!("{prefix}/")) {
            path = path[prefix.len()..].to_string();
        }
    }

    format!("{base}{path}")
}

/// Whether a path is already a full URL
#[must_use]
pub fn is_absolute(path: &str) -> bool {
    let lower = path.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Drop the query string so URLs can be logged without leaking keys
#[must_use]
pub fn redact_url(url: &str) -> String {
    match url.split_once('?') {
        Some((head, _)) => format!("{head}?…"),
        None => url.to_string(),
    }
}

fn trailing_version(base: &str) -> Option<&str> {
    let after_scheme = base.split_once("://").map_or(base, |(_, rest)| rest);
    let (_, last) = after_scheme.rsplit_once('/')?;
    VERSION_SEGMENT.is_match(last).then_some(last)
}
