//! Dotted path extraction
//!
//! Grammar:
//!
//! ```text
//! path     := segment ("." segment)*
//! segment  := name? accessor*
//! accessor := "[" digits "]"      index into an array
//!           | "[]"                project the rest of the path over each element
//! ```
//!
//! `data[0].url` reads one URL, `data[].url` reads all of them. A `null`
//! met halfway short-circuits to `null`; anything unresolvable (including a
//! malformed path) is `None`, never a panic.

use serde_json::Value;

#[derive(Debug, PartialEq)]
enum Step {
    Key(String),
    Index(usize),
    Project,
}

/// Read the value addressed by `path`
///
/// An empty path addresses the root.
#[must_use]
pub fn get_by_path(root: &Value, path: &str) -> Option<Value> {
    let steps = parse(path.trim())?;
    resolve(root, &steps)
}

/// Read a scalar as a string (numbers and booleans are rendered)
#[must_use]
pub fn get_str(root: &Value, path: &str) -> Option<String> {
    match get_by_path(root, path)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Read a list of non-empty strings; a single string counts as a list of one
///
/// Nested arrays, as produced by chained projections (`a[].b[].url`), are
/// flattened in document order.
#[must_use]
pub fn get_string_list(root: &Value, path: &str) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(value) = get_by_path(root, path) {
        collect_strings(value, &mut out);
    }
    out
}

fn collect_strings(value: Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if !s.is_empty() => out.push(s),
        Value::Array(items) => {
            for item in items {
                collect_strings(item, out);
            }
        }
        _ => {}
    }
}

fn parse(path: &str) -> Option<Vec<Step>> {
    let mut steps = Vec::new();
    if path.is_empty() {
        return Some(steps);
    }

    for segment in path.split('.') {
        let (name, mut accessors) = match segment.find('[') {
            Some(pos) => (&segment[..pos], &segment[pos..]),
            None => (segment, ""),
        };

        if !name.is_empty() {
            steps.push(Step::Key(name.to_string()));
        } else if accessors.is_empty() {
            // "a..b" or a trailing dot
            return None;
        }

        while !accessors.is_empty() {
            let close = accessors.find(']')?;
            if !accessors.starts_with('[') {
                return None;
            }
            let inner = &accessors[1..close];
            if inner.is_empty() {
                steps.push(Step::Project);
            } else {
                steps.push(Step::Index(inner.trim().parse().ok()?));
            }
            accessors = &accessors[close + 1..];
        }
    }

    Some(steps)
}

fn resolve(node: &Value, steps: &[Step]) -> Option<Value> {
    let Some((step, rest)) = steps.split_first() else {
        return Some(node.clone());
    };

    if node.is_null() {
        return Some(Value::Null);
    }

    match step {
        Step::Key(key) => {
            let next = match node {
                Value::Object(map) => map.get(key)?,
                Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
                _ => return None,
            };
            resolve(next, rest)
        }
        Step::Index(index) => resolve(node.as_array()?.get(*index)?, rest),
        Step::Project => {
            let items = node.as_array()?;
            Some(Value::Array(
                items.iter().filter_map(|item| resolve(item, rest)).collect(),
            ))
        }
    }
}
