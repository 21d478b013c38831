//! Config validation - warns about unknown fields

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Validate JSON config and warn about unknown fields.
pub fn warn_unknown_fields(content: &str, config_name: &str) {
    let Ok(value) = serde_json::from_str::<Value>(content) else {
        return;
    };

    let expected = expected_config_keys();
    let unknowns = find_unknown_keys(&value, &expected, "");

    for path in unknowns {
        warn!("Unknown config field in {config_name}: {path}");
    }
}

/// Find unknown keys in JSON value compared to expected keys.
/// Returns paths like "search.unknownField" for unknown fields.
/// Arrays are walked element-wise against the same expected keys.
fn find_unknown_keys(value: &Value, expected: &ExpectedKeys, prefix: &str) -> Vec<String> {
    let mut unknowns = Vec::new();

    let Value::Object(obj) = value else {
        return unknowns;
    };

    for (key, child) in obj {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        if let Some(nested) = expected.nested.get(key.as_str()) {
            match child {
                Value::Array(items) => {
                    for (i, item) in items.iter().enumerate() {
                        unknowns.extend(find_unknown_keys(item, nested, &format!("{path}[{i}]")));
                    }
                }
                _ => unknowns.extend(find_unknown_keys(child, nested, &path)),
            }
        } else if !expected.fields.contains(key.as_str()) {
            unknowns.push(path);
        }
    }

    unknowns
}

/// Expected keys for a config section.
/// `fields` are leaf fields, `nested` are nested objects with their own expected keys.
struct ExpectedKeys {
    fields: HashSet<&'static str>,
    nested: HashMap<&'static str, ExpectedKeys>,
}

impl ExpectedKeys {
    fn new(fields: &[&'static str]) -> Self {
        Self {
            fields: fields.iter().copied().collect(),
            nested: HashMap::new(),
        }
    }

    fn with_nested(mut self, key: &'static str, nested: ExpectedKeys) -> Self {
        self.nested.insert(key, nested);
        self
    }
}

fn expected_config_keys() -> ExpectedKeys {
    ExpectedKeys::new(&["defaultEnvironment"])
        .with_nested(
            "connection",
            ExpectedKeys::new(&["baseUrl", "timeoutSecs"]),
        )
        .with_nested("environments", ExpectedKeys::new(&["name", "label"]))
        .with_nested("search", ExpectedKeys::new(&["pageSize"]))
        .with_nested("history", ExpectedKeys::new(&["persist"]))
        .with_nested("stats", ExpectedKeys::new(&["refreshIntervalSecs"]))
}
