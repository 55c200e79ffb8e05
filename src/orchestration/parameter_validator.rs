//! # Parameter Validation
//!
//! Shape checks on resolved step parameters, run after reference resolution
//! and before the tool call. Checks are driven by parameter names: identifier,
//! date/time, email and paging fields each have a rule. All problems in a
//! parameter tree are collected into one [`ToolplanError::ParameterValidation`].

use crate::error::{Result, ToolplanError};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]*)\}").expect("placeholder pattern is valid"));

static CANONICAL_REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*step_\d+\.result(\.[A-Za-z0-9_-]+|\[\d+\])*\s*$")
        .expect("canonical reference pattern is valid")
});

static OBJECT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{24}$").expect("object id pattern is valid"));

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("uuid pattern is valid")
});

static TOKEN_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9-]+$").expect("token id pattern is valid"));

static ISO_8601_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\d{4}-\d{2}-\d{2}([T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?)?$",
    )
    .expect("iso 8601 pattern is valid")
});

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"));

fn is_id_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    lower == "id"
        || lower == "_id"
        || lower.ends_with("_id")
        || lower.ends_with("_ids")
        || key.ends_with("Id")
        || key.ends_with("Ids")
}

/// Lowercase name segments, split on `_`, `-` and camelCase boundaries
fn name_segments(key: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut previous_lower = false;

    for ch in key.chars() {
        if ch == '_' || ch == '-' {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            }
            previous_lower = false;
            continue;
        }
        if ch.is_uppercase() && previous_lower && !current.is_empty() {
            segments.push(std::mem::take(&mut current));
        }
        previous_lower = ch.is_lowercase() || ch.is_ascii_digit();
        current.extend(ch.to_lowercase());
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn has_segment(key: &str, wanted: &[&str]) -> bool {
    name_segments(key)
        .iter()
        .any(|segment| wanted.contains(&segment.as_str()))
}

fn is_date_key(key: &str) -> bool {
    let segments = name_segments(key);
    segments
        .iter()
        .any(|segment| matches!(segment.as_str(), "date" | "dates" | "time" | "timestamp"))
        || (segments.len() > 1 && segments.last().is_some_and(|last| last == "at"))
}

fn is_email_key(key: &str) -> bool {
    key.to_lowercase().contains("email")
}

fn is_paging_key(key: &str) -> bool {
    has_segment(key, &["page", "limit", "count", "offset"])
}

fn is_valid_identifier(value: &str) -> bool {
    OBJECT_ID_RE.is_match(value) || UUID_RE.is_match(value) || TOKEN_ID_RE.is_match(value)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterValidator;

impl ParameterValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, step_index: usize, params: &Value) -> Result<()> {
        let errors = self.collect_errors(params);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ToolplanError::ParameterValidation { step_index, errors })
        }
    }

    /// Every problem in the parameter tree, as human-readable messages
    pub fn collect_errors(&self, params: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        self.check_value("params", None, params, &mut errors);
        errors
    }

    fn check_value(&self, path: &str, key: Option<&str>, value: &Value, errors: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                for (name, item) in map {
                    self.check_value(&format!("{path}.{name}"), Some(name), item, errors);
                }
            }
            // Array elements are checked against the enclosing parameter name
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    self.check_value(&format!("{path}[{index}]"), key, item, errors);
                }
            }
            Value::String(text) => self.check_string(path, key, text, errors),
            Value::Number(number) => {
                if key.is_some_and(is_paging_key) && number.as_f64().is_some_and(|n| n < 0.0) {
                    errors.push(format!("{path} must not be negative (got {number})"));
                }
            }
            Value::Bool(_) => {
                if key.is_some_and(is_id_key) {
                    errors.push(format!("{path} must be a string or number identifier"));
                }
            }
            Value::Null => {}
        }
    }

    fn check_string(&self, path: &str, key: Option<&str>, text: &str, errors: &mut Vec<String>) {
        if text == "null" {
            errors.push(format!("{path} is the literal string \"null\""));
            return;
        }

        let mut unresolved = false;
        for capture in PLACEHOLDER_RE.captures_iter(text) {
            let expression = capture.get(1).map_or("", |m| m.as_str());
            if !CANONICAL_REFERENCE_RE.is_match(expression) {
                errors.push(format!("{path} contains unresolved reference ${{{expression}}}"));
                unresolved = true;
            }
        }
        if unresolved {
            return;
        }

        let Some(key) = key else {
            return;
        };

        if is_id_key(key) && !is_valid_identifier(text) {
            errors.push(format!("{path} is not a valid identifier: '{text}'"));
        } else if is_date_key(key) && !ISO_8601_RE.is_match(text) {
            errors.push(format!("{path} is not an ISO 8601 date: '{text}'"));
        } else if is_email_key(key) && !EMAIL_RE.is_match(text) {
            errors.push(format!("{path} is not a valid email address: '{text}'"));
        }
    }
}
