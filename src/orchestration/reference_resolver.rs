//! # Reference Resolver
//!
//! Rewrites a step's parameters before the tool call, replacing `${...}`
//! references with values taken from completed steps.
//!
//! Two forms are understood:
//!
//! - `${step_N.result<path>}`: `path` is a sequence of `.field` and `[index]`
//!   accessors applied to step `N`'s result.
//! - `${entity_K.field}`: the `K`-th (0-based) completed step whose tool name
//!   or result shape identifies it as `entity` (see [`EntityKind`]).
//!
//! Expressions are parsed into a [`Reference`] and evaluated separately.
//! Resolution never fails hard: an unresolvable reference is replaced by a
//! parameter-name-aware fallback and logged.

use crate::constants::{FALLBACK_LIMIT, FALLBACK_PAGE, FALLBACK_STATUS, UNRESOLVED_ID_SENTINEL};
use crate::models::StepResult;
use crate::state_machine::StepState;
use chrono::Utc;
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, ".{name}"),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceTarget {
    /// Canonical `step_N` form
    Step(usize),
    /// Legacy `entity_K` form
    Entity { name: String, ordinal: usize },
}

/// Parsed reference expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub target: ReferenceTarget,
    pub path: Vec<PathSegment>,
}

impl Reference {
    pub fn is_canonical(&self) -> bool {
        matches!(self.target, ReferenceTarget::Step(_))
    }
}

/// Closed set of entity shapes recognised by the legacy syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Facility,
    Shipment,
    Client,
    Contract,
    Unknown,
}

impl EntityKind {
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "facility" | "facilities" => Self::Facility,
            "shipment" | "shipments" => Self::Shipment,
            "client" | "clients" => Self::Client,
            "contract" | "contracts" => Self::Contract,
            _ => Self::Unknown,
        }
    }

    /// Substring that identifies a tool operating on this entity
    fn tool_stem(&self) -> Option<&'static str> {
        match self {
            Self::Facility => Some("facilit"),
            Self::Shipment => Some("shipment"),
            Self::Client => Some("client"),
            Self::Contract => Some("contract"),
            Self::Unknown => None,
        }
    }

    /// Classify a result object by its fields. An identifier (`id` or `_id`)
    /// is required; the first matching signature wins.
    pub fn classify(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::Unknown;
        };
        let has = |field: &str| object.get(field).is_some_and(|v| !v.is_null());

        if !has("id") && !has("_id") {
            return Self::Unknown;
        }

        if has("name") && (has("location") || has("address")) {
            Self::Facility
        } else if has("tracking_number") || (has("origin") && has("destination")) {
            Self::Shipment
        } else if has("email") || has("company_name") {
            Self::Client
        } else if has("contract_number") || (has("start_date") && has("end_date")) {
            Self::Contract
        } else {
            Self::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolutionError {
    #[error("malformed reference '{expression}': {reason}")]
    Parse { expression: String, reason: String },

    #[error("step {step_index} is not part of the plan")]
    StepOutOfRange { step_index: usize },

    #[error("step {step_index} is {status}, not COMPLETED")]
    StepNotCompleted {
        step_index: usize,
        status: StepState,
    },

    #[error("no completed step matches {entity}_{ordinal}")]
    NoEntityMatch { entity: String, ordinal: usize },

    #[error("cannot navigate '{segment}': {reason}")]
    Path { segment: String, reason: String },
}

/// Parse the body of a `${...}` expression
pub fn parse_reference(expression: &str) -> Result<Reference, ResolutionError> {
    ReferenceParser::new(expression).parse()
}

struct ReferenceParser<'a> {
    expression: &'a str,
    chars: Vec<char>,
    position: usize,
}

impl<'a> ReferenceParser<'a> {
    fn new(expression: &'a str) -> Self {
        Self {
            expression,
            chars: expression.trim().chars().collect(),
            position: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> ResolutionError {
        ResolutionError::Parse {
            expression: self.expression.to_string(),
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn identifier(&mut self) -> Result<String, ResolutionError> {
        let start = self.position;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            self.position += 1;
        }
        if start == self.position {
            return Err(self.error(format!("expected identifier at offset {start}")));
        }
        Ok(self.chars[start..self.position].iter().collect())
    }

    fn index(&mut self) -> Result<usize, ResolutionError> {
        let start = self.position;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.position += 1;
        }
        if start == self.position {
            return Err(self.error(format!("expected array index at offset {start}")));
        }
        let digits: String = self.chars[start..self.position].iter().collect();
        let index = digits
            .parse()
            .map_err(|_| self.error(format!("array index {digits} is too large")))?;

        if self.peek() != Some(']') {
            return Err(self.error("unterminated array index"));
        }
        self.position += 1;
        Ok(index)
    }

    fn parse(mut self) -> Result<Reference, ResolutionError> {
        let head = self.identifier()?;
        let target = Self::target(&head).ok_or_else(|| {
            self.error(format!("'{head}' is neither step_N nor entity_N"))
        })?;

        let mut path = Vec::new();
        while let Some(c) = self.peek() {
            self.position += 1;
            match c {
                '.' => path.push(PathSegment::Field(self.identifier()?)),
                '[' => path.push(PathSegment::Index(self.index()?)),
                other => {
                    return Err(self.error(format!("unexpected '{other}'")));
                }
            }
        }

        // `step_N.result...` navigates the result; the `result` segment is the root
        if matches!(target, ReferenceTarget::Step(_))
            && matches!(path.first(), Some(PathSegment::Field(field)) if field == "result")
        {
            path.remove(0);
        }

        Ok(Reference { target, path })
    }

    fn target(head: &str) -> Option<ReferenceTarget> {
        let (name, ordinal) = head.rsplit_once('_')?;
        let ordinal: usize = ordinal.parse().ok()?;
        if name.is_empty() {
            return None;
        }
        if name == "step" {
            Some(ReferenceTarget::Step(ordinal))
        } else {
            Some(ReferenceTarget::Entity {
                name: name.to_string(),
                ordinal,
            })
        }
    }
}

/// Walk `path` from `root`
pub fn navigate<'v>(root: &'v Value, path: &[PathSegment]) -> Result<&'v Value, ResolutionError> {
    let mut current = root;
    for segment in path {
        current = match (segment, current) {
            (PathSegment::Field(name), Value::Object(map)) => {
                map.get(name).ok_or_else(|| ResolutionError::Path {
                    segment: segment.to_string(),
                    reason: "property not found".to_string(),
                })?
            }
            (PathSegment::Index(index), Value::Array(items)) => {
                items.get(*index).ok_or_else(|| ResolutionError::Path {
                    segment: segment.to_string(),
                    reason: format!("index out of bounds (length {})", items.len()),
                })?
            }
            (_, other) => {
                return Err(ResolutionError::Path {
                    segment: segment.to_string(),
                    reason: format!("cannot index into {}", json_type(other)),
                })
            }
        };
    }
    Ok(current)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Fallback substituted for an unresolvable reference, chosen by parameter name
pub fn fallback_for_parameter(parameter: Option<&str>) -> Value {
    let Some(name) = parameter else {
        return Value::Null;
    };
    let lower = name.to_lowercase();

    if lower.starts_with("is_") || lower.starts_with("has_") || lower.starts_with("enable_") {
        Value::Bool(false)
    } else if lower.contains("_id") || lower.ends_with("id") {
        Value::String(UNRESOLVED_ID_SENTINEL.to_string())
    } else if lower.contains("page") {
        Value::from(FALLBACK_PAGE)
    } else if lower.contains("limit") {
        Value::from(FALLBACK_LIMIT)
    } else if lower.contains("date") || lower.contains("time") {
        Value::String(Utc::now().to_rfc3339())
    } else if lower.contains("status") {
        Value::String(FALLBACK_STATUS.to_string())
    } else {
        Value::Null
    }
}

/// A `${...}` occurrence inside a string
struct Placeholder<'s> {
    start: usize,
    end: usize,
    expression: &'s str,
}

fn find_placeholders(text: &str) -> Vec<Placeholder<'_>> {
    let mut placeholders = Vec::new();
    let mut offset = 0;
    while let Some(open) = text[offset..].find("${") {
        let start = offset + open;
        let Some(close) = text[start + 2..].find('}') else {
            break;
        };
        let end = start + 2 + close + 1;
        placeholders.push(Placeholder {
            start,
            end,
            expression: &text[start + 2..end - 1],
        });
        offset = end;
    }
    placeholders
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceResolver;

impl ReferenceResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve every reference in a parameter tree against prior step results
    pub fn resolve_params(&self, params: &Value, step_results: &[StepResult]) -> Value {
        self.resolve_value(params, None, step_results)
    }

    fn resolve_value(&self, value: &Value, key: Option<&str>, step_results: &[StepResult]) -> Value {
        match value {
            Value::String(text) => self.resolve_string(text, key, step_results),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.resolve_value(item, key, step_results))
                    .collect(),
            ),
            Value::Object(map) => {
                let resolved: Map<String, Value> = map
                    .iter()
                    .map(|(name, item)| {
                        (
                            name.clone(),
                            self.resolve_value(item, Some(name.as_str()), step_results),
                        )
                    })
                    .collect();
                Value::Object(resolved)
            }
            other => other.clone(),
        }
    }

    fn resolve_string(&self, text: &str, key: Option<&str>, step_results: &[StepResult]) -> Value {
        if !text.contains("${") {
            return Value::String(text.to_string());
        }
        let placeholders = find_placeholders(text);
        if placeholders.is_empty() {
            return Value::String(text.to_string());
        }

        // A lone reference keeps the JSON type of the resolved value
        if let [only] = placeholders.as_slice() {
            if only.start == 0 && only.end == text.len() {
                return self.resolve_or_fallback(only.expression, key, step_results);
            }
        }

        let mut interpolated = String::with_capacity(text.len());
        let mut cursor = 0;
        for placeholder in &placeholders {
            interpolated.push_str(&text[cursor..placeholder.start]);
            match self.resolve_or_fallback(placeholder.expression, key, step_results) {
                Value::String(s) => interpolated.push_str(&s),
                Value::Null => {}
                other => interpolated.push_str(&other.to_string()),
            }
            cursor = placeholder.end;
        }
        interpolated.push_str(&text[cursor..]);
        Value::String(interpolated)
    }

    fn resolve_or_fallback(
        &self,
        expression: &str,
        key: Option<&str>,
        step_results: &[StepResult],
    ) -> Value {
        let resolved = parse_reference(expression)
            .and_then(|reference| self.resolve_reference(&reference, step_results));

        match resolved {
            Ok(value) => {
                debug!(expression = expression, parameter = key, "Resolved reference");
                value
            }
            Err(error) => {
                let fallback = fallback_for_parameter(key);
                warn!(
                    expression = expression,
                    parameter = key,
                    error = %error,
                    fallback = %fallback,
                    "Reference could not be resolved, using fallback"
                );
                fallback
            }
        }
    }

    pub fn resolve_reference(
        &self,
        reference: &Reference,
        step_results: &[StepResult],
    ) -> Result<Value, ResolutionError> {
        match &reference.target {
            ReferenceTarget::Step(step_index) => {
                let step = step_results
                    .iter()
                    .find(|result| result.step_index == *step_index)
                    .ok_or(ResolutionError::StepOutOfRange {
                        step_index: *step_index,
                    })?;
                if step.status != StepState::Completed {
                    return Err(ResolutionError::StepNotCompleted {
                        step_index: *step_index,
                        status: step.status,
                    });
                }
                match &step.result {
                    Some(root) => navigate(root, &reference.path).cloned(),
                    None => navigate(&Value::Null, &reference.path).cloned(),
                }
            }
            ReferenceTarget::Entity { name, ordinal } => {
                let entity = self
                    .find_entities(name, step_results)
                    .into_iter()
                    .nth(*ordinal)
                    .ok_or_else(|| ResolutionError::NoEntityMatch {
                        entity: name.clone(),
                        ordinal: *ordinal,
                    })?;
                navigate(entity, &reference.path).cloned()
            }
        }
    }

    /// Completed step results that look like `name`, in plan order. Array
    /// results contribute their first element.
    fn find_entities<'r>(&self, name: &str, step_results: &'r [StepResult]) -> Vec<&'r Value> {
        let kind = EntityKind::from_name(name);
        let lower = name.to_lowercase();
        let stem = kind.tool_stem().unwrap_or(lower.as_str());

        let mut completed: Vec<&StepResult> = step_results
            .iter()
            .filter(|result| result.status == StepState::Completed)
            .collect();
        completed.sort_by_key(|result| result.step_index);

        completed
            .into_iter()
            .filter_map(|result| {
                let data = result.result.as_ref()?;
                let candidate = match data {
                    Value::Array(items) => items.first()?,
                    other => other,
                };
                let by_tool = result.tool.to_lowercase().contains(stem);
                let by_shape = kind != EntityKind::Unknown && EntityKind::classify(candidate) == kind;
                (by_tool || by_shape).then_some(candidate)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Step;
    use crate::state_machine::StepEvent;
    use serde_json::json;

    fn completed(index: usize, tool: &str, data: Value) -> StepResult {
        let mut result = StepResult::pending(index, &Step::new(tool, json!({})));
        result.apply(StepEvent::Start).unwrap();
        result.apply(StepEvent::Complete(data)).unwrap();
        result
    }

    #[test]
    fn test_parse_canonical_reference() {
        let reference = parse_reference("step_2.result[0].address.city").unwrap();
        assert_eq!(reference.target, ReferenceTarget::Step(2));
        assert_eq!(
            reference.path,
            vec![
                PathSegment::Index(0),
                PathSegment::Field("address".into()),
                PathSegment::Field("city".into()),
            ]
        );
        assert!(reference.is_canonical());
    }

    #[test]
    fn test_parse_entity_reference() {
        let reference = parse_reference("facility_1.id").unwrap();
        assert_eq!(
            reference.target,
            ReferenceTarget::Entity {
                name: "facility".into(),
                ordinal: 1
            }
        );
        assert!(!reference.is_canonical());
    }

    #[test]
    fn test_parse_rejects_malformed_expressions() {
        assert!(parse_reference("step_x.result").is_err());
        assert!(parse_reference("step_0.result[abc]").is_err());
        assert!(parse_reference("step_0.result[1").is_err());
        assert!(parse_reference("").is_err());
        assert!(parse_reference("step_0..id").is_err());
    }

    #[test]
    fn test_whole_string_reference_keeps_type() {
        let resolver = ReferenceResolver::new();
        let results = vec![completed(
            0,
            "facilities_list",
            json!([{"id": "f1", "capacity": 40, "tags": ["cold"]}]),
        )];

        let params = json!({
            "facility_id": "${step_0.result[0].id}",
            "capacity": "${step_0.result[0].capacity}",
            "tags": "${step_0.result[0].tags}",
            "page": 2
        });
        let resolved = resolver.resolve_params(&params, &results);

        assert_eq!(resolved["facility_id"], json!("f1"));
        assert_eq!(resolved["capacity"], json!(40));
        assert_eq!(resolved["tags"], json!(["cold"]));
        assert_eq!(resolved["page"], json!(2));
    }

    #[test]
    fn test_embedded_references_interpolate() {
        let resolver = ReferenceResolver::new();
        let results = vec![completed(0, "facility_get", json!({"id": "f1", "name": "North"}))];

        let resolved = resolver.resolve_params(
            &json!({"note": "Facility ${step_0.result.name} (${step_0.result.id})"}),
            &results,
        );
        assert_eq!(resolved["note"], json!("Facility North (f1)"));
    }

    #[test]
    fn test_nested_objects_and_arrays() {
        let resolver = ReferenceResolver::new();
        let results = vec![completed(0, "client_get", json!({"id": "c1"}))];

        let resolved = resolver.resolve_params(
            &json!({"filter": {"client_ids": ["${step_0.result.id}", "${step_4.result.id}"]}}),
            &results,
        );
        assert_eq!(
            resolved["filter"]["client_ids"],
            json!(["c1", UNRESOLVED_ID_SENTINEL])
        );
    }

    #[test]
    fn test_out_of_range_reference_falls_back() {
        let resolver = ReferenceResolver::new();
        let results = vec![completed(0, "shipments_list", json!([]))];

        let resolved = resolver.resolve_params(
            &json!({
                "x": "${step_5.result.x}",
                "page": "${step_5.result.page}",
                "limit": "${step_5.result.limit}",
                "status": "${step_5.result.status}",
                "is_active": "${step_5.result.active}",
                "start_date": "${step_5.result.date}"
            }),
            &results,
        );
        assert_eq!(resolved["x"], Value::Null);
        assert_eq!(resolved["page"], json!(1));
        assert_eq!(resolved["limit"], json!(10));
        assert_eq!(resolved["status"], json!("active"));
        assert_eq!(resolved["is_active"], json!(false));
        assert!(resolved["start_date"].as_str().is_some());
    }

    #[test]
    fn test_incomplete_step_and_bad_path_fall_back() {
        let resolver = ReferenceResolver::new();
        let pending = StepResult::pending(0, &Step::new("facility_get", json!({})));
        let done = completed(1, "shipments_list", json!([{"id": "s1"}]));
        let results = vec![pending, done];

        let resolved = resolver.resolve_params(
            &json!({
                "facility_id": "${step_0.result.id}",
                "shipment_id": "${step_1.result[3].id}",
                "carrier": "${step_1.result.carrier}"
            }),
            &results,
        );
        assert_eq!(resolved["facility_id"], json!(UNRESOLVED_ID_SENTINEL));
        assert_eq!(resolved["shipment_id"], json!(UNRESOLVED_ID_SENTINEL));
        assert_eq!(resolved["carrier"], Value::Null);
    }

    #[test]
    fn test_entity_reference_by_tool_name_and_shape() {
        let resolver = ReferenceResolver::new();
        let results = vec![
            completed(0, "facilities_list", json!([{"id": "f1", "name": "A", "location": "X"}])),
            completed(1, "lookup", json!({"id": "f2", "name": "B", "address": "Y"})),
            completed(2, "clients_list", json!([{"id": "c1", "email": "a@b.co"}])),
        ];

        let resolved = resolver.resolve_params(
            &json!({
                "first": "${facility_0.id}",
                "second": "${facility_1.id}",
                "client_id": "${client_0.id}",
                "missing_id": "${contract_0.id}"
            }),
            &results,
        );
        assert_eq!(resolved["first"], json!("f1"));
        assert_eq!(resolved["second"], json!("f2"));
        assert_eq!(resolved["client_id"], json!("c1"));
        assert_eq!(resolved["missing_id"], json!(UNRESOLVED_ID_SENTINEL));
    }

    #[test]
    fn test_fallback_by_parameter_name() {
        let sentinel = json!(UNRESOLVED_ID_SENTINEL);
        assert_eq!(fallback_for_parameter(Some("id")), sentinel);
        assert_eq!(fallback_for_parameter(Some("facility_id")), sentinel);
        assert_eq!(fallback_for_parameter(Some("facilityId")), sentinel);
        assert_eq!(fallback_for_parameter(Some("facilityid")), sentinel);
        assert_eq!(fallback_for_parameter(Some("is_active")), json!(false));
        assert_eq!(fallback_for_parameter(Some("page")), json!(FALLBACK_PAGE));
        assert_eq!(fallback_for_parameter(Some("carrier")), Value::Null);
        assert_eq!(fallback_for_parameter(None), Value::Null);
    }

    #[test]
    fn test_entity_classifier() {
        assert_eq!(
            EntityKind::classify(&json!({"id": 1, "name": "Depot", "location": "Leeds"})),
            EntityKind::Facility
        );
        assert_eq!(
            EntityKind::classify(&json!({"_id": "s", "origin": "A", "destination": "B"})),
            EntityKind::Shipment
        );
        assert_eq!(
            EntityKind::classify(&json!({"id": "c", "company_name": "Acme"})),
            EntityKind::Client
        );
        assert_eq!(
            EntityKind::classify(&json!({"id": "k", "start_date": "2024-01-01", "end_date": "2025-01-01"})),
            EntityKind::Contract
        );
        assert_eq!(
            EntityKind::classify(&json!({"name": "Depot", "location": "Leeds"})),
            EntityKind::Unknown
        );
        assert_eq!(EntityKind::classify(&json!([1, 2])), EntityKind::Unknown);
    }

    #[test]
    fn test_strings_without_references_pass_through() {
        let resolver = ReferenceResolver::new();
        let params = json!({"name": "plain", "braces": "{not a ref}", "open": "${unterminated"});
        assert_eq!(resolver.resolve_params(&params, &[]), params);
    }
}
