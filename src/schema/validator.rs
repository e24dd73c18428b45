//! Input validation against a declarative schema.
//!
//! The validator is a pure function: it performs no I/O and never mutates
//! the input it was given. Evaluation order is fixed — alias resolution,
//! type coercion, choices, defaults, sub-schema recursion, then conditional
//! constraints in the order `required_if` → `required_one_of` →
//! `mutually_exclusive` → `required_together`. Later checks only run on
//! inputs that survived earlier ones.
//!
//! On success the caller receives a canonical copy of the input: keys under
//! their primary names, values coerced, defaults applied, ordered by schema
//! declaration. On failure it receives every structured error found, each
//! carrying a breadcrumb path such as `payload[2].interfaces[0].vlanId`.

use crate::error::ErrorKind;
use crate::schema::{Constraints, ParamKind, ParamSpec, Schema};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// A single structured validation failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Taxonomy kind: `type`, `choice`, `missing_required`, `conflict`,
    /// `unknown_key`, or `schema_bug`.
    pub kind: ErrorKind,
    /// Breadcrumb path of the offending input.
    pub breadcrumb: String,
    /// Human-readable description.
    pub message: String,
}

impl ValidationError {
    fn new(kind: ErrorKind, breadcrumb: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            breadcrumb: breadcrumb.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.breadcrumb.is_empty() {
            write!(f, "{}: {}", self.kind, self.message)
        } else {
            write!(f, "{} at '{}': {}", self.kind, self.breadcrumb, self.message)
        }
    }
}

/// Validate `input` against `schema` and `constraints`.
///
/// Returns the normalized mapping, or every validation error found.
pub fn validate(
    schema: &Schema,
    constraints: &Constraints,
    input: &Map<String, Value>,
) -> Result<IndexMap<String, Value>, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let normalized = validate_mapping(schema, input, "", &mut errors);
    if errors.is_empty() {
        evaluate_conditionals(constraints, &normalized, &mut errors);
    }
    if errors.is_empty() {
        Ok(normalized)
    } else {
        Err(errors)
    }
}

/// Phases 1-5 for one mapping level: aliases, coercion, choices, defaults,
/// recursion. Shared between the top level and sub-schema levels.
fn validate_mapping(
    schema: &Schema,
    input: &Map<String, Value>,
    prefix: &str,
    errors: &mut Vec<ValidationError>,
) -> IndexMap<String, Value> {
    // Phase 1: alias resolution. Two input keys naming the same parameter
    // (e.g. the primary name plus an alias) are a conflict.
    let mut resolved: HashMap<&str, &Value> = HashMap::new();
    for (key, value) in input {
        match schema.resolve(key) {
            Some((canonical, _)) => {
                if resolved.insert(canonical, value).is_some() {
                    errors.push(ValidationError::new(
                        ErrorKind::Conflict,
                        crumb(prefix, canonical),
                        format!("parameter '{}' supplied more than once via aliases", canonical),
                    ));
                }
            }
            None => {
                errors.push(ValidationError::new(
                    ErrorKind::UnknownKey,
                    crumb(prefix, key),
                    "not a recognized parameter".to_string(),
                ));
            }
        }
    }

    // Phases 2-5, walking the schema in declaration order so the normalized
    // copy is canonical.
    let mut out = IndexMap::new();
    for (name, spec) in schema.iter() {
        let breadcrumb = crumb(prefix, name);
        match resolved.get(name) {
            Some(value) => {
                let before = errors.len();
                if let Some(coerced) = coerce(spec, value, &breadcrumb, errors) {
                    // Choices run only on values that survived coercion.
                    if before == errors.len() {
                        check_choices(spec, &coerced, &breadcrumb, errors);
                    }
                    out.insert(name.to_string(), coerced);
                }
            }
            None => {
                if let Some(default) = &spec.default {
                    out.insert(name.to_string(), default.clone());
                } else if spec.required {
                    errors.push(ValidationError::new(
                        ErrorKind::MissingRequired,
                        breadcrumb,
                        "required parameter is absent".to_string(),
                    ));
                }
            }
        }
    }
    out
}

/// Coerce a value to the declared type, recursing into sub-schemas.
fn coerce(
    spec: &ParamSpec,
    value: &Value,
    breadcrumb: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<Value> {
    match spec.kind {
        ParamKind::Str => coerce_str(value)
            .or_else(|| type_error(errors, breadcrumb, "string", value)),
        ParamKind::Int => coerce_int(value)
            .or_else(|| type_error(errors, breadcrumb, "integer", value)),
        ParamKind::Float => coerce_float(value)
            .or_else(|| type_error(errors, breadcrumb, "number", value)),
        ParamKind::Bool => coerce_bool(value)
            .or_else(|| type_error(errors, breadcrumb, "boolean", value)),
        ParamKind::Map => match value {
            Value::Object(_) => Some(value.clone()),
            _ => type_error(errors, breadcrumb, "mapping", value),
        },
        ParamKind::Dict => match value {
            Value::Object(obj) => match &spec.sub {
                Some(sub) => {
                    let nested = validate_mapping(sub, obj, &format!("{}.", breadcrumb), errors);
                    Some(Value::Object(to_json_map(nested)))
                }
                None => {
                    errors.push(ValidationError::new(
                        ErrorKind::SchemaBug,
                        breadcrumb,
                        "parameter declared as a sub-schema mapping but no sub-schema is attached"
                            .to_string(),
                    ));
                    None
                }
            },
            _ => type_error(errors, breadcrumb, "mapping", value),
        },
        ParamKind::List => {
            let items: Vec<Value> = match value {
                Value::Array(items) => items.clone(),
                // A bare scalar becomes a single-element list only when the
                // schema marks the list as scalar-promotable.
                other if spec.promote_scalar => vec![other.clone()],
                _ => return type_error(errors, breadcrumb, "list", value),
            };
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let item_crumb = format!("{}[{}]", breadcrumb, index);
                if let Some(sub) = &spec.sub {
                    match item {
                        Value::Object(obj) => {
                            let nested =
                                validate_mapping(sub, obj, &format!("{}.", item_crumb), errors);
                            out.push(Value::Object(to_json_map(nested)));
                        }
                        _ => {
                            let _ = type_error(errors, &item_crumb, "mapping", item);
                        }
                    }
                } else {
                    let element = ParamSpec {
                        kind: spec.elements.clone().unwrap_or(ParamKind::Str),
                        ..ParamSpec::str(spec.name.clone())
                    };
                    if let Some(coerced) = coerce(&element, item, &item_crumb, errors) {
                        out.push(coerced);
                    }
                }
            }
            Some(Value::Array(out))
        }
    }
}

fn coerce_str(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => Some(Value::String(s.clone())),
        Value::Number(n) => Some(Value::String(n.to_string())),
        Value::Bool(b) => Some(Value::String(b.to_string())),
        _ => None,
    }
}

fn coerce_int(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) => n.as_i64().map(Value::from),
        // Strings convert only when the target type is numeric.
        Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
        _ => None,
    }
}

fn coerce_float(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) => n.as_f64().map(Value::from),
        Value::String(s) => s.trim().parse::<f64>().ok().map(Value::from),
        _ => None,
    }
}

fn coerce_bool(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(b) => Some(Value::Bool(*b)),
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(Value::Bool(true)),
            "false" | "no" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

fn check_choices(
    spec: &ParamSpec,
    value: &Value,
    breadcrumb: &str,
    errors: &mut Vec<ValidationError>,
) {
    if let Some(choices) = &spec.choices {
        if !choices.contains(value) {
            let allowed: Vec<String> = choices.iter().map(value_repr).collect();
            errors.push(ValidationError::new(
                ErrorKind::Choice,
                breadcrumb,
                format!(
                    "got {}, must be one of: {}",
                    value_repr(value),
                    allowed.join(", ")
                ),
            ));
        }
    }
}

/// Phase 6: conditional constraints over the default-applied mapping.
fn evaluate_conditionals(
    constraints: &Constraints,
    normalized: &IndexMap<String, Value>,
    errors: &mut Vec<ValidationError>,
) {
    let present = |name: &str| normalized.contains_key(name);

    for rule in &constraints.required_if {
        if normalized.get(rule.param.as_str()) == Some(&rule.value) {
            for name in &rule.then_required {
                if !present(name) {
                    errors.push(ValidationError::new(
                        ErrorKind::MissingRequired,
                        name.clone(),
                        format!(
                            "required because '{}' is {}",
                            rule.param,
                            value_repr(&rule.value)
                        ),
                    ));
                }
            }
        }
    }

    for set in &constraints.required_one_of {
        if !set.iter().any(|name| present(name)) {
            errors.push(ValidationError::new(
                ErrorKind::MissingRequired,
                set.join("|"),
                format!("one of {} is required", set.join(", ")),
            ));
        }
    }

    for set in &constraints.mutually_exclusive {
        let supplied: Vec<&str> = set
            .iter()
            .filter(|name| present(name))
            .map(String::as_str)
            .collect();
        if supplied.len() > 1 {
            errors.push(ValidationError::new(
                ErrorKind::Conflict,
                supplied.join("|"),
                format!("parameters are mutually exclusive: {}", supplied.join(", ")),
            ));
        }
    }

    for set in &constraints.required_together {
        let supplied = set.iter().filter(|name| present(name)).count();
        if supplied != 0 && supplied != set.len() {
            errors.push(ValidationError::new(
                ErrorKind::MissingRequired,
                set.join("|"),
                format!("parameters are required together: {}", set.join(", ")),
            ));
        }
    }
}

fn crumb(prefix: &str, name: &str) -> String {
    format!("{}{}", prefix, name)
}

fn type_error(
    errors: &mut Vec<ValidationError>,
    breadcrumb: &str,
    expected: &str,
    got: &Value,
) -> Option<Value> {
    errors.push(ValidationError::new(
        ErrorKind::Type,
        breadcrumb,
        format!("expected {}, got {}", expected, value_repr(got)),
    ));
    None
}

fn value_repr(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s),
        other => other.to_string(),
    }
}

fn to_json_map(map: IndexMap<String, Value>) -> Map<String, Value> {
    map.into_iter().collect()
}
