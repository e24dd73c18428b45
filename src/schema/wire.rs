//! Caller-name to wire-name translation.
//!
//! Inputs arrive in snake_case; the controller expects camelCase. A
//! per-parameter `wire_name` overrides the default translation. Translation
//! is applied after validation and only to fields that will be serialized —
//! diagnostics and logging always use the caller-facing name. The translator
//! is a pure function over schema plus input.

use crate::schema::{ParamSpec, Schema};
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Placeholder written in place of secret values when a body is rendered
/// for a log line.
pub const REDACTED: &str = "[REDACTED]";

/// Default translation: snake_case (or dash-case) to camelCase.
///
/// Already-camel names pass through unchanged.
pub fn camelize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for (i, ch) in name.chars().enumerate() {
        match ch {
            '_' | '-' => upper_next = true,
            _ if upper_next => {
                out.extend(ch.to_uppercase());
                upper_next = false;
            }
            _ if i == 0 => out.extend(ch.to_lowercase()),
            _ => out.push(ch),
        }
    }
    out
}

/// The wire-facing key for a parameter.
pub fn wire_key(spec: &ParamSpec) -> String {
    match &spec.wire_name {
        Some(name) => name.clone(),
        None => camelize(&spec.name),
    }
}

/// Translate a normalized mapping to wire form.
///
/// Session options never reach the wire. With `redact_secrets` set, `no_log`
/// values are replaced by [`REDACTED`] — used when rendering a request body
/// for diagnostics.
pub fn to_wire(
    schema: &Schema,
    normalized: &IndexMap<String, Value>,
    redact_secrets: bool,
) -> Map<String, Value> {
    let keys: Vec<&str> = normalized.keys().map(String::as_str).collect();
    to_wire_subset(schema, normalized, &keys, redact_secrets)
}

/// Translate a named subset of a normalized mapping to wire form.
pub fn to_wire_subset(
    schema: &Schema,
    normalized: &IndexMap<String, Value>,
    keys: &[&str],
    redact_secrets: bool,
) -> Map<String, Value> {
    let mut out = Map::new();
    for key in keys {
        let Some(spec) = schema.get(key) else {
            continue;
        };
        if spec.session_option {
            continue;
        }
        if let Some(value) = normalized.get(*key) {
            out.insert(wire_key(spec), wire_value(spec, value, redact_secrets));
        }
    }
    out
}

/// Translate one value, recursing into sub-schemas.
pub(crate) fn wire_value(spec: &ParamSpec, value: &Value, redact_secrets: bool) -> Value {
    if spec.no_log && redact_secrets {
        return Value::String(REDACTED.to_string());
    }
    match (&spec.sub, value) {
        (Some(sub), Value::Object(obj)) => Value::Object(wire_object(sub, obj, redact_secrets)),
        (Some(sub), Value::Array(items)) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(obj) => Value::Object(wire_object(sub, obj, redact_secrets)),
                    other => other.clone(),
                })
                .collect(),
        ),
        _ => value.clone(),
    }
}

fn wire_object(sub: &Schema, obj: &Map<String, Value>, redact_secrets: bool) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in obj {
        match sub.get(key) {
            Some(spec) => {
                out.insert(wire_key(spec), wire_value(spec, value, redact_secrets));
            }
            // Keys outside the sub-schema cannot appear in validated input;
            // pass through unchanged if they somehow do.
            None => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    out
}
