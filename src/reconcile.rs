//! Idempotent state reconciliation for CRUD-shaped modules.
//!
//! Given a desired record and the resource's read/create/update/delete
//! descriptors, the engine locates the existing record, diffs it against the
//! desired state field by field, performs only the necessary mutation, and
//! reports `changed` honestly. Comparison rules:
//!
//! - a field missing on the desired side is not compared ("do not care");
//! - lists marked unordered compare as sets, others positionally;
//! - nested sub-schemas recurse with the same rules;
//! - secret fields the server never returns compare by presence — supplying
//!   one always implies an update.
//!
//! Update and delete paths bind their identifier from the *existing* record,
//! not the desired one, so a rename cannot address the wrong resource. In
//! check mode the engine computes the decision and reports what would
//! change without issuing any mutating call.

use crate::client::{Outcome, Pipeline};
use crate::endpoint::{bind, EndpointRegistry, EndpointSpec};
use crate::error::{Error, Result};
use crate::schema::wire::{wire_key, wire_value};
use crate::schema::{ParamKind, ParamSpec, Schema};
use crate::task::{poll_task, poll_url, PollSettings};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Desired disposition of a CRUD resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredState {
    /// The resource should exist and match the desired record.
    Present,
    /// The resource should not exist.
    Absent,
}

impl DesiredState {
    /// Parse the validated `state` parameter.
    pub fn from_value(value: Option<&Value>) -> Result<Self> {
        match value.and_then(Value::as_str) {
            None | Some("present") => Ok(DesiredState::Present),
            Some("absent") => Ok(DesiredState::Absent),
            Some(other) => Err(Error::Choice {
                breadcrumb: "state".to_string(),
                message: format!("got '{}', must be one of: 'present', 'absent'", other),
            }),
        }
    }
}

/// The descriptors and identity rules for one CRUD resource.
pub struct CrudResource<'a> {
    /// Noun used in diagnostics, e.g. `vlan 'Lab'`.
    pub resource: String,
    /// Module schema; declares the comparison keys.
    pub schema: &'a Schema,
    /// Read endpoint; a 404 means the resource does not exist.
    pub read: Arc<EndpointSpec>,
    /// Create endpoint.
    pub create: Arc<EndpointSpec>,
    /// Update endpoint; its path consumes `id_field`.
    pub update: Arc<EndpointSpec>,
    /// Delete endpoint; its path consumes `id_field`.
    pub delete: Arc<EndpointSpec>,
    /// Wire-name key of the identifier in the existing record.
    pub id_field: &'a str,
}

/// What the engine did, for the module's envelope.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// Whether a mutating endpoint returned success (or would have, in
    /// check mode).
    pub changed: bool,
    /// Raw payload of the primary call.
    pub response: Value,
    /// Human-readable account.
    pub diagnostics: String,
}

/// Run the exists / create / update / delete decision for one resource.
#[allow(clippy::too_many_arguments)]
pub async fn reconcile(
    pipeline: &Pipeline<'_>,
    registry: &EndpointRegistry,
    crud: &CrudResource<'_>,
    desired: &IndexMap<String, Value>,
    state: DesiredState,
    check_mode: bool,
    warnings: &mut Vec<String>,
    cancel: &CancellationToken,
) -> Result<ReconcileOutcome> {
    let existing = locate(pipeline, crud, desired, warnings, cancel).await?;
    debug!(
        resource = %crud.resource,
        exists = existing.is_some(),
        ?state,
        "reconcile decision input"
    );

    match (existing, state) {
        (None, DesiredState::Absent) => Ok(ReconcileOutcome {
            changed: false,
            response: Value::Null,
            diagnostics: format!("{} is already absent", crud.resource),
        }),

        (Some(existing), DesiredState::Absent) => {
            if check_mode {
                return Ok(ReconcileOutcome {
                    changed: true,
                    response: existing,
                    diagnostics: format!("{} would be deleted", crud.resource),
                });
            }
            let id = existing_id(&existing, crud.id_field)?;
            let bound = bind(&crud.delete, crud.schema, desired, &overrides(crud, id))?;
            let response = act(pipeline, registry, &crud.delete, &bound, warnings, cancel).await?;
            Ok(ReconcileOutcome {
                changed: true,
                response,
                diagnostics: format!("{} deleted", crud.resource),
            })
        }

        (None, DesiredState::Present) => {
            if check_mode {
                return Ok(ReconcileOutcome {
                    changed: true,
                    response: Value::Null,
                    diagnostics: format!("{} would be created", crud.resource),
                });
            }
            let bound = bind(&crud.create, crud.schema, desired, &HashMap::new())?;
            let response = act(pipeline, registry, &crud.create, &bound, warnings, cancel).await?;
            verify_converged(pipeline, crud, desired, warnings, cancel).await?;
            Ok(ReconcileOutcome {
                changed: true,
                response,
                diagnostics: format!("{} created", crud.resource),
            })
        }

        (Some(existing), DesiredState::Present) => {
            let diffs = differences(crud.schema, desired, &existing);
            if diffs.is_empty() {
                return Ok(ReconcileOutcome {
                    changed: false,
                    response: existing,
                    diagnostics: format!("{} is already in the desired state", crud.resource),
                });
            }
            if check_mode {
                return Ok(ReconcileOutcome {
                    changed: true,
                    response: existing,
                    diagnostics: format!(
                        "{} would be updated (fields: {})",
                        crud.resource,
                        diffs.join(", ")
                    ),
                });
            }
            let id = existing_id(&existing, crud.id_field)?;
            let bound = bind(&crud.update, crud.schema, desired, &overrides(crud, id))?;
            let response = act(pipeline, registry, &crud.update, &bound, warnings, cancel).await?;
            verify_converged(pipeline, crud, desired, warnings, cancel).await?;
            Ok(ReconcileOutcome {
                changed: true,
                response,
                diagnostics: format!(
                    "{} updated (fields: {})",
                    crud.resource,
                    diffs.join(", ")
                ),
            })
        }
    }
}

/// Fetch the existing record; a 404-equivalent means it does not exist.
async fn locate(
    pipeline: &Pipeline<'_>,
    crud: &CrudResource<'_>,
    desired: &IndexMap<String, Value>,
    warnings: &mut Vec<String>,
    cancel: &CancellationToken,
) -> Result<Option<Value>> {
    let bound = bind(&crud.read, crud.schema, desired, &HashMap::new())?;
    match pipeline.send(&crud.read, &bound, warnings, cancel).await {
        Ok(Outcome::Complete(response)) => {
            let record = response.result().clone();
            if record.is_null() {
                Ok(None)
            } else {
                Ok(Some(record))
            }
        }
        // A read endpoint never accepts asynchronously; treat it as protocol.
        Ok(Outcome::Accepted(_)) => Err(Error::protocol(
            format!(
                "read endpoint '{}.{}' returned a task handle",
                crud.read.family, crud.read.function
            ),
            String::new(),
        )),
        Err(Error::Client { status: 404, .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Issue the mutation; pump the poller when the controller accepts
/// asynchronously.
async fn act(
    pipeline: &Pipeline<'_>,
    registry: &EndpointRegistry,
    spec: &EndpointSpec,
    bound: &crate::endpoint::Bound,
    warnings: &mut Vec<String>,
    cancel: &CancellationToken,
) -> Result<Value> {
    match pipeline.send(spec, bound, warnings, cancel).await? {
        Outcome::Complete(response) => Ok(response.body),
        Outcome::Accepted(handle) => {
            let url = poll_url(spec, &handle, registry, pipeline.session().version())?;
            let settings = PollSettings::from_config(pipeline.session().config());
            let record = poll_task(pipeline, &url, &settings, cancel).await?;
            Ok(serde_json::json!({ "task": record }))
        }
    }
}

/// Optional re-verify after a mutation: re-read and compare again.
async fn verify_converged(
    pipeline: &Pipeline<'_>,
    crud: &CrudResource<'_>,
    desired: &IndexMap<String, Value>,
    warnings: &mut Vec<String>,
    cancel: &CancellationToken,
) -> Result<()> {
    if !pipeline.session().config().validate_response_schema {
        return Ok(());
    }
    let existing = locate(pipeline, crud, desired, warnings, cancel).await?;
    match existing {
        None => Err(Error::NotConverged {
            message: format!("{} not found after mutation", crud.resource),
        }),
        Some(record) => {
            let diffs = differences(crud.schema, desired, &record);
            if diffs.is_empty() {
                Ok(())
            } else {
                Err(Error::NotConverged {
                    message: format!(
                        "{} still differs after mutation (fields: {})",
                        crud.resource,
                        diffs.join(", ")
                    ),
                })
            }
        }
    }
}

fn overrides(crud: &CrudResource<'_>, id: String) -> HashMap<String, String> {
    let mut map = HashMap::new();
    map.insert("id".to_string(), id.clone());
    // Descriptors may name the placeholder after the wire field.
    map.insert(crud.id_field.to_string(), id);
    map
}

fn existing_id(existing: &Value, id_field: &str) -> Result<String> {
    match existing.get(id_field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(Error::protocol(
            format!("existing record carries no usable '{}'", id_field),
            existing.to_string(),
        )),
    }
}

/// Names of desired fields that differ from the existing record.
///
/// The `state` selector is not a resource field and never participates.
pub fn differences(
    schema: &Schema,
    desired: &IndexMap<String, Value>,
    existing: &Value,
) -> Vec<String> {
    let Some(existing_obj) = existing.as_object() else {
        return desired.keys().cloned().collect();
    };
    let mut diffs = Vec::new();
    for (name, value) in desired {
        if name == "state" {
            continue;
        }
        let Some(spec) = schema.get(name) else {
            continue;
        };
        if spec.session_option {
            continue;
        }
        if spec.no_log {
            // Write-only fields cannot be read back; presence implies update.
            diffs.push(name.clone());
            continue;
        }
        let wire = wire_key(spec);
        let actual = existing_obj.get(&wire).or_else(|| existing_obj.get(name));
        match actual {
            None => diffs.push(name.clone()),
            Some(actual) => {
                if !value_matches(spec, value, actual) {
                    diffs.push(name.clone());
                }
            }
        }
    }
    diffs
}

/// Compare one desired value against the record, recursing per the schema.
fn value_matches(spec: &ParamSpec, desired: &Value, actual: &Value) -> bool {
    match (&spec.kind, desired) {
        (ParamKind::Dict, Value::Object(map)) => match &spec.sub {
            Some(sub) => object_matches(sub, map, actual),
            None => scalar_matches(&wire_value(spec, desired, false), actual),
        },
        (ParamKind::List, Value::Array(items)) => {
            let Some(actual_items) = actual.as_array() else {
                return false;
            };
            if items.len() != actual_items.len() {
                return false;
            }
            if spec.unordered {
                // Set comparison: every desired element must claim a distinct
                // actual element.
                let mut claimed = vec![false; actual_items.len()];
                for item in items {
                    let position = actual_items.iter().enumerate().position(|(i, candidate)| {
                        !claimed[i] && element_matches(spec, item, candidate)
                    });
                    match position {
                        Some(i) => claimed[i] = true,
                        None => return false,
                    }
                }
                true
            } else {
                items
                    .iter()
                    .zip(actual_items)
                    .all(|(item, candidate)| element_matches(spec, item, candidate))
            }
        }
        _ => scalar_matches(&wire_value(spec, desired, false), actual),
    }
}

fn element_matches(spec: &ParamSpec, desired: &Value, actual: &Value) -> bool {
    match (&spec.sub, desired) {
        (Some(sub), Value::Object(map)) => object_matches(sub, map, actual),
        _ => scalar_matches(desired, actual),
    }
}

/// Field-wise comparison of a desired sub-object: only the keys the caller
/// supplied are compared.
fn object_matches(sub: &Schema, desired: &Map<String, Value>, actual: &Value) -> bool {
    let Some(actual_obj) = actual.as_object() else {
        return false;
    };
    for (name, value) in desired {
        let Some(spec) = sub.get(name) else {
            continue;
        };
        if spec.no_log {
            return false;
        }
        let wire = wire_key(spec);
        match actual_obj.get(&wire).or_else(|| actual_obj.get(name)) {
            None => return false,
            Some(actual_value) => {
                if !value_matches(spec, value, actual_value) {
                    return false;
                }
            }
        }
    }
    true
}

fn scalar_matches(desired: &Value, actual: &Value) -> bool {
    match (desired.as_f64(), actual.as_f64()) {
        (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
        _ => desired == actual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ParamKind, ParamSpec, Schema};
    use serde_json::json;

    fn vlan_schema() -> Schema {
        Schema::new()
            .with(ParamSpec::str("name").required())
            .with(ParamSpec::int("vlan").wire("vlanId"))
            .with(ParamSpec::list("interfaces", ParamKind::Str).unordered())
            .with(ParamSpec::str("snmp_auth").wire("snmpAuthPassphrase").no_log())
    }

    fn desired(v: Value) -> IndexMap<String, Value> {
        v.as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    #[test]
    fn equal_records_have_no_differences() {
        let schema = vlan_schema();
        let diffs = differences(
            &schema,
            &desired(json!({"name": "Lab", "vlan": 10})),
            &json!({"id": "X", "name": "Lab", "vlanId": 10, "extra": "ignored"}),
        );
        assert!(diffs.is_empty());
    }

    #[test]
    fn missing_on_desired_is_dont_care() {
        let schema = vlan_schema();
        // existing has interfaces the caller did not mention
        let diffs = differences(
            &schema,
            &desired(json!({"name": "Lab"})),
            &json!({"name": "Lab", "vlanId": 99, "interfaces": ["Gi1/0/1"]}),
        );
        assert!(diffs.is_empty());
    }

    #[test]
    fn differing_field_is_reported_by_caller_name() {
        let schema = vlan_schema();
        let diffs = differences(
            &schema,
            &desired(json!({"name": "Lab", "vlan": 20})),
            &json!({"name": "Lab", "vlanId": 10}),
        );
        assert_eq!(diffs, vec!["vlan"]);
    }

    #[test]
    fn unordered_lists_compare_as_sets() {
        let schema = vlan_schema();
        let diffs = differences(
            &schema,
            &desired(json!({"interfaces": ["Gi1/0/2", "Gi1/0/1"]})),
            &json!({"interfaces": ["Gi1/0/1", "Gi1/0/2"]}),
        );
        assert!(diffs.is_empty());

        let diffs = differences(
            &schema,
            &desired(json!({"interfaces": ["Gi1/0/1"]})),
            &json!({"interfaces": ["Gi1/0/1", "Gi1/0/2"]}),
        );
        assert_eq!(diffs, vec!["interfaces"]);
    }

    #[test]
    fn ordered_lists_compare_positionally() {
        let schema = Schema::new().with(ParamSpec::list("servers", ParamKind::Str));
        let diffs = differences(
            &schema,
            &desired(json!({"servers": ["10.0.0.2", "10.0.0.1"]})),
            &json!({"servers": ["10.0.0.1", "10.0.0.2"]}),
        );
        assert_eq!(diffs, vec!["servers"]);
    }

    #[test]
    fn secret_presence_implies_update() {
        let schema = vlan_schema();
        let diffs = differences(
            &schema,
            &desired(json!({"name": "Lab", "snmp_auth": "x"})),
            &json!({"name": "Lab"}),
        );
        assert_eq!(diffs, vec!["snmp_auth"]);
    }

    #[test]
    fn nested_sub_schema_recurses_with_dont_care() {
        let floor = Schema::new()
            .with(ParamSpec::str("name"))
            .with(ParamSpec::int("number").wire("floorNumber"))
            .with(ParamSpec::str("rf_model").wire("rfModel"));
        let schema = Schema::new().with(ParamSpec::list_of("floors", floor).unordered());

        // caller omits rf_model on floor elements; server has one
        let diffs = differences(
            &schema,
            &desired(json!({"floors": [{"name": "first", "number": 1}]})),
            &json!({"floors": [{"name": "first", "floorNumber": 1, "rfModel": "indoor"}]}),
        );
        assert!(diffs.is_empty());

        let diffs = differences(
            &schema,
            &desired(json!({"floors": [{"name": "first", "number": 2}]})),
            &json!({"floors": [{"name": "first", "floorNumber": 1}]}),
        );
        assert_eq!(diffs, vec!["floors"]);
    }

    #[test]
    fn state_selector_never_compares() {
        let schema = vlan_schema();
        let diffs = differences(
            &schema,
            &desired(json!({"name": "Lab", "state": "present"})),
            &json!({"name": "Lab"}),
        );
        assert!(diffs.is_empty());
    }

    #[test]
    fn desired_state_parses() {
        assert_eq!(
            DesiredState::from_value(Some(&json!("present"))).unwrap(),
            DesiredState::Present
        );
        assert_eq!(
            DesiredState::from_value(Some(&json!("absent"))).unwrap(),
            DesiredState::Absent
        );
        assert_eq!(
            DesiredState::from_value(None).unwrap(),
            DesiredState::Present
        );
        assert!(DesiredState::from_value(Some(&json!("query"))).is_err());
    }
}
