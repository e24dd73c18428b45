//! Endpoint registry: from `(family, function)` to a typed descriptor.
//!
//! The controller's path catalog is data, not design — the registry is built
//! once from the declarative table in [`crate::catalog`] and answers one
//! question: given `(family, function, controller_version)`, return a
//! descriptor. String keys are retained at the boundary for data stability;
//! everything downstream of resolution works with the typed
//! [`EndpointSpec`], never with strings.

use crate::error::{Error, Result};
use crate::schema::wire::{to_wire_subset, wire_key};
use crate::schema::Schema;
use indexmap::IndexMap;
use semver::Version;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// HTTP method of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    /// The reqwest method for dispatch.
    pub fn as_reqwest(&self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }

    /// Whether the method mutates controller state. Check-mode invocations
    /// must never issue a mutating method.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, HttpMethod::Get)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        };
        write!(f, "{}", s)
    }
}

/// How an endpoint's asynchronous responses are polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskPolling {
    /// The endpoint never returns a task handle.
    #[default]
    None,
    /// Poll the `status_url` returned in the accepting response.
    StatusUrl,
    /// Build the poll URL from the returned `task_id`.
    ByTaskId,
}

/// Typed descriptor for one controller endpoint.
#[derive(Debug, Clone)]
pub struct EndpointSpec {
    /// Functional grouping.
    pub family: String,
    /// Operation id within the family.
    pub function: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// Path template with `{name}` placeholders.
    pub path: String,
    /// Parameter names bound into the path, caller-facing form.
    pub path_params: Vec<String>,
    /// Parameter names bound as query parameters.
    pub query_params: Vec<String>,
    /// Parameter names serialized into the JSON body.
    pub body_params: Vec<String>,
    /// Top-level keys expected in a successful response body.
    pub response_shape: Vec<String>,
    /// Minimum controller version, when the endpoint is version-gated.
    pub min_version: Option<Version>,
    /// Older function name this endpoint replaces.
    pub supersedes: Option<String>,
    /// Polling style for asynchronous responses.
    pub task: TaskPolling,
}

/// One row of the declarative endpoint table.
#[derive(Debug, Clone)]
pub enum CatalogEntry {
    /// A concrete endpoint.
    Endpoint(EndpointSpec),
    /// A legacy name resolving to another function in the same family.
    Alias {
        family: String,
        function: String,
        target: String,
    },
}

#[derive(Debug, Clone)]
enum Entry {
    Spec(Arc<EndpointSpec>),
    Alias(String),
}

/// Result of resolving `(family, function, version)`.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The descriptor to dispatch against.
    pub spec: Arc<EndpointSpec>,
    /// Deprecation diagnostic, set when resolution went through an alias.
    pub deprecation: Option<String>,
}

/// Ordered lookup table, partitioned by family.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    families: IndexMap<String, IndexMap<String, Entry>>,
}

impl EndpointRegistry {
    /// Build a registry from a catalog table, checking it for consistency.
    ///
    /// Detects path placeholders without a matching binding (and vice
    /// versa), duplicate functions, and dangling alias targets — all
    /// surfaced as `schema_bug` before any module input is processed.
    pub fn from_catalog(entries: Vec<CatalogEntry>) -> Result<Self> {
        let mut families: IndexMap<String, IndexMap<String, Entry>> = IndexMap::new();
        for entry in entries {
            match entry {
                CatalogEntry::Endpoint(spec) => {
                    verify_bindings(&spec)?;
                    let family = families.entry(spec.family.clone()).or_default();
                    let function = spec.function.clone();
                    // A superseded name stays resolvable as a deprecated alias.
                    if let Some(old) = spec.supersedes.clone() {
                        if family.insert(old.clone(), Entry::Alias(function.clone())).is_some() {
                            return Err(Error::schema_bug(format!(
                                "duplicate endpoint function '{}'",
                                old
                            )));
                        }
                    }
                    if family.insert(function.clone(), Entry::Spec(Arc::new(spec))).is_some() {
                        return Err(Error::schema_bug(format!(
                            "duplicate endpoint function '{}'",
                            function
                        )));
                    }
                }
                CatalogEntry::Alias {
                    family,
                    function,
                    target,
                } => {
                    let family = families.entry(family).or_default();
                    if family.insert(function.clone(), Entry::Alias(target)).is_some() {
                        return Err(Error::schema_bug(format!(
                            "duplicate endpoint function '{}'",
                            function
                        )));
                    }
                }
            }
        }
        // Alias targets must exist within the same family and must not
        // chain to further aliases.
        for (family_name, functions) in &families {
            for (function, entry) in functions {
                if let Entry::Alias(target) = entry {
                    match functions.get(target) {
                        Some(Entry::Spec(_)) => {}
                        Some(Entry::Alias(_)) => {
                            return Err(Error::schema_bug(format!(
                                "alias '{}.{}' resolves to another alias",
                                family_name, function
                            )));
                        }
                        None => {
                            return Err(Error::schema_bug(format!(
                                "alias '{}.{}' targets unknown function '{}'",
                                family_name, function, target
                            )));
                        }
                    }
                }
            }
        }
        Ok(Self { families })
    }

    /// Resolve `(family, function)` under the session's controller version.
    pub fn resolve(
        &self,
        family: &str,
        function: &str,
        controller_version: &Version,
    ) -> Result<Resolution> {
        let functions = self.families.get(family).ok_or_else(|| {
            Error::schema_bug(format!("unknown endpoint family '{}'", family))
        })?;
        let (spec, deprecation) = match functions.get(function) {
            Some(Entry::Spec(spec)) => (spec.clone(), None),
            Some(Entry::Alias(target)) => {
                let Some(Entry::Spec(spec)) = functions.get(target) else {
                    // from_catalog guarantees alias targets are concrete
                    return Err(Error::schema_bug(format!(
                        "alias '{}.{}' has no concrete target",
                        family, function
                    )));
                };
                let notice = format!(
                    "endpoint function '{}.{}' is deprecated, use '{}'",
                    family, function, target
                );
                (spec.clone(), Some(notice))
            }
            None => {
                return Err(Error::schema_bug(format!(
                    "unknown endpoint '{}.{}'",
                    family, function
                )));
            }
        };
        if let Some(min) = &spec.min_version {
            if controller_version < min {
                return Err(Error::Version {
                    family: family.to_string(),
                    function: function.to_string(),
                    required: min.to_string(),
                    actual: controller_version.to_string(),
                });
            }
        }
        Ok(Resolution { spec, deprecation })
    }

    /// Families in catalog order, for diagnostics.
    pub fn families(&self) -> impl Iterator<Item = &str> {
        self.families.keys().map(String::as_str)
    }
}

/// A request's bindings, produced from validated input.
#[derive(Debug, Clone)]
pub struct Bound {
    /// Rendered path, all placeholders substituted.
    pub path: String,
    /// Query parameters in wire-name form.
    pub query: Vec<(String, String)>,
    /// JSON body in wire-name form, `None` when the endpoint takes no body.
    pub body: Option<Map<String, Value>>,
    /// Body with secret values replaced, safe for diagnostics.
    pub body_logged: Option<Map<String, Value>>,
}

/// Bind an endpoint's path, query, and body from validated input.
///
/// `overrides` supplies path parameter values that do not come from the
/// desired input — reconciliation binds update and delete paths from the
/// identifier of the *existing* record to avoid renaming clashes.
pub fn bind(
    spec: &EndpointSpec,
    schema: &Schema,
    normalized: &IndexMap<String, Value>,
    overrides: &HashMap<String, String>,
) -> Result<Bound> {
    let mut path_values: HashMap<&str, String> = HashMap::new();
    for name in &spec.path_params {
        let value = match overrides.get(name) {
            Some(v) => v.clone(),
            None => match normalized.get(name) {
                Some(v) => scalar_to_string(v).ok_or_else(|| {
                    Error::schema_bug(format!(
                        "path parameter '{}' of '{}.{}' is not a scalar",
                        name, spec.family, spec.function
                    ))
                })?,
                None => {
                    return Err(Error::schema_bug(format!(
                        "no binding for path parameter '{}' of '{}.{}'",
                        name, spec.family, spec.function
                    )));
                }
            },
        };
        path_values.insert(name.as_str(), value);
    }
    let path = render_path(&spec.path, &path_values)?;

    let mut query = Vec::new();
    for name in &spec.query_params {
        if let (Some(value), Some(param)) = (normalized.get(name), schema.get(name)) {
            if let Some(rendered) = scalar_to_string(value) {
                query.push((wire_key(param), rendered));
            }
        }
    }

    let (body, body_logged) = if spec.body_params.is_empty() {
        (None, None)
    } else {
        let keys: Vec<&str> = spec.body_params.iter().map(String::as_str).collect();
        (
            Some(to_wire_subset(schema, normalized, &keys, false)),
            Some(to_wire_subset(schema, normalized, &keys, true)),
        )
    };

    Ok(Bound {
        path,
        query,
        body,
        body_logged,
    })
}

/// Substitute `{name}` placeholders in a path template.
pub fn render_path(template: &str, values: &HashMap<&str, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('}').ok_or_else(|| {
            Error::schema_bug(format!("unterminated placeholder in path '{}'", template))
        })?;
        let name = &after[..end];
        let value = values.get(name).ok_or_else(|| {
            Error::schema_bug(format!(
                "no binding for placeholder '{{{}}}' in path '{}'",
                name, template
            ))
        })?;
        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn placeholders(template: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else { break };
        out.push(&after[..end]);
        rest = &after[end + 1..];
    }
    out
}

fn verify_bindings(spec: &EndpointSpec) -> Result<()> {
    let names = placeholders(&spec.path);
    for name in &names {
        if !spec.path_params.iter().any(|p| p == name) {
            return Err(Error::schema_bug(format!(
                "path placeholder '{{{}}}' of '{}.{}' has no declared binding",
                name, spec.family, spec.function
            )));
        }
    }
    for param in &spec.path_params {
        if !names.contains(&param.as_str()) {
            return Err(Error::schema_bug(format!(
                "path parameter '{}' of '{}.{}' does not appear in the template",
                param, spec.family, spec.function
            )));
        }
    }
    Ok(())
}

/// Parse a controller version string.
///
/// Controller builds report up to four dotted components; anything beyond
/// `major.minor.patch` does not participate in endpoint gating and is
/// ignored.
pub fn parse_controller_version(raw: &str) -> Result<Version> {
    let mut parts = [0u64; 3];
    let mut count = 0;
    for (i, piece) in raw.split('.').enumerate() {
        if i >= 3 {
            break;
        }
        parts[i] = piece.parse::<u64>().map_err(|_| Error::Type {
            breadcrumb: "controller_version".to_string(),
            message: format!("'{}' is not a dotted numeric version", raw),
        })?;
        count += 1;
    }
    if count == 0 {
        return Err(Error::Type {
            breadcrumb: "controller_version".to_string(),
            message: "version string is empty".to_string(),
        });
    }
    Ok(Version::new(parts[0], parts[1], parts[2]))
}
