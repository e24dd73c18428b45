//! Declarative parameter schemas for modules.
//!
//! A schema is data, not code: an ordered mapping from parameter name to a
//! [`ParamSpec`] describing its type, constraints, aliases, and wire name.
//! Sub-schemas compose by value so complex payloads (a list of objects, each
//! with its own list) stay tractable. The validator in [`validator`] and the
//! wire-name translator in [`wire`] both interpret this model.

pub mod validator;
pub mod wire;

use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde_json::Value;

/// The declared type of a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    /// UTF-8 string; scalars are coerced to their string form.
    Str,
    /// Signed integer; numeric strings are coerced.
    Int,
    /// Floating point number; numeric strings are coerced.
    Float,
    /// Boolean; accepts `true/false/yes/no/1/0` strings, case-insensitive.
    Bool,
    /// List of elements; element type given by `ParamSpec::elements` or
    /// `ParamSpec::sub` for object elements.
    List,
    /// Free-form JSON object, not validated element-wise.
    Map,
    /// Object validated against the nested sub-schema in `ParamSpec::sub`.
    Dict,
}

impl ParamKind {
    /// Human-readable name used in type-error messages.
    pub fn label(&self) -> &'static str {
        match self {
            ParamKind::Str => "string",
            ParamKind::Int => "integer",
            ParamKind::Float => "number",
            ParamKind::Bool => "boolean",
            ParamKind::List => "list",
            ParamKind::Map => "mapping",
            ParamKind::Dict => "mapping",
        }
    }
}

/// Declarative description of a single parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    /// Primary, caller-facing name.
    pub name: String,
    /// Declared type.
    pub kind: ParamKind,
    /// Element type for `List` parameters without object elements.
    pub elements: Option<ParamKind>,
    /// Whether the parameter must be present after defaults are applied.
    pub required: bool,
    /// Finite set of allowed values, compared after coercion.
    pub choices: Option<Vec<Value>>,
    /// Default applied when the key is absent.
    pub default: Option<Value>,
    /// Alternative names accepted on input.
    pub aliases: Vec<String>,
    /// Name used when serializing to the wire; `None` means the default
    /// snake_case-to-camelCase translation applies.
    pub wire_name: Option<String>,
    /// Nested schema for `Dict` parameters and for `List` object elements.
    pub sub: Option<Schema>,
    /// A bare scalar is promoted to a single-element list.
    pub promote_scalar: bool,
    /// Secret field: never logged, compared by presence in reconciliation.
    pub no_log: bool,
    /// List compared as a set rather than positionally in reconciliation.
    pub unordered: bool,
    /// Connection option merged in from the session base schema; stripped
    /// before wire serialization and state comparison.
    pub session_option: bool,
}

impl ParamSpec {
    fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            elements: None,
            required: false,
            choices: None,
            default: None,
            aliases: Vec::new(),
            wire_name: None,
            sub: None,
            promote_scalar: false,
            no_log: false,
            unordered: false,
            session_option: false,
        }
    }

    /// A string parameter.
    pub fn str(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Str)
    }

    /// An integer parameter.
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Int)
    }

    /// A floating point parameter.
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Float)
    }

    /// A boolean parameter.
    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Bool)
    }

    /// A list parameter with scalar elements of the given kind.
    pub fn list(name: impl Into<String>, elements: ParamKind) -> Self {
        let mut spec = Self::new(name, ParamKind::List);
        spec.elements = Some(elements);
        spec
    }

    /// A list parameter whose elements validate against a sub-schema.
    pub fn list_of(name: impl Into<String>, sub: Schema) -> Self {
        let mut spec = Self::new(name, ParamKind::List);
        spec.sub = Some(sub);
        spec
    }

    /// A free-form mapping parameter.
    pub fn map(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Map)
    }

    /// An object parameter validated against a sub-schema.
    pub fn dict(name: impl Into<String>, sub: Schema) -> Self {
        let mut spec = Self::new(name, ParamKind::Dict);
        spec.sub = Some(sub);
        spec
    }

    /// Mark the parameter required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Restrict the parameter to a finite set of values.
    pub fn with_choices(mut self, choices: impl IntoIterator<Item = Value>) -> Self {
        self.choices = Some(choices.into_iter().collect());
        self
    }

    /// Apply a default when the key is absent.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Accept an alternative name on input.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Override the wire-facing name.
    pub fn wire(mut self, wire_name: impl Into<String>) -> Self {
        self.wire_name = Some(wire_name.into());
        self
    }

    /// Promote a bare scalar to a single-element list.
    pub fn promote_scalar(mut self) -> Self {
        self.promote_scalar = true;
        self
    }

    /// Mark the parameter as a secret.
    pub fn no_log(mut self) -> Self {
        self.no_log = true;
        self
    }

    /// Compare the list as a set in reconciliation.
    pub fn unordered(mut self) -> Self {
        self.unordered = true;
        self
    }

    /// Mark the parameter as a session connection option.
    pub fn session_option(mut self) -> Self {
        self.session_option = true;
        self
    }
}

/// An ordered parameter schema.
///
/// Iteration follows declaration order; lookup accepts the primary name or
/// any alias.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    params: IndexMap<String, ParamSpec>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, builder-style.
    pub fn with(mut self, spec: ParamSpec) -> Self {
        self.params.insert(spec.name.clone(), spec);
        self
    }

    /// Number of declared parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether the schema declares no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Lookup by primary name only.
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.get(name)
    }

    /// Lookup by primary name or alias, returning the canonical name.
    pub fn resolve(&self, key: &str) -> Option<(&str, &ParamSpec)> {
        if let Some((name, spec)) = self.params.get_key_value(key) {
            return Some((name.as_str(), spec));
        }
        self.params
            .iter()
            .find(|(_, spec)| spec.aliases.iter().any(|a| a == key))
            .map(|(name, spec)| (name.as_str(), spec))
    }

    /// Iterate parameters in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamSpec)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merge another schema's parameters after this schema's own.
    ///
    /// Used to fold the session base schema into every module schema. A name
    /// collision between module and base parameters is a schema bug surfaced
    /// at start-up.
    pub fn merged(mut self, other: &Schema) -> Result<Self> {
        for (name, spec) in other.iter() {
            if self.params.contains_key(name) {
                return Err(Error::schema_bug(format!(
                    "parameter '{}' collides with a session option",
                    name
                )));
            }
            self.params.insert(name.to_string(), spec.clone());
        }
        Ok(self)
    }

    /// Verify no alias collides with a declared name or another alias.
    pub fn verify_aliases(&self) -> Result<()> {
        let mut seen: Vec<&str> = self.params.keys().map(String::as_str).collect();
        for spec in self.params.values() {
            for alias in &spec.aliases {
                if seen.contains(&alias.as_str()) {
                    return Err(Error::schema_bug(format!(
                        "alias '{}' collides with another parameter name or alias",
                        alias
                    )));
                }
                seen.push(alias.as_str());
            }
        }
        Ok(())
    }

    /// Split a normalized mapping into module parameters and session options.
    pub fn split_session_options(
        &self,
        normalized: &IndexMap<String, Value>,
    ) -> (IndexMap<String, Value>, IndexMap<String, Value>) {
        let mut module = IndexMap::new();
        let mut session = IndexMap::new();
        for (key, value) in normalized {
            match self.get(key) {
                Some(spec) if spec.session_option => {
                    session.insert(key.clone(), value.clone());
                }
                _ => {
                    module.insert(key.clone(), value.clone());
                }
            }
        }
        (module, session)
    }
}

/// A `(param, value, required_params)` triple: when `param` equals `value`,
/// every name in `then_required` must be present.
#[derive(Debug, Clone)]
pub struct RequiredIf {
    /// Parameter whose value triggers the requirement.
    pub param: String,
    /// Value that triggers the requirement, compared after coercion.
    pub value: Value,
    /// Parameters that become required.
    pub then_required: Vec<String>,
}

/// Conditional constraints attached to a schema.
///
/// Evaluated by the validator in the fixed order `required_if` →
/// `required_one_of` → `mutually_exclusive` → `required_together`.
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    /// Conditional requirements.
    pub required_if: Vec<RequiredIf>,
    /// At least one member of each set must be present.
    pub required_one_of: Vec<Vec<String>>,
    /// At most one member of each set may be present.
    pub mutually_exclusive: Vec<Vec<String>>,
    /// All or none of each set must be present.
    pub required_together: Vec<Vec<String>>,
}

impl Constraints {
    /// Create an empty constraint set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `then_required` when `param` equals `value`.
    pub fn required_if(
        mut self,
        param: impl Into<String>,
        value: Value,
        then_required: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.required_if.push(RequiredIf {
            param: param.into(),
            value,
            then_required: then_required.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Require at least one member of the set.
    pub fn required_one_of(mut self, set: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.required_one_of
            .push(set.into_iter().map(Into::into).collect());
        self
    }

    /// Allow at most one member of the set.
    pub fn mutually_exclusive(mut self, set: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.mutually_exclusive
            .push(set.into_iter().map(Into::into).collect());
        self
    }

    /// Require all or none of the set.
    pub fn required_together(mut self, set: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.required_together
            .push(set.into_iter().map(Into::into).collect());
        self
    }

    /// Check every referenced parameter exists in the schema.
    ///
    /// A constraint naming an unknown parameter is a defect in the module
    /// definition, detected at start-up before any input is validated.
    pub fn verify(&self, schema: &Schema) -> Result<()> {
        let check = |name: &str| -> Result<()> {
            if schema.get(name).is_none() {
                return Err(Error::schema_bug(format!(
                    "constraint references unknown parameter '{}'",
                    name
                )));
            }
            Ok(())
        };
        for rule in &self.required_if {
            check(&rule.param)?;
            for name in &rule.then_required {
                check(name)?;
            }
        }
        for set in self
            .required_one_of
            .iter()
            .chain(&self.mutually_exclusive)
            .chain(&self.required_together)
        {
            for name in set {
                check(name)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Schema {
        Schema::new()
            .with(ParamSpec::str("name").required().alias("vlan_name"))
            .with(ParamSpec::int("vlan").wire("vlanId"))
            .with(ParamSpec::str("state").with_choices([json!("present"), json!("absent")]))
    }

    #[test]
    fn resolve_by_name_and_alias() {
        let schema = sample();
        let (name, _) = schema.resolve("name").unwrap();
        assert_eq!(name, "name");
        let (name, _) = schema.resolve("vlan_name").unwrap();
        assert_eq!(name, "name");
        assert!(schema.resolve("bogus").is_none());
    }

    #[test]
    fn iteration_preserves_declaration_order() {
        let schema = sample();
        let names: Vec<&str> = schema.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["name", "vlan", "state"]);
    }

    #[test]
    fn merge_rejects_collisions() {
        let base = Schema::new().with(ParamSpec::str("host").session_option());
        let merged = sample().merged(&base).unwrap();
        assert!(merged.get("host").unwrap().session_option);

        let clashing = Schema::new().with(ParamSpec::str("name").session_option());
        assert!(sample().merged(&clashing).is_err());
    }

    #[test]
    fn alias_collision_detected() {
        let schema = Schema::new()
            .with(ParamSpec::str("name"))
            .with(ParamSpec::str("label").alias("name"));
        assert!(schema.verify_aliases().is_err());
    }

    #[test]
    fn constraints_verify_references() {
        let schema = sample();
        let ok = Constraints::new().required_if("state", json!("present"), ["vlan"]);
        assert!(ok.verify(&schema).is_ok());

        let bad = Constraints::new().required_one_of(["name", "missing"]);
        assert!(bad.verify(&schema).is_err());
    }
}
