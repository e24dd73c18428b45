//! Validator behavior across module schemas, including the normalization
//! idempotence property.

use netible::schema::validator::validate;
use netible::schema::{Constraints, ParamKind, ParamSpec, Schema};
use netible::session::SessionConfig;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn schema() -> Schema {
    Schema::new()
        .with(ParamSpec::str("name").required().alias("vlan_name"))
        .with(ParamSpec::int("vlan").wire("vlanId"))
        .with(ParamSpec::bool("enabled").with_default(json!(true)))
        .with(
            ParamSpec::list("interfaces", ParamKind::Str)
                .unordered()
                .promote_scalar(),
        )
        .with(
            ParamSpec::str("state")
                .with_choices([json!("present"), json!("absent")])
                .with_default(json!("present")),
        )
}

fn as_map(value: Value) -> Map<String, Value> {
    value.as_object().unwrap().clone()
}

#[test]
fn merged_base_schema_validates_connection_options() {
    let merged = schema().merged(&SessionConfig::base_schema()).unwrap();
    let out = validate(
        &merged,
        &Constraints::new(),
        &as_map(json!({
            "host": "controller.example.com",
            "password": "secret",
            "port": "8443",
            "name": "Lab",
            "vlan": 10,
        })),
    )
    .unwrap();
    // string port coerces because the target type is numeric
    assert_eq!(out["port"], json!(8443));
    // base defaults apply alongside module defaults
    assert_eq!(out["username"], json!("admin"));
    assert_eq!(out["state"], json!("present"));
}

#[test]
fn missing_host_is_reported_with_breadcrumb() {
    let merged = schema().merged(&SessionConfig::base_schema()).unwrap();
    let errs = validate(
        &merged,
        &Constraints::new(),
        &as_map(json!({"name": "Lab"})),
    )
    .unwrap_err();
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].breadcrumb, "host");
}

#[test]
fn validate_certs_alias_reaches_verify_tls() {
    let merged = schema().merged(&SessionConfig::base_schema()).unwrap();
    let out = validate(
        &merged,
        &Constraints::new(),
        &as_map(json!({
            "host": "c", "name": "Lab", "validate_certs": "no"
        })),
    )
    .unwrap();
    assert_eq!(out["verify_tls"], json!(false));
    assert!(!out.contains_key("validate_certs"));
}

#[test]
fn session_options_split_from_module_params() {
    let merged = schema().merged(&SessionConfig::base_schema()).unwrap();
    let out = validate(
        &merged,
        &Constraints::new(),
        &as_map(json!({"host": "c", "name": "Lab", "vlan": 10})),
    )
    .unwrap();
    let (params, options) = merged.split_session_options(&out);
    assert!(params.contains_key("name"));
    assert!(params.contains_key("vlan"));
    assert!(!params.contains_key("host"));
    assert!(options.contains_key("host"));
    assert!(options.contains_key("port"));
    assert!(!options.contains_key("name"));
}

proptest! {
    /// validator(x) == validator(validator(x)) for accepted inputs.
    #[test]
    fn normalization_is_idempotent(
        name in "[A-Za-z][A-Za-z0-9 ]{0,14}",
        vlan in 1i64..4094,
        vlan_as_string in any::<bool>(),
        enabled in proptest::option::of(any::<bool>()),
        interfaces in proptest::collection::vec("Gi1/0/[1-9]", 0..4),
        absent in any::<bool>(),
    ) {
        let schema = schema();
        let constraints = Constraints::new();

        let mut input = Map::new();
        input.insert("name".to_string(), json!(name));
        input.insert(
            "vlan".to_string(),
            if vlan_as_string { json!(vlan.to_string()) } else { json!(vlan) },
        );
        if let Some(enabled) = enabled {
            input.insert("enabled".to_string(), json!(enabled));
        }
        input.insert("interfaces".to_string(), json!(interfaces));
        input.insert(
            "state".to_string(),
            json!(if absent { "absent" } else { "present" }),
        );

        let first = validate(&schema, &constraints, &input).unwrap();
        let as_input: Map<String, Value> = first.clone().into_iter().collect();
        let second = validate(&schema, &constraints, &as_input).unwrap();
        prop_assert_eq!(first, second);
    }

    /// Coerced integers equal their numeric source regardless of spelling.
    #[test]
    fn integer_coercion_is_consistent(vlan in 0i64..100_000) {
        let schema = Schema::new().with(ParamSpec::int("vlan"));
        let constraints = Constraints::new();

        let from_number = validate(
            &schema,
            &constraints,
            &as_map(json!({"vlan": vlan})),
        ).unwrap();
        let from_string = validate(
            &schema,
            &constraints,
            &as_map(json!({"vlan": vlan.to_string()})),
        ).unwrap();
        prop_assert_eq!(&from_number["vlan"], &from_string["vlan"]);
    }
}
