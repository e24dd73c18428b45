//! Site module - manage sites and their floors.
//!
//! A site is a nested resource: the desired record carries a list of floor
//! objects, each validated against its own sub-schema. Floors compare as a
//! set, so reordering them in the playbook is not a change.

use super::{ControllerModule, ModuleContext, ModuleOutcome};
use crate::catalog::builtin_registry;
use crate::client::Pipeline;
use crate::error::Result;
use crate::reconcile::{reconcile, CrudResource, DesiredState};
use crate::schema::{Constraints, ParamSpec, Schema};
use crate::session::Session;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

/// RF models the controller accepts for a floor.
const RF_MODELS: [&str; 4] = [
    "Cubes And Walled Offices",
    "Drywall Office Only",
    "Indoor High Ceiling",
    "Outdoor Open Space",
];

fn floor_schema() -> Schema {
    Schema::new()
        .with(ParamSpec::str("name").required())
        .with(ParamSpec::int("number").wire("floorNumber"))
        .with(
            ParamSpec::str("rf_model")
                .wire("rfModel")
                .with_choices(RF_MODELS.iter().map(|m| Value::from(*m))),
        )
}

/// Module for site lifecycle management.
pub struct SiteModule;

#[async_trait]
impl ControllerModule for SiteModule {
    fn name(&self) -> &'static str {
        "site"
    }

    fn description(&self) -> &'static str {
        "Manage sites and their floor layout"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .with(ParamSpec::str("name").required())
            .with(
                ParamSpec::str("parent_name")
                    .wire("parentName")
                    .with_default(Value::from("Global")),
            )
            .with(ParamSpec::list_of("floors", floor_schema()).unordered())
            .with(
                ParamSpec::str("state")
                    .with_choices([Value::from("present"), Value::from("absent")])
                    .with_default(Value::from("present")),
            )
    }

    fn constraints(&self) -> Constraints {
        Constraints::new()
    }

    async fn run(
        &self,
        params: &IndexMap<String, Value>,
        session: &Session,
        ctx: &ModuleContext,
    ) -> Result<ModuleOutcome> {
        let state = DesiredState::from_value(params.get("state"))?;
        let registry = builtin_registry()?;
        let version = session.version();

        let resolve = |function: &str| {
            let resolution = registry.resolve("sites", function, version)?;
            if let Some(notice) = resolution.deprecation {
                ctx.warn(notice);
            }
            Ok::<_, crate::error::Error>(resolution.spec)
        };
        let read = resolve("getSiteByName")?;
        let create = resolve("createSite")?;
        let update = resolve("updateSite")?;
        let delete = resolve("deleteSite")?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let schema = self.schema();
        let crud = CrudResource {
            resource: format!("site '{}'", name),
            schema: &schema,
            read,
            create,
            update,
            delete,
            id_field: "id",
        };

        let pipeline = Pipeline::new(session);
        let mut warnings = Vec::new();
        let outcome = reconcile(
            &pipeline,
            registry,
            &crud,
            params,
            state,
            ctx.check_mode,
            &mut warnings,
            &ctx.cancel,
        )
        .await;
        for warning in warnings {
            ctx.warn(warning);
        }
        outcome.map(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::validator::validate;
    use serde_json::json;

    #[test]
    fn floors_validate_against_sub_schema() {
        let module = SiteModule;
        let input = json!({
            "name": "HQ",
            "floors": [
                {"name": "first", "number": 1, "rf_model": "Drywall Office Only"},
                {"name": "roof", "number": 9, "rf_model": "on the roof"}
            ]
        });
        let errs = validate(
            &module.schema(),
            &module.constraints(),
            input.as_object().unwrap(),
        )
        .unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].breadcrumb, "floors[1].rf_model");
        assert_eq!(errs[0].kind, crate::error::ErrorKind::Choice);
    }

    #[test]
    fn parent_name_defaults_to_global() {
        let module = SiteModule;
        let input = json!({"name": "HQ"});
        let out = validate(
            &module.schema(),
            &module.constraints(),
            input.as_object().unwrap(),
        )
        .unwrap();
        assert_eq!(out["parent_name"], json!("Global"));
    }
}
