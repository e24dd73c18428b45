//! VLAN module - manage VLANs on the controller.
//!
//! `state: present` creates or converges the VLAN; `state: absent` removes
//! it. The controller answers VLAN creation either synchronously or with an
//! asynchronous task, and this module handles both.

use super::{ControllerModule, ModuleContext, ModuleOutcome};
use crate::catalog::builtin_registry;
use crate::client::Pipeline;
use crate::error::Result;
use crate::reconcile::{reconcile, CrudResource, DesiredState};
use crate::schema::{Constraints, ParamKind, ParamSpec, Schema};
use crate::session::Session;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

/// Module for VLAN lifecycle management.
pub struct VlanModule;

#[async_trait]
impl ControllerModule for VlanModule {
    fn name(&self) -> &'static str {
        "vlan"
    }

    fn description(&self) -> &'static str {
        "Manage VLANs: create, update, and delete by name"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .with(ParamSpec::str("name").required().alias("vlan_name"))
            .with(ParamSpec::int("vlan").wire("vlanId"))
            .with(
                ParamSpec::list("interfaces", ParamKind::Str)
                    .unordered()
                    .promote_scalar(),
            )
            .with(
                ParamSpec::str("state")
                    .with_choices([Value::from("present"), Value::from("absent")])
                    .with_default(Value::from("present")),
            )
    }

    fn constraints(&self) -> Constraints {
        Constraints::new().required_if("state", Value::from("present"), ["vlan"])
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
            let resolution = registry.resolve("network", function, version)?;
            if let Some(notice) = resolution.deprecation {
                ctx.warn(notice);
            }
            Ok::<_, crate::error::Error>(resolution.spec)
        };
        let read = resolve("getVlanByName")?;
        let create = resolve("createVlan")?;
        let update = resolve("updateVlan")?;
        let delete = resolve("deleteVlan")?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let schema = self.schema();
        let crud = CrudResource {
            resource: format!("vlan '{}'", name),
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
