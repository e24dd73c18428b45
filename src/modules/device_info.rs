//! Device info module - read-only device inventory queries.
//!
//! Info modules accept only `state: query` and never mutate controller
//! state; they are safe in check mode and always report `changed=false`.

use super::{ControllerModule, ModuleContext, ModuleOutcome};
use crate::catalog::builtin_registry;
use crate::client::{Outcome, Pipeline};
use crate::endpoint::bind;
use crate::error::{Error, Result};
use crate::schema::{Constraints, ParamSpec, Schema};
use crate::session::Session;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;

/// Module for querying the device inventory.
pub struct DeviceInfoModule;

#[async_trait]
impl ControllerModule for DeviceInfoModule {
    fn name(&self) -> &'static str {
        "device_info"
    }

    fn description(&self) -> &'static str {
        "Query network devices by hostname or management address"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .with(ParamSpec::str("hostname"))
            .with(
                ParamSpec::str("management_ip")
                    .wire("managementIpAddress")
                    .alias("ip_address"),
            )
            .with(
                ParamSpec::str("state")
                    .with_choices([Value::from("query")])
                    .with_default(Value::from("query")),
            )
    }

    fn constraints(&self) -> Constraints {
        Constraints::new().mutually_exclusive(["hostname", "management_ip"])
    }

    async fn run(
        &self,
        params: &IndexMap<String, Value>,
        session: &Session,
        ctx: &ModuleContext,
    ) -> Result<ModuleOutcome> {
        let registry = builtin_registry()?;
        let resolution = registry.resolve("devices", "getDeviceList", session.version())?;
        if let Some(notice) = resolution.deprecation {
            ctx.warn(notice);
        }

        let schema = self.schema();
        let bound = bind(&resolution.spec, &schema, params, &HashMap::new())?;
        let pipeline = Pipeline::new(session);
        let mut warnings = Vec::new();
        let outcome = pipeline
            .send(&resolution.spec, &bound, &mut warnings, &ctx.cancel)
            .await;
        for warning in warnings {
            ctx.warn(warning);
        }

        match outcome? {
            Outcome::Complete(response) => {
                let count = response
                    .result()
                    .as_array()
                    .map(Vec::len)
                    .unwrap_or_else(|| usize::from(!response.result().is_null()));
                Ok(ModuleOutcome {
                    changed: false,
                    response: response.body,
                    diagnostics: format!("query returned {} device(s)", count),
                })
            }
            Outcome::Accepted(_) => Err(Error::protocol(
                "device query unexpectedly returned a task handle",
                String::new(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::validator::validate;
    use serde_json::json;

    #[test]
    fn filters_are_mutually_exclusive() {
        let module = DeviceInfoModule;
        let input = json!({"hostname": "sw1", "management_ip": "10.0.0.1"});
        let errs = validate(
            &module.schema(),
            &module.constraints(),
            input.as_object().unwrap(),
        )
        .unwrap_err();
        assert_eq!(errs[0].kind, crate::error::ErrorKind::Conflict);
    }

    #[test]
    fn state_accepts_only_query() {
        let module = DeviceInfoModule;
        let ok = json!({"hostname": "sw1", "state": "query"});
        assert!(validate(
            &module.schema(),
            &module.constraints(),
            ok.as_object().unwrap()
        )
        .is_ok());

        let bad = json!({"hostname": "sw1", "state": "present"});
        let errs = validate(
            &module.schema(),
            &module.constraints(),
            bad.as_object().unwrap(),
        )
        .unwrap_err();
        assert_eq!(errs[0].kind, crate::error::ErrorKind::Choice);
    }

    #[test]
    fn alias_maps_to_management_ip() {
        let module = DeviceInfoModule;
        let input = json!({"ip_address": "10.0.0.1"});
        let out = validate(
            &module.schema(),
            &module.constraints(),
            input.as_object().unwrap(),
        )
        .unwrap();
        assert_eq!(out["management_ip"], json!("10.0.0.1"));
    }
}
