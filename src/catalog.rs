//! Built-in endpoint catalog.
//!
//! This table is the data the registry is built from: one row per endpoint,
//! keyed by `(family, function)`. In the full product the table is generated
//! from the controller's API source-of-truth; the rows here cover the
//! families the built-in modules use. Adding an endpoint is a data change,
//! not a code change.

use crate::endpoint::{CatalogEntry, EndpointRegistry, EndpointSpec, HttpMethod, TaskPolling};
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use semver::Version;

fn endpoint(
    family: &str,
    function: &str,
    method: HttpMethod,
    path: &str,
) -> EndpointSpec {
    EndpointSpec {
        family: family.to_string(),
        function: function.to_string(),
        method,
        path: path.to_string(),
        path_params: Vec::new(),
        query_params: Vec::new(),
        body_params: Vec::new(),
        response_shape: Vec::new(),
        min_version: None,
        supersedes: None,
        task: TaskPolling::None,
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// The built-in `(family, function)` table.
pub fn builtin_catalog() -> Vec<CatalogEntry> {
    let mut rows = Vec::new();

    // family: network -------------------------------------------------------
    let mut get_vlan = endpoint(
        "network",
        "getVlanByName",
        HttpMethod::Get,
        "/dna/intent/api/v1/network/vlan/{name}",
    );
    get_vlan.path_params = names(&["name"]);
    get_vlan.response_shape = names(&["response"]);
    get_vlan.supersedes = Some("getVlanByNameV1".to_string());
    rows.push(CatalogEntry::Endpoint(get_vlan));

    let mut create_vlan = endpoint(
        "network",
        "createVlan",
        HttpMethod::Post,
        "/dna/intent/api/v1/network/vlan",
    );
    create_vlan.body_params = names(&["name", "vlan", "interfaces"]);
    create_vlan.task = TaskPolling::StatusUrl;
    rows.push(CatalogEntry::Endpoint(create_vlan));

    let mut update_vlan = endpoint(
        "network",
        "updateVlan",
        HttpMethod::Put,
        "/dna/intent/api/v1/network/vlan/{id}",
    );
    update_vlan.path_params = names(&["id"]);
    update_vlan.body_params = names(&["name", "vlan", "interfaces"]);
    update_vlan.min_version = Some(Version::new(2, 1, 0));
    update_vlan.task = TaskPolling::StatusUrl;
    rows.push(CatalogEntry::Endpoint(update_vlan));

    let mut delete_vlan = endpoint(
        "network",
        "deleteVlan",
        HttpMethod::Delete,
        "/dna/intent/api/v1/network/vlan/{id}",
    );
    delete_vlan.path_params = names(&["id"]);
    delete_vlan.task = TaskPolling::StatusUrl;
    rows.push(CatalogEntry::Endpoint(delete_vlan));

    // family: sites ----------------------------------------------------------
    let mut get_site = endpoint(
        "sites",
        "getSiteByName",
        HttpMethod::Get,
        "/dna/intent/api/v1/site/{name}",
    );
    get_site.path_params = names(&["name"]);
    get_site.response_shape = names(&["response"]);
    rows.push(CatalogEntry::Endpoint(get_site));

    let mut create_site = endpoint(
        "sites",
        "createSite",
        HttpMethod::Post,
        "/dna/intent/api/v1/site",
    );
    create_site.body_params = names(&["name", "parent_name", "floors"]);
    create_site.task = TaskPolling::ByTaskId;
    rows.push(CatalogEntry::Endpoint(create_site));

    let mut update_site = endpoint(
        "sites",
        "updateSite",
        HttpMethod::Put,
        "/dna/intent/api/v1/site/{id}",
    );
    update_site.path_params = names(&["id"]);
    update_site.body_params = names(&["name", "parent_name", "floors"]);
    update_site.task = TaskPolling::ByTaskId;
    rows.push(CatalogEntry::Endpoint(update_site));

    let mut delete_site = endpoint(
        "sites",
        "deleteSite",
        HttpMethod::Delete,
        "/dna/intent/api/v1/site/{id}",
    );
    delete_site.path_params = names(&["id"]);
    delete_site.task = TaskPolling::ByTaskId;
    rows.push(CatalogEntry::Endpoint(delete_site));

    // family: devices --------------------------------------------------------
    let mut device_list = endpoint(
        "devices",
        "getDeviceList",
        HttpMethod::Get,
        "/dna/intent/api/v1/network-device",
    );
    device_list.query_params = names(&["hostname", "management_ip"]);
    device_list.response_shape = names(&["response"]);
    rows.push(CatalogEntry::Endpoint(device_list));

    // family: task ------------------------------------------------------------
    let mut get_task = endpoint(
        "task",
        "getTaskById",
        HttpMethod::Get,
        "/dna/intent/api/v1/task/{task_id}",
    );
    get_task.path_params = names(&["task_id"]);
    get_task.response_shape = names(&["response"]);
    rows.push(CatalogEntry::Endpoint(get_task));

    rows
}

static BUILTIN: Lazy<std::result::Result<EndpointRegistry, String>> =
    Lazy::new(|| EndpointRegistry::from_catalog(builtin_catalog()).map_err(|e| e.to_string()));

/// The registry built from [`builtin_catalog`].
///
/// Built once per process; the table is immutable. A defective table is
/// reported as `schema_bug` at the first module invocation rather than as a
/// panic.
pub fn builtin_registry() -> Result<&'static EndpointRegistry> {
    match &*BUILTIN {
        Ok(registry) => Ok(registry),
        Err(message) => Err(Error::schema_bug(message.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_consistent() {
        let registry = builtin_registry().unwrap();
        let families: Vec<&str> = registry.families().collect();
        assert_eq!(families, vec!["network", "sites", "devices", "task"]);
    }

    #[test]
    fn vlan_alias_reaches_target() {
        let registry = builtin_registry().unwrap();
        let resolution = registry
            .resolve("network", "getVlanByNameV1", &Version::new(2, 3, 7))
            .unwrap();
        assert_eq!(resolution.spec.function, "getVlanByName");
        assert!(resolution.deprecation.is_some());
    }
}
