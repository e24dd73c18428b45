//! End-to-end module flows against a mock controller.
//!
//! These tests drive whole module invocations - validation, login, endpoint
//! resolution, dispatch, task polling, reconciliation, envelope shaping -
//! against a wiremock server standing in for the controller.

use netible::modules::{run_module, ModuleContext, ModuleRegistry};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AUTH_PATH: &str = "/dna/system/api/v1/auth/token";
const VLAN_PATH: &str = "/dna/intent/api/v1/network/vlan";

/// Start a mock controller that accepts the token login.
async fn mock_controller() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Token": "tok-123"})))
        .mount(&server)
        .await;
    server
}

/// Connection options pointing at the mock controller, merged with the
/// module-specific arguments.
fn args(server: &MockServer, extra: Value) -> Map<String, Value> {
    let mut map = json!({
        "host": "127.0.0.1",
        "port": server.address().port(),
        "scheme": "http",
        "username": "admin",
        "password": "hunter2",
        "task_poll_interval_seconds": 0,
        "task_timeout_seconds": 30,
    })
    .as_object()
    .unwrap()
    .clone();
    for (key, value) in extra.as_object().unwrap() {
        map.insert(key.clone(), value.clone());
    }
    map
}

async fn run(server: &MockServer, module: &str, extra: Value) -> netible::envelope::Envelope {
    run_with_ctx(server, module, extra, &ModuleContext::new()).await
}

async fn run_with_ctx(
    server: &MockServer,
    module: &str,
    extra: Value,
    ctx: &ModuleContext,
) -> netible::envelope::Envelope {
    let registry = ModuleRegistry::with_builtins();
    let module = registry.get(module).expect("module registered");
    run_module(module.as_ref(), &args(server, extra), ctx).await
}

fn envelope_json(envelope: &netible::envelope::Envelope) -> String {
    serde_json::to_string(envelope).unwrap()
}

// ============================================================================
// Spec scenarios
// ============================================================================

#[tokio::test]
async fn happy_path_create() {
    let server = mock_controller().await;
    // read: absent before the create, present after it
    Mock::given(method("GET"))
        .and(path(format!("{}/Lab", VLAN_PATH)))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "not found"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/Lab", VLAN_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"response": {"id": "X", "name": "Lab", "vlanId": 10}}),
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(VLAN_PATH))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"id": "X", "name": "Lab", "vlan": 10})),
        )
        .mount(&server)
        .await;

    let envelope = run(
        &server,
        "vlan",
        json!({"name": "Lab", "vlan": 10, "state": "present"}),
    )
    .await;

    assert!(envelope.changed, "create must report changed");
    assert!(!envelope.failed, "msg: {:?}", envelope.msg);
    assert_eq!(envelope.controller_response["id"], json!("X"));
    assert!(!envelope_json(&envelope).contains("hunter2"));
}

#[tokio::test]
async fn noop_reconcile() {
    let server = mock_controller().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/Lab", VLAN_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"response": {"id": "X", "name": "Lab", "vlanId": 10}}),
        ))
        .mount(&server)
        .await;

    let envelope = run(
        &server,
        "vlan",
        json!({"name": "Lab", "vlan": 10, "state": "present"}),
    )
    .await;

    assert!(!envelope.changed);
    assert!(!envelope.failed, "msg: {:?}", envelope.msg);

    // only the login and the read were issued
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
}

#[tokio::test]
async fn async_create_with_task() {
    let server = mock_controller().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/Lab", VLAN_PATH)))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/Lab", VLAN_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"response": {"id": "X", "name": "Lab", "vlanId": 10}}),
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(VLAN_PATH))
        .respond_with(
            ResponseTemplate::new(202)
                .set_body_json(json!({"task_id": "T1", "status_url": "/task/T1"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/task/T1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"progress": "in progress"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/task/T1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"progress": "success", "end_time": 123, "is_error": false}),
        ))
        .mount(&server)
        .await;

    let envelope = run(
        &server,
        "vlan",
        json!({"name": "Lab", "vlan": 10, "state": "present"}),
    )
    .await;

    assert!(envelope.changed);
    assert!(!envelope.failed, "msg: {:?}", envelope.msg);
    assert_eq!(envelope.controller_response["task"]["endTime"], json!(123));
}

#[tokio::test]
async fn task_failure_surfaces_reason() {
    let server = mock_controller().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/Lab", VLAN_PATH)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(VLAN_PATH))
        .respond_with(
            ResponseTemplate::new(202)
                .set_body_json(json!({"task_id": "T1", "status_url": "/task/T1"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/task/T1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"is_error": true, "failure_reason": "duplicate name"}),
        ))
        .mount(&server)
        .await;

    let envelope = run(
        &server,
        "vlan",
        json!({"name": "Lab", "vlan": 10, "state": "present"}),
    )
    .await;

    assert!(!envelope.changed);
    assert!(envelope.failed);
    let msg = envelope.msg.as_deref().unwrap();
    assert!(msg.contains("kind=task_failed"), "msg: {}", msg);
    assert!(msg.contains("duplicate name"), "msg: {}", msg);
}

#[tokio::test]
async fn validation_rejection_issues_no_request() {
    let server = mock_controller().await;

    let envelope = run(
        &server,
        "vlan",
        json!({"name": "Lab", "vlan": "abc", "state": "present"}),
    )
    .await;

    assert!(envelope.failed);
    assert!(!envelope.changed);
    let msg = envelope.msg.as_deref().unwrap();
    assert!(msg.contains("kind=type"), "msg: {}", msg);
    assert!(msg.contains("'vlan'"), "msg: {}", msg);

    // not even the login was attempted
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn poll_timeout_surfaces_last_record() {
    let server = mock_controller().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/Lab", VLAN_PATH)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(VLAN_PATH))
        .respond_with(
            ResponseTemplate::new(202)
                .set_body_json(json!({"task_id": "T1", "status_url": "/task/T1"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/task/T1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"progress": "in progress"})))
        .mount(&server)
        .await;

    let envelope = run(
        &server,
        "vlan",
        json!({
            "name": "Lab",
            "vlan": 10,
            "state": "present",
            "task_poll_interval_seconds": 2,
            "task_timeout_seconds": 6,
        }),
    )
    .await;

    assert!(envelope.failed);
    assert!(!envelope.changed);
    assert!(envelope.msg.as_deref().unwrap().contains("kind=timeout"));
    assert_eq!(
        envelope.controller_response["last_task"]["progress"],
        json!("in progress")
    );

    // three polls fit inside the six second deadline
    let polls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/task/T1")
        .count();
    assert_eq!(polls, 3);
}

// ============================================================================
// Universal invariants
// ============================================================================

#[tokio::test]
async fn absent_on_absent_resource_is_a_noop() {
    let server = mock_controller().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/Lab", VLAN_PATH)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let envelope = run(&server, "vlan", json!({"name": "Lab", "state": "absent"})).await;
    assert!(!envelope.changed);
    assert!(!envelope.failed, "msg: {:?}", envelope.msg);
}

#[tokio::test]
async fn check_mode_issues_no_mutating_method() {
    let server = mock_controller().await;
    // only the read probe is mounted; any POST/PUT/DELETE would fail the run
    Mock::given(method("GET"))
        .and(path(format!("{}/Lab", VLAN_PATH)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let ctx = ModuleContext::new().with_check_mode(true);
    let envelope = run_with_ctx(
        &server,
        "vlan",
        json!({"name": "Lab", "vlan": 10, "state": "present"}),
        &ctx,
    )
    .await;

    assert!(envelope.changed, "check mode still reports the decision");
    assert!(!envelope.failed, "msg: {:?}", envelope.msg);
    for request in server.received_requests().await.unwrap() {
        if request.method.to_string() != "GET" {
            assert_eq!(request.url.path(), AUTH_PATH, "only the login may mutate");
        }
    }
}

#[tokio::test]
async fn check_mode_delete_reports_without_deleting() {
    let server = mock_controller().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/Lab", VLAN_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"response": {"id": "X", "name": "Lab", "vlanId": 10}}),
        ))
        .mount(&server)
        .await;

    let ctx = ModuleContext::new().with_check_mode(true);
    let envelope = run_with_ctx(
        &server,
        "vlan",
        json!({"name": "Lab", "state": "absent"}),
        &ctx,
    )
    .await;

    assert!(envelope.changed);
    assert!(!envelope.failed, "msg: {:?}", envelope.msg);
    assert!(envelope.diagnostics.contains("would be deleted"));
}

#[tokio::test]
async fn cancellation_between_requests_stops_the_run() {
    let server = mock_controller().await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let ctx = ModuleContext::new().with_cancel(cancel);

    let envelope = run_with_ctx(
        &server,
        "vlan",
        json!({"name": "Lab", "vlan": 10, "state": "present"}),
        &ctx,
    )
    .await;

    assert!(envelope.failed);
    assert!(envelope.msg.as_deref().unwrap().contains("kind=cancelled"));
    assert!(envelope.diagnostics.contains("cancelled"));

    // the login was already in flight; the read was never issued
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.path(), AUTH_PATH);
}

#[tokio::test]
async fn client_error_surfaces_body_verbatim() {
    let server = mock_controller().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/Lab", VLAN_PATH)))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"detail": "RBAC denied"})))
        .mount(&server)
        .await;

    let envelope = run(
        &server,
        "vlan",
        json!({"name": "Lab", "vlan": 10, "state": "present"}),
    )
    .await;

    assert!(envelope.failed);
    assert!(envelope.msg.as_deref().unwrap().contains("kind=client"));
    assert_eq!(envelope.controller_response["detail"], json!("RBAC denied"));
}

#[tokio::test]
async fn server_errors_are_retried_then_surfaced() {
    let server = mock_controller().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/Lab", VLAN_PATH)))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"detail": "maintenance"})))
        .mount(&server)
        .await;

    let envelope = run(
        &server,
        "vlan",
        json!({"name": "Lab", "vlan": 10, "state": "present"}),
    )
    .await;

    assert!(envelope.failed);
    assert!(envelope.msg.as_deref().unwrap().contains("kind=server"));

    // default policy: three attempts against the read endpoint
    let reads = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().starts_with(VLAN_PATH))
        .count();
    assert_eq!(reads, 3);
}

// ============================================================================
// Site module: nested schema, set-compared floors, task-id polling
// ============================================================================

#[tokio::test]
async fn site_create_polls_task_by_id() {
    let server = mock_controller().await;
    Mock::given(method("GET"))
        .and(path("/dna/intent/api/v1/site/HQ"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dna/intent/api/v1/site/HQ"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": {
            "id": "S1",
            "name": "HQ",
            "parentName": "Global",
            "floors": [{"name": "first", "floorNumber": 1}]
        }})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/dna/intent/api/v1/site"))
        .respond_with(
            ResponseTemplate::new(202).set_body_json(json!({"response": {"taskId": "T7"}})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dna/intent/api/v1/task/T7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"response": {"progress": "completed", "endTime": 5}}),
        ))
        .mount(&server)
        .await;

    let envelope = run(
        &server,
        "site",
        json!({
            "name": "HQ",
            "floors": [{"name": "first", "number": 1}],
            "state": "present",
        }),
    )
    .await;

    assert!(envelope.changed);
    assert!(!envelope.failed, "msg: {:?}", envelope.msg);
    assert_eq!(envelope.controller_response["task"]["endTime"], json!(5));
}

#[tokio::test]
async fn site_floor_reorder_is_not_a_change() {
    let server = mock_controller().await;
    Mock::given(method("GET"))
        .and(path("/dna/intent/api/v1/site/HQ"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": {
            "id": "S1",
            "name": "HQ",
            "parentName": "Global",
            "floors": [
                {"name": "second", "floorNumber": 2},
                {"name": "first", "floorNumber": 1}
            ]
        }})))
        .mount(&server)
        .await;

    let envelope = run(
        &server,
        "site",
        json!({
            "name": "HQ",
            "floors": [
                {"name": "first", "number": 1},
                {"name": "second", "number": 2}
            ],
        }),
    )
    .await;

    assert!(!envelope.changed, "set comparison must ignore order");
    assert!(!envelope.failed, "msg: {:?}", envelope.msg);
}

// ============================================================================
// Info module: query state, response shape
// ============================================================================

#[tokio::test]
async fn device_query_reports_unchanged() {
    let server = mock_controller().await;
    Mock::given(method("GET"))
        .and(path("/dna/intent/api/v1/network-device"))
        .and(query_param("hostname", "sw1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": [{"hostname": "sw1", "managementIpAddress": "10.0.0.1"}],
            "version": "1.0"
        })))
        .mount(&server)
        .await;

    let envelope = run(&server, "device_info", json!({"hostname": "sw1"})).await;

    assert!(!envelope.changed);
    assert!(!envelope.failed, "msg: {:?}", envelope.msg);
    assert!(envelope.diagnostics.contains("1 device"));
    assert!(envelope.warnings.is_empty());
}

#[tokio::test]
async fn shape_mismatch_is_a_warning_not_a_failure() {
    let server = mock_controller().await;
    Mock::given(method("GET"))
        .and(path("/dna/intent/api/v1/network-device"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"devices": []})))
        .mount(&server)
        .await;

    let envelope = run(&server, "device_info", json!({"hostname": "sw1"})).await;

    assert!(!envelope.failed, "msg: {:?}", envelope.msg);
    assert_eq!(envelope.warnings.len(), 1);
    assert!(envelope.warnings[0].contains("missing expected keys"));
}
