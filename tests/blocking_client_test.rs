// Integration tests for the blocking client using wiremock.
//
// The mock server runs on a private tokio runtime; the blocking client is
// driven from the plain test thread, as it would be in a script. The
// runtime is returned so it outlives the server it hosts.

use std::time::Duration;

use serde_json::json;
use tokio::runtime::Runtime;
use wiremock::matchers::{basic_auth, body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use save_restore_client::{BlockingSaveRestoreClient, ClientError, Payload, ROOT_NODE_UID};

fn setup() -> (Runtime, MockServer, BlockingSaveRestoreClient) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("tokio runtime for the mock server");
    let server = runtime.block_on(MockServer::start());
    let client = BlockingSaveRestoreClient::new(server.uri()).expect("valid mock server url");
    (runtime, server, client)
}

#[test]
fn login_round_trip() {
    let (runtime, server, client) = setup();

    runtime.block_on(
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_json(json!({"username": "user", "password": "userPass"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "userName": "user",
                "roles": ["ROLE_SAR-USER"]
            })))
            .mount(&server),
    );

    let response = client.login("user", "userPass").unwrap();
    assert_eq!(response.json().unwrap()["userName"], "user");
}

#[test]
fn session_credential_is_attached_to_mutating_calls() {
    let (runtime, server, mut client) = setup();
    client.auth_set("user", "userPass");

    runtime.block_on(
        Mock::given(method("PUT"))
            .and(path("/node"))
            .and(query_param("parentNodeId", ROOT_NODE_UID))
            .and(basic_auth("user", "userPass"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uniqueId": "folder-1",
                "nodeType": "FOLDER"
            })))
            .mount(&server),
    );

    let response = client
        .node_add(ROOT_NODE_UID, "New Folder", "FOLDER", None, None)
        .unwrap();
    assert_eq!(response.json().unwrap()["uniqueId"], "folder-1");
}

#[test]
fn per_call_credential_overrides_the_session_for_one_call() {
    let (runtime, server, mut client) = setup();
    client.auth_set("user", "userPass");

    runtime.block_on(async {
        Mock::given(method("POST"))
            .and(path("/restore/node"))
            .and(basic_auth("admin", "adminPass"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"restored": true}])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/restore/node"))
            .and(basic_auth("user", "userPass"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
    });

    let admin = BlockingSaveRestoreClient::auth_gen("admin", "adminPass");
    let first = client.restore_node("snap-1", Some(&admin)).unwrap();
    assert_eq!(first.json().unwrap()[0]["restored"], true);

    let second = client.restore_node("snap-1", None).unwrap();
    assert_eq!(second, Payload::Json(json!([])));
}

#[test]
fn reads_never_carry_credentials() {
    let (runtime, server, mut client) = setup();
    client.auth_set("user", "userPass");

    runtime.block_on(
        Mock::given(method("GET"))
            .and(path(format!("/node/{ROOT_NODE_UID}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uniqueId": ROOT_NODE_UID,
                "nodeType": "FOLDER"
            })))
            .mount(&server),
    );

    client.node_get(ROOT_NODE_UID).unwrap();

    let requests = runtime.block_on(server.received_requests()).unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[test]
fn missing_node_is_a_client_error() {
    let (runtime, server, client) = setup();

    runtime.block_on(
        Mock::given(method("GET"))
            .and(path("/node/missing"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"detail": "Node not found"})),
            )
            .mount(&server),
    );

    let err = client.node_get("missing").unwrap_err();
    assert!(matches!(err, ClientError::Client { .. }), "got: {err:?}");
    assert!(err.to_string().contains("Node not found"));
}

#[test]
fn empty_body_maps_to_the_no_content_sentinel() {
    let (runtime, server, mut client) = setup();
    client.auth_set("user", "userPass");

    runtime.block_on(
        Mock::given(method("DELETE"))
            .and(path("/node/folder-1"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server),
    );

    let response = client.node_delete("folder-1", None).unwrap();
    assert!(response.is_empty());
}

#[test]
fn slow_responses_are_classified_as_timeouts() {
    let (runtime, server, client) = setup();
    let client = client.with_timeout(Duration::from_millis(100));

    runtime.block_on(
        Mock::given(method("GET"))
            .and(path("/version"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"version": "4.0.0"}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server),
    );

    let err = client.version_get().unwrap_err();
    assert!(matches!(err, ClientError::Timeout { .. }), "got: {err:?}");
}

#[test]
fn invalid_node_type_fails_before_any_request_is_sent() {
    let (runtime, server, client) = setup();

    runtime.block_on(
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&server),
    );

    let err = client
        .node_add(ROOT_NODE_UID, "snap", "SNAPSHOT", None, None)
        .unwrap_err();
    assert!(matches!(err, ClientError::Parameter(_)), "got: {err:?}");

    let requests = runtime.block_on(server.received_requests()).unwrap();
    assert!(requests.is_empty());
}

#[test]
fn config_create_and_read_back() {
    let (runtime, server, mut client) = setup();
    client.auth_set("user", "userPass");

    let pv_list = json!([{"pvName": "simulated:A"}, {"pvName": "simulated:B"}]);

    runtime.block_on(async {
        Mock::given(method("PUT"))
            .and(path("/config"))
            .and(query_param("parentNodeId", "folder-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "configurationNode": {"uniqueId": "config-1", "nodeType": "CONFIGURATION"},
                "configurationData": {"uniqueId": "config-1", "pvList": pv_list}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/config/config-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uniqueId": "config-1",
                "pvList": pv_list
            })))
            .mount(&server)
            .await;
    });

    let created = client
        .config_create(
            "folder-1",
            &json!({"name": "Config"}),
            &json!({"pvList": pv_list}),
            None,
        )
        .unwrap();
    let config_uid = created.json().unwrap()["configurationNode"]["uniqueId"]
        .as_str()
        .unwrap()
        .to_owned();

    let data = client.config_get(&config_uid).unwrap();
    assert_eq!(data.json().unwrap()["pvList"].as_array().unwrap().len(), 2);
}
