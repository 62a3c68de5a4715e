//! Request preparation for every remote operation.
//!
//! Each function here is a pure mapping from logical arguments to a
//! [`PreparedRequest`]; nothing in this module touches the network. Both
//! client personalities consume these requests through their `send_request`
//! method, so an operation is defined exactly once.

use reqwest::Method;
use serde_json::{Map, Value, json};
use url::form_urlencoded::byte_serialize;

use crate::error::ClientError;

/// Unique id of the root folder node, fixed across all deployments of the
/// service.
pub const ROOT_NODE_UID: &str = "44bef5de-e8e6-4014-af37-b8f6c8a939a2";

/// Node types that [`node_add`] is allowed to create. Snapshot-type nodes
/// are created through the snapshot endpoints instead.
pub const CREATABLE_NODE_TYPES: [&str; 2] = ["FOLDER", "CONFIGURATION"];

/// A transport-agnostic description of one HTTP request.
///
/// Query parameters and the JSON body are kept separate all the way to the
/// wire; preparers never fold one into the other.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// HTTP method.
    pub method: Method,
    /// Endpoint path relative to the service base URL.
    pub path: String,
    /// Query parameters, serialized into the URL by the transport.
    pub query: Vec<(String, String)>,
    /// JSON request body, if the operation has one.
    pub body: Option<Value>,
    /// Extra headers for this request.
    pub headers: Vec<(String, String)>,
}

impl PreparedRequest {
    /// Starts a request with no query, body or extra headers. Useful
    /// together with `send_request` for endpoints this crate has no named
    /// operation for.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
        }
    }

    /// Appends one query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets the JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Appends one header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Percent-encodes a value so it is safe to embed as a single path segment.
fn encode_path_segment(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect()
}

// ── Service info ────────────────────────────────────────────────────────

/// `GET /` request for general information on the service.
pub fn info_get() -> PreparedRequest {
    PreparedRequest::new(Method::GET, "/")
}

/// `GET /version` request for the service name and version.
pub fn version_get() -> PreparedRequest {
    PreparedRequest::new(Method::GET, "/version")
}

/// `GET /help/{what}` request for a help page, optionally in a specific
/// language.
pub fn help_get(what: &str, lang: Option<&str>) -> PreparedRequest {
    let mut request =
        PreparedRequest::new(Method::GET, format!("/help/{}", encode_path_segment(what)));
    if let Some(lang) = lang {
        request = request.with_query("lang", lang);
    }
    request
}

/// `POST /login` request carrying the credentials in the body.
pub fn login(username: &str, password: &str) -> PreparedRequest {
    PreparedRequest::new(Method::POST, "/login")
        .with_body(json!({"username": username, "password": password}))
}

// ── Nodes ───────────────────────────────────────────────────────────────

/// `GET /node/{id}` request for a single node.
pub fn node_get(unique_node_id: &str) -> PreparedRequest {
    PreparedRequest::new(
        Method::GET,
        format!("/node/{}", encode_path_segment(unique_node_id)),
    )
}

/// `GET /nodes` request for multiple nodes; the id list rides in the body.
pub fn nodes_get(unique_ids: &[&str]) -> PreparedRequest {
    PreparedRequest::new(Method::GET, "/nodes").with_body(json!(unique_ids))
}

/// `PUT /node?parentNodeId=` request creating a folder or configuration
/// node.
///
/// `extra` fields (for example `description`) are merged into the node
/// body; `name` and `nodeType` always win on collision. Unsupported
/// `node_type` values are rejected before any I/O.
pub fn node_add(
    parent_node_id: &str,
    name: &str,
    node_type: &str,
    extra: Option<&Value>,
) -> Result<PreparedRequest, ClientError> {
    if !CREATABLE_NODE_TYPES.contains(&node_type) {
        return Err(ClientError::Parameter(format!(
            "invalid nodeType '{node_type}', supported types: {CREATABLE_NODE_TYPES:?}"
        )));
    }
    let mut body = match extra {
        Some(Value::Object(fields)) => fields.clone(),
        Some(other) => {
            return Err(ClientError::Parameter(format!(
                "extra node fields must be a JSON object, got: {other}"
            )));
        }
        None => Map::new(),
    };
    body.insert("name".into(), json!(name));
    body.insert("nodeType".into(), json!(node_type));
    Ok(PreparedRequest::new(Method::PUT, "/node")
        .with_query("parentNodeId", parent_node_id)
        .with_body(Value::Object(body)))
}

/// `DELETE /node/{id}` request removing one node.
pub fn node_delete(node_id: &str) -> PreparedRequest {
    PreparedRequest::new(
        Method::DELETE,
        format!("/node/{}", encode_path_segment(node_id)),
    )
}

/// `DELETE /node` request removing multiple nodes; the id list rides in
/// the body.
pub fn nodes_delete(unique_ids: &[&str]) -> PreparedRequest {
    PreparedRequest::new(Method::DELETE, "/node").with_body(json!(unique_ids))
}

/// `GET /node/{id}/children` request listing the direct children.
pub fn node_get_children(unique_node_id: &str) -> PreparedRequest {
    PreparedRequest::new(
        Method::GET,
        format!("/node/{}/children", encode_path_segment(unique_node_id)),
    )
}

/// `GET /node/{id}/parent` request for the parent node.
pub fn node_get_parent(unique_node_id: &str) -> PreparedRequest {
    PreparedRequest::new(
        Method::GET,
        format!("/node/{}/parent", encode_path_segment(unique_node_id)),
    )
}

// ── Configurations ──────────────────────────────────────────────────────

/// `GET /config/{id}` request for the configuration data of a node.
pub fn config_get(unique_node_id: &str) -> PreparedRequest {
    PreparedRequest::new(
        Method::GET,
        format!("/config/{}", encode_path_segment(unique_node_id)),
    )
}

/// `PUT /config?parentNodeId=` request creating a configuration node
/// together with its data.
pub fn config_create(
    parent_node_id: &str,
    configuration_node: &Value,
    configuration_data: &Value,
) -> PreparedRequest {
    PreparedRequest::new(Method::PUT, "/config")
        .with_query("parentNodeId", parent_node_id)
        .with_body(json!({
            "configurationNode": configuration_node,
            "configurationData": configuration_data,
        }))
}

/// `POST /config` request updating an existing configuration node and its
/// data.
pub fn config_update(configuration_node: &Value, configuration_data: &Value) -> PreparedRequest {
    PreparedRequest::new(Method::POST, "/config").with_body(json!({
        "configurationNode": configuration_node,
        "configurationData": configuration_data,
    }))
}

// ── Tags ────────────────────────────────────────────────────────────────

/// `GET /tags` request listing all tags known to the service.
pub fn tags_get() -> PreparedRequest {
    PreparedRequest::new(Method::GET, "/tags")
}

/// `POST /tags` request adding a tag to each of the listed nodes.
pub fn tags_add(unique_node_ids: &[&str], tag: &Value) -> PreparedRequest {
    PreparedRequest::new(Method::POST, "/tags").with_body(json!({
        "uniqueNodeIds": unique_node_ids,
        "tag": tag,
    }))
}

/// `DELETE /tags` request removing a tag from each of the listed nodes.
pub fn tags_delete(unique_node_ids: &[&str], tag: &Value) -> PreparedRequest {
    PreparedRequest::new(Method::DELETE, "/tags").with_body(json!({
        "uniqueNodeIds": unique_node_ids,
        "tag": tag,
    }))
}

// ── Snapshots ───────────────────────────────────────────────────────────

/// `GET /take-snapshot/{id}` request reading live PV values for a
/// configuration without persisting them.
pub fn take_snapshot_get(unique_node_id: &str) -> PreparedRequest {
    PreparedRequest::new(
        Method::GET,
        format!("/take-snapshot/{}", encode_path_segment(unique_node_id)),
    )
}

/// `PUT /take-snapshot/{id}` request taking a snapshot and persisting it
/// under the configuration node.
pub fn take_snapshot_save(
    unique_node_id: &str,
    name: Option<&str>,
    comment: Option<&str>,
) -> PreparedRequest {
    let mut request = PreparedRequest::new(
        Method::PUT,
        format!("/take-snapshot/{}", encode_path_segment(unique_node_id)),
    );
    if let Some(name) = name {
        request = request.with_query("name", name);
    }
    if let Some(comment) = comment {
        request = request.with_query("comment", comment);
    }
    request
}

/// `GET /snapshot/{id}` request for the stored data of a snapshot node.
pub fn snapshot_get(unique_id: &str) -> PreparedRequest {
    PreparedRequest::new(
        Method::GET,
        format!("/snapshot/{}", encode_path_segment(unique_id)),
    )
}

/// `GET /snapshots` request listing all snapshot nodes.
pub fn snapshots_get() -> PreparedRequest {
    PreparedRequest::new(Method::GET, "/snapshots")
}

/// `PUT /snapshot?parentNodeId=` request storing client-side snapshot data
/// as a new snapshot node.
pub fn snapshot_add(
    parent_node_id: &str,
    snapshot_node: &Value,
    snapshot_data: &Value,
) -> PreparedRequest {
    PreparedRequest::new(Method::PUT, "/snapshot")
        .with_query("parentNodeId", parent_node_id)
        .with_body(json!({
            "snapshotNode": snapshot_node,
            "snapshotData": snapshot_data,
        }))
}

/// `POST /snapshot` request updating an existing snapshot node and its
/// data.
pub fn snapshot_update(snapshot_node: &Value, snapshot_data: &Value) -> PreparedRequest {
    PreparedRequest::new(Method::POST, "/snapshot").with_body(json!({
        "snapshotNode": snapshot_node,
        "snapshotData": snapshot_data,
    }))
}

// ── Restore ─────────────────────────────────────────────────────────────

/// `POST /restore/node?nodeId=` request writing a stored snapshot back to
/// the live PVs.
pub fn restore_node(node_id: &str) -> PreparedRequest {
    PreparedRequest::new(Method::POST, "/restore/node").with_query("nodeId", node_id)
}

/// `POST /restore/items` request writing caller-supplied snapshot items
/// back to the live PVs; the item list rides in the body.
pub fn restore_items(snapshot_items: &Value) -> PreparedRequest {
    PreparedRequest::new(Method::POST, "/restore/items").with_body(snapshot_items.clone())
}

// ── Search and compare ──────────────────────────────────────────────────

/// `GET /search` request; every `(key, value)` pair becomes one query
/// parameter understood by the service, for example `name` or `user`.
pub fn search(params: &[(&str, &str)]) -> PreparedRequest {
    let mut request = PreparedRequest::new(Method::GET, "/search");
    for (key, value) in params {
        request = request.with_query(*key, *value);
    }
    request
}

/// `GET /compare/{id}` request comparing a snapshot or composite snapshot
/// against the live PV values.
pub fn compare(
    node_id: &str,
    tolerance: Option<f64>,
    compare_mode: Option<&str>,
    skip_readback: Option<bool>,
) -> PreparedRequest {
    let mut request = PreparedRequest::new(
        Method::GET,
        format!("/compare/{}", encode_path_segment(node_id)),
    );
    if let Some(tolerance) = tolerance {
        request = request.with_query("tolerance", tolerance.to_string());
    }
    if let Some(mode) = compare_mode {
        request = request.with_query("compareMode", mode);
    }
    if let Some(skip) = skip_readback {
        request = request.with_query("skipReadback", skip.to_string());
    }
    request
}

// ── Structure ───────────────────────────────────────────────────────────

/// `POST /move?to=` request moving the listed nodes under a new parent.
/// Requires an account with the admin role.
pub fn structure_move(node_ids: &[&str], new_parent_node_id: &str) -> PreparedRequest {
    PreparedRequest::new(Method::POST, "/move")
        .with_query("to", new_parent_node_id)
        .with_body(json!(node_ids))
}

/// `POST /copy?to=` request copying the listed nodes under a new parent.
/// Requires an account with the admin role.
pub fn structure_copy(node_ids: &[&str], new_parent_node_id: &str) -> PreparedRequest {
    PreparedRequest::new(Method::POST, "/copy")
        .with_query("to", new_parent_node_id)
        .with_body(json!(node_ids))
}

/// `GET /path/{id}` request resolving a node id to its full path.
pub fn structure_path_get(unique_node_id: &str) -> PreparedRequest {
    PreparedRequest::new(
        Method::GET,
        format!("/path/{}", encode_path_segment(unique_node_id)),
    )
}

/// `GET /path?path=` request resolving a path to the nodes at that
/// location. Several nodes of different types may share one path.
pub fn structure_path_nodes(path: &str) -> PreparedRequest {
    PreparedRequest::new(Method::GET, "/path").with_query("path", path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_add_rejects_unsupported_node_type() {
        let err = node_add(ROOT_NODE_UID, "snap", "SNAPSHOT", None).unwrap_err();
        assert!(matches!(err, ClientError::Parameter(_)));
        assert!(err.to_string().contains("SNAPSHOT"));
    }

    #[test]
    fn node_add_merges_extra_fields_without_overriding_name_and_type() {
        let extra = json!({"description": "beamline optics", "name": "ignored"});
        let request = node_add("parent-1", "optics", "FOLDER", Some(&extra)).unwrap();
        let body = request.body.unwrap();
        assert_eq!(body["name"], "optics");
        assert_eq!(body["nodeType"], "FOLDER");
        assert_eq!(body["description"], "beamline optics");
        assert_eq!(request.query, vec![("parentNodeId".into(), "parent-1".into())]);
    }

    #[test]
    fn node_add_rejects_non_object_extra_fields() {
        let err = node_add("parent-1", "optics", "FOLDER", Some(&json!([1, 2]))).unwrap_err();
        assert!(matches!(err, ClientError::Parameter(_)));
    }

    #[test]
    fn path_parameters_are_percent_encoded() {
        let request = node_get("a b/c");
        assert_eq!(request.path, "/node/a+b%2Fc");
    }

    #[test]
    fn login_carries_credentials_in_the_body_only() {
        let request = login("user", "userPass");
        assert!(request.query.is_empty());
        assert_eq!(
            request.body.unwrap(),
            json!({"username": "user", "password": "userPass"})
        );
    }

    #[test]
    fn config_create_keeps_parent_in_query_and_payload_in_body() {
        let node = json!({"name": "cfg"});
        let data = json!({"pvList": [{"pvName": "X:Y"}]});
        let request = config_create("parent-1", &node, &data);
        assert_eq!(request.method, Method::PUT);
        assert_eq!(request.query, vec![("parentNodeId".into(), "parent-1".into())]);
        let body = request.body.unwrap();
        assert_eq!(body["configurationNode"], node);
        assert_eq!(body["configurationData"], data);
    }

    #[test]
    fn take_snapshot_save_omits_absent_query_parameters() {
        let bare = take_snapshot_save("cfg-1", None, None);
        assert!(bare.query.is_empty());

        let named = take_snapshot_save("cfg-1", Some("snap"), Some("nightly"));
        assert_eq!(
            named.query,
            vec![
                ("name".into(), "snap".into()),
                ("comment".into(), "nightly".into())
            ]
        );
    }

    #[test]
    fn search_turns_pairs_into_query_parameters() {
        let request = search(&[("name", "eiger"), ("type", "CONFIGURATION")]);
        assert_eq!(request.method, Method::GET);
        assert!(request.body.is_none());
        assert_eq!(
            request.query,
            vec![
                ("name".into(), "eiger".into()),
                ("type".into(), "CONFIGURATION".into())
            ]
        );
    }

    #[test]
    fn structure_move_sends_target_in_query_and_ids_in_body() {
        let request = structure_move(&["id-1", "id-2"], "parent-2");
        assert_eq!(request.query, vec![("to".into(), "parent-2".into())]);
        assert_eq!(request.body.unwrap(), json!(["id-1", "id-2"]));
    }
}
