use std::time::Duration;

use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use crate::DEFAULT_TIMEOUT;
use crate::auth::{Credential, effective_credential};
use crate::error::ClientError;
use crate::ops::{self, PreparedRequest};
use crate::response::{Payload, classify_transport_error, normalize_response};

/// Async client for the save-and-restore service.
///
/// The connection pool is acquired on construction and released on drop;
/// one instance is meant to be driven by a single task issuing requests
/// one at a time. Dropping the future of an in-flight call abandons that
/// request.
///
/// All operations are also available on [`crate::BlockingSaveRestoreClient`],
/// the synchronous personality with the identical contract.
#[derive(Clone, Debug)]
pub struct SaveRestoreClient {
    base_url: Url,
    timeout: Duration,
    auth: Option<Credential>,
    http: reqwest::Client,
}

impl SaveRestoreClient {
    /// Creates a new client with the given base URL, for example
    /// `http://localhost:8080/save-restore`.
    ///
    /// The URL is normalized to include a trailing slash, so relative
    /// endpoint paths join correctly. No credentials are attached; see
    /// [`Self::auth_set`].
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, ClientError> {
        let parsed = Url::parse(base_url.as_ref())
            .map_err(|_| ClientError::InvalidBaseUrl(base_url.as_ref().to_owned()))?;

        Ok(Self {
            base_url: ensure_trailing_slash(parsed),
            timeout: DEFAULT_TIMEOUT,
            auth: None,
            http: reqwest::Client::new(),
        })
    }

    /// Returns a new client with a different default timeout. Individual
    /// calls can still override it through [`Self::send_request`].
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Generates a credential for per-call authentication without touching
    /// the session state.
    pub fn auth_gen(username: &str, password: &str) -> Credential {
        Credential::new(username, password)
    }

    /// Stores a session credential used by every subsequent mutating call
    /// until [`Self::auth_clear`]. Reads never send credentials.
    pub fn auth_set(&mut self, username: &str, password: &str) {
        self.auth = Some(Credential::new(username, password));
    }

    /// Discards the session credential.
    pub fn auth_clear(&mut self) {
        self.auth = None;
    }

    /// Sends a prepared request, merging in the auth and timeout policy.
    ///
    /// `auth` overrides the session credential for this call only and
    /// `timeout` overrides the session default. This is the escape hatch
    /// for endpoints without a named operation; every named operation goes
    /// through here as well.
    pub async fn send_request(
        &self,
        request: PreparedRequest,
        auth: Option<&Credential>,
        timeout: Option<Duration>,
    ) -> Result<Payload, ClientError> {
        let method = request.method.clone();
        let path = request.path.clone();
        debug!(%method, %path, "sending request");

        let builder = self.assemble(request, auth, timeout)?;
        let response = builder
            .send()
            .await
            .map_err(|err| classify_transport_error(err, &method, &path))?;
        let status = response.status();
        let url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|err| classify_transport_error(err, &method, &path))?;

        normalize_response(status, &url, &body)
    }

    fn assemble(
        &self,
        request: PreparedRequest,
        auth: Option<&Credential>,
        timeout: Option<Duration>,
    ) -> Result<reqwest::RequestBuilder, ClientError> {
        let url = self.build_url(&request.path)?;
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(timeout.unwrap_or(self.timeout));

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(credential) = effective_credential(&request.method, auth, self.auth.as_ref()) {
            builder = builder.basic_auth(credential.username(), Some(credential.password()));
        }

        Ok(builder)
    }

    fn build_url(&self, path: &str) -> Result<Url, ClientError> {
        let relative = path.trim_start_matches('/');
        self.base_url
            .join(relative)
            .map_err(|_| ClientError::InvalidPath(path.to_owned()))
    }

    // ── Service info ────────────────────────────────────────────────────

    /// Returns general information on the service.
    ///
    /// `GET /`
    pub async fn info_get(&self) -> Result<Payload, ClientError> {
        self.send_request(ops::info_get(), None, None).await
    }

    /// Returns the service name and version.
    ///
    /// `GET /version`
    pub async fn version_get(&self) -> Result<Payload, ClientError> {
        self.send_request(ops::version_get(), None, None).await
    }

    /// Returns a help page, optionally in a specific language.
    ///
    /// `GET /help/{what}`
    pub async fn help_get(&self, what: &str, lang: Option<&str>) -> Result<Payload, ClientError> {
        self.send_request(ops::help_get(what, lang), None, None).await
    }

    /// Validates the given credentials and returns the account roles.
    ///
    /// `POST /login`
    pub async fn login(&self, username: &str, password: &str) -> Result<Payload, ClientError> {
        self.send_request(ops::login(username, password), None, None)
            .await
    }

    // ── Nodes ───────────────────────────────────────────────────────────

    /// Returns the node with the given id. The root folder id is
    /// [`crate::ROOT_NODE_UID`].
    ///
    /// `GET /node/{uniqueNodeId}`
    pub async fn node_get(&self, unique_node_id: &str) -> Result<Payload, ClientError> {
        self.send_request(ops::node_get(unique_node_id), None, None)
            .await
    }

    /// Returns the nodes for a list of ids.
    ///
    /// `GET /nodes`
    pub async fn nodes_get(&self, unique_ids: &[&str]) -> Result<Payload, ClientError> {
        self.send_request(ops::nodes_get(unique_ids), None, None)
            .await
    }

    /// Creates a new `FOLDER` or `CONFIGURATION` node under the given
    /// parent. `extra` fields such as `description` are merged into the
    /// node body.
    ///
    /// `PUT /node?parentNodeId={parentNodeId}`
    pub async fn node_add(
        &self,
        parent_node_id: &str,
        name: &str,
        node_type: &str,
        extra: Option<&Value>,
        auth: Option<&Credential>,
    ) -> Result<Payload, ClientError> {
        self.send_request(ops::node_add(parent_node_id, name, node_type, extra)?, auth, None)
            .await
    }

    /// Deletes the node with the given id, including any children.
    ///
    /// `DELETE /node/{nodeId}`
    pub async fn node_delete(
        &self,
        node_id: &str,
        auth: Option<&Credential>,
    ) -> Result<Payload, ClientError> {
        self.send_request(ops::node_delete(node_id), auth, None).await
    }

    /// Deletes every node in the list.
    ///
    /// `DELETE /node`
    pub async fn nodes_delete(
        &self,
        unique_ids: &[&str],
        auth: Option<&Credential>,
    ) -> Result<Payload, ClientError> {
        self.send_request(ops::nodes_delete(unique_ids), auth, None)
            .await
    }

    /// Returns the direct children of a node.
    ///
    /// `GET /node/{uniqueNodeId}/children`
    pub async fn node_get_children(&self, unique_node_id: &str) -> Result<Payload, ClientError> {
        self.send_request(ops::node_get_children(unique_node_id), None, None)
            .await
    }

    /// Returns the parent of a node.
    ///
    /// `GET /node/{uniqueNodeId}/parent`
    pub async fn node_get_parent(&self, unique_node_id: &str) -> Result<Payload, ClientError> {
        self.send_request(ops::node_get_parent(unique_node_id), None, None)
            .await
    }

    // ── Configurations ──────────────────────────────────────────────────

    /// Returns the configuration data of a node, including its PV list.
    ///
    /// `GET /config/{uniqueNodeId}`
    pub async fn config_get(&self, unique_node_id: &str) -> Result<Payload, ClientError> {
        self.send_request(ops::config_get(unique_node_id), None, None)
            .await
    }

    /// Creates a configuration node together with its data under the given
    /// parent folder.
    ///
    /// `PUT /config?parentNodeId={parentNodeId}`
    pub async fn config_create(
        &self,
        parent_node_id: &str,
        configuration_node: &Value,
        configuration_data: &Value,
        auth: Option<&Credential>,
    ) -> Result<Payload, ClientError> {
        self.send_request(
            ops::config_create(parent_node_id, configuration_node, configuration_data),
            auth,
            None,
        )
        .await
    }

    /// Updates an existing configuration node and its data.
    ///
    /// `POST /config`
    pub async fn config_update(
        &self,
        configuration_node: &Value,
        configuration_data: &Value,
        auth: Option<&Credential>,
    ) -> Result<Payload, ClientError> {
        self.send_request(
            ops::config_update(configuration_node, configuration_data),
            auth,
            None,
        )
        .await
    }

    // ── Tags ────────────────────────────────────────────────────────────

    /// Returns all tags known to the service.
    ///
    /// `GET /tags`
    pub async fn tags_get(&self) -> Result<Payload, ClientError> {
        self.send_request(ops::tags_get(), None, None).await
    }

    /// Adds a tag to each of the listed nodes.
    ///
    /// `POST /tags`
    pub async fn tags_add(
        &self,
        unique_node_ids: &[&str],
        tag: &Value,
        auth: Option<&Credential>,
    ) -> Result<Payload, ClientError> {
        self.send_request(ops::tags_add(unique_node_ids, tag), auth, None)
            .await
    }

    /// Removes a tag from each of the listed nodes.
    ///
    /// `DELETE /tags`
    pub async fn tags_delete(
        &self,
        unique_node_ids: &[&str],
        tag: &Value,
        auth: Option<&Credential>,
    ) -> Result<Payload, ClientError> {
        self.send_request(ops::tags_delete(unique_node_ids, tag), auth, None)
            .await
    }

    // ── Snapshots ───────────────────────────────────────────────────────

    /// Reads the live values of all PVs in a configuration without
    /// persisting anything.
    ///
    /// `GET /take-snapshot/{uniqueNodeId}`
    pub async fn take_snapshot_get(&self, unique_node_id: &str) -> Result<Payload, ClientError> {
        self.send_request(ops::take_snapshot_get(unique_node_id), None, None)
            .await
    }

    /// Takes a snapshot of a configuration and persists it under the
    /// configuration node.
    ///
    /// `PUT /take-snapshot/{uniqueNodeId}?name={name}&comment={comment}`
    pub async fn take_snapshot_save(
        &self,
        unique_node_id: &str,
        name: Option<&str>,
        comment: Option<&str>,
        auth: Option<&Credential>,
    ) -> Result<Payload, ClientError> {
        self.send_request(ops::take_snapshot_save(unique_node_id, name, comment), auth, None)
            .await
    }

    /// Returns the stored data of a snapshot node.
    ///
    /// `GET /snapshot/{uniqueId}`
    pub async fn snapshot_get(&self, unique_id: &str) -> Result<Payload, ClientError> {
        self.send_request(ops::snapshot_get(unique_id), None, None)
            .await
    }

    /// Returns all snapshot nodes.
    ///
    /// `GET /snapshots`
    pub async fn snapshots_get(&self) -> Result<Payload, ClientError> {
        self.send_request(ops::snapshots_get(), None, None).await
    }

    /// Stores client-side snapshot data as a new snapshot node under the
    /// given configuration.
    ///
    /// `PUT /snapshot?parentNodeId={parentNodeId}`
    pub async fn snapshot_add(
        &self,
        parent_node_id: &str,
        snapshot_node: &Value,
        snapshot_data: &Value,
        auth: Option<&Credential>,
    ) -> Result<Payload, ClientError> {
        self.send_request(
            ops::snapshot_add(parent_node_id, snapshot_node, snapshot_data),
            auth,
            None,
        )
        .await
    }

    /// Updates an existing snapshot node and its data.
    ///
    /// `POST /snapshot`
    pub async fn snapshot_update(
        &self,
        snapshot_node: &Value,
        snapshot_data: &Value,
        auth: Option<&Credential>,
    ) -> Result<Payload, ClientError> {
        self.send_request(ops::snapshot_update(snapshot_node, snapshot_data), auth, None)
            .await
    }

    // ── Restore ─────────────────────────────────────────────────────────

    /// Writes the values stored in a snapshot node back to the live PVs.
    ///
    /// `POST /restore/node?nodeId={nodeId}`
    pub async fn restore_node(
        &self,
        node_id: &str,
        auth: Option<&Credential>,
    ) -> Result<Payload, ClientError> {
        self.send_request(ops::restore_node(node_id), auth, None).await
    }

    /// Writes caller-supplied snapshot items back to the live PVs.
    ///
    /// `POST /restore/items`
    pub async fn restore_items(
        &self,
        snapshot_items: &Value,
        auth: Option<&Credential>,
    ) -> Result<Payload, ClientError> {
        self.send_request(ops::restore_items(snapshot_items), auth, None)
            .await
    }

    // ── Search and compare ──────────────────────────────────────────────

    /// Searches for nodes; each `(key, value)` pair becomes one query
    /// parameter understood by the service.
    ///
    /// `GET /search`
    pub async fn search(&self, params: &[(&str, &str)]) -> Result<Payload, ClientError> {
        self.send_request(ops::search(params), None, None).await
    }

    /// Compares a snapshot or composite snapshot against the live PV
    /// values.
    ///
    /// `GET /compare/{nodeId}`
    pub async fn compare(
        &self,
        node_id: &str,
        tolerance: Option<f64>,
        compare_mode: Option<&str>,
        skip_readback: Option<bool>,
    ) -> Result<Payload, ClientError> {
        self.send_request(
            ops::compare(node_id, tolerance, compare_mode, skip_readback),
            None,
            None,
        )
        .await
    }

    // ── Structure ───────────────────────────────────────────────────────

    /// Moves the listed nodes under a new parent folder. Requires an
    /// account with the admin role.
    ///
    /// `POST /move?to={newParentNodeId}`
    pub async fn structure_move(
        &self,
        node_ids: &[&str],
        new_parent_node_id: &str,
        auth: Option<&Credential>,
    ) -> Result<Payload, ClientError> {
        self.send_request(ops::structure_move(node_ids, new_parent_node_id), auth, None)
            .await
    }

    /// Copies the listed nodes under a new parent folder. Requires an
    /// account with the admin role.
    ///
    /// `POST /copy?to={newParentNodeId}`
    pub async fn structure_copy(
        &self,
        node_ids: &[&str],
        new_parent_node_id: &str,
        auth: Option<&Credential>,
    ) -> Result<Payload, ClientError> {
        self.send_request(ops::structure_copy(node_ids, new_parent_node_id), auth, None)
            .await
    }

    /// Resolves a node id to its full path.
    ///
    /// `GET /path/{uniqueNodeId}`
    pub async fn structure_path_get(&self, unique_node_id: &str) -> Result<Payload, ClientError> {
        self.send_request(ops::structure_path_get(unique_node_id), None, None)
            .await
    }

    /// Resolves a path such as `/detectors/eiger_config` to the nodes at
    /// that location.
    ///
    /// `GET /path?path={path}`
    pub async fn structure_path_nodes(&self, path: &str) -> Result<Payload, ClientError> {
        self.send_request(ops::structure_path_nodes(path), None, None)
            .await
    }
}

fn ensure_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let mut path = url.path().to_owned();
        path.push('/');
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::SaveRestoreClient;

    #[test]
    fn joins_paths_from_base_with_nested_prefix() {
        let client = SaveRestoreClient::new("https://example.com/save-restore").expect("valid url");
        let resolved = client.build_url("/node/abc").expect("valid path");
        assert_eq!(resolved.as_str(), "https://example.com/save-restore/node/abc");
    }

    #[test]
    fn with_timeout_replaces_the_default() {
        let client = SaveRestoreClient::new("https://example.com").expect("valid url");
        let client = client.with_timeout(std::time::Duration::from_secs(5));
        assert_eq!(client.timeout, std::time::Duration::from_secs(5));
    }
}
