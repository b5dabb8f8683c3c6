//! Shared fixtures for unit tests.

use crate::onedrive::api_client::RestClient;
use crate::onedrive::auth::TokenManager;
use crate::onedrive::authorized::{AuthorizedClient, ClientContext};
use crate::onedrive::config::ConnectorConfig;
use crate::onedrive::state_store::{MemoryStateStore, StateStore};
use crate::onedrive::transport::ScriptedTransport;
use crate::onedrive::types::ConnectorState;
use serde_json::{json, Value};
use std::sync::Arc;

pub const ASSET: &str = "asset1";

pub fn signed_in_state() -> ConnectorState {
    serde_json::from_value(json!({
        "token": {"access_token": "at", "refresh_token": "rt"}
    }))
    .unwrap()
}

/// A client that already holds a token pair.
pub fn authorized_client(transport: Arc<ScriptedTransport>) -> AuthorizedClient {
    authorized_client_with(transport, ConnectorConfig::new("id", "secret"))
}

pub fn authorized_client_with(
    transport: Arc<ScriptedTransport>,
    config: ConnectorConfig,
) -> AuthorizedClient {
    let store = Arc::new(MemoryStateStore::new());
    store.save(ASSET, &signed_in_state()).unwrap();
    let rest = RestClient::new(transport);
    let tokens = TokenManager::new(&config, rest.clone(), store, ASSET);
    AuthorizedClient::new(ClientContext::new(config, rest), tokens)
}

pub fn file(id: &str, name: &str, size: u64) -> Value {
    json!({
        "id": id,
        "name": name,
        "size": size,
        "file": {"mimeType": "application/octet-stream"},
        "parentReference": {"driveId": "d1", "path": "/drive/root:/"}
    })
}

pub fn folder(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "folder": {"childCount": 1},
        "parentReference": {"driveId": "d1", "path": "/drive/root:"}
    })
}

pub fn page(items: Vec<Value>, next: Option<&str>) -> Value {
    let mut body = json!({"value": items});
    if let Some(link) = next {
        body["@odata.nextLink"] = json!(link);
    }
    body
}
