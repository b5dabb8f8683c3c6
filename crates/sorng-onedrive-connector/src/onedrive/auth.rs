//! OAuth2 token lifecycle for Microsoft Graph / OneDrive.
//!
//! Implements the two grants the connector needs against the Microsoft
//! identity platform v2.0 (`{login}/{tenant}/oauth2/v2.0/token`):
//!
//! - **Authorization code** – the code dropped off by the callback router
//!   after the operator consented in a browser.
//! - **Refresh token** – silently mints a new access token once the Graph
//!   API reports the current one as expired.
//!
//! Every successful grant replaces the stored token record wholesale, is
//! written to the state store and read back. A read-back that does not match
//! fails the grant: the next run would otherwise start with a stale token.

use crate::onedrive::api_client::RestClient;
use crate::onedrive::config::ConnectorConfig;
use crate::onedrive::error::{OneDriveError, OneDriveErrorKind, OneDriveResult};
use crate::onedrive::state_store::{StateStore, StateStoreError};
use crate::onedrive::transport::HttpRequest;
use crate::onedrive::types::{ConnectorState, TokenPair, TokenRecord};
use chrono::Utc;
use log::{debug, info, warn};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde_json::Value;
use std::sync::Arc;

const STATE_WRITE_FAILED: &str = "Error occurred while saving the newly generated access token \
(in place of the expired token) in the state file. Please check the owner, owner group, and the \
permissions of the state file. The connector process needs read and write access to it.";

/// Where the token manager is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    NoToken,
    HasAccessToken,
    RefreshInFlight,
}

/// Build the URL the operator's browser is sent to for consent.
pub fn build_authorization_url(config: &ConnectorConfig, redirect_uri: &str, state: &str) -> String {
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&state={}&scope={}",
        config.authorize_url(),
        utf8_percent_encode(&config.client_id, NON_ALPHANUMERIC),
        utf8_percent_encode(redirect_uri, NON_ALPHANUMERIC),
        utf8_percent_encode(state, NON_ALPHANUMERIC),
        utf8_percent_encode(&config.scope, NON_ALPHANUMERIC),
    )
}

/// Owns the token pair and the persisted state for one asset.
pub struct TokenManager {
    rest: RestClient,
    client_id: String,
    client_secret: String,
    scope: String,
    token_url: String,
    store: Arc<dyn StateStore>,
    asset_id: String,
    state: ConnectorState,
    status: TokenStatus,
}

impl TokenManager {
    /// Create a manager and load whatever state the store holds for `asset_id`.
    pub fn new(
        config: &ConnectorConfig,
        rest: RestClient,
        store: Arc<dyn StateStore>,
        asset_id: impl Into<String>,
    ) -> Self {
        let asset_id = asset_id.into();
        let state = store.load(&asset_id);
        let status = status_for(&state);
        debug!("Loaded state for asset {} ({:?})", asset_id, status);
        Self {
            rest,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scope: config.scope.clone(),
            token_url: config.token_url(),
            store,
            asset_id,
            state,
            status,
        }
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    pub fn status(&self) -> TokenStatus {
        self.status
    }

    pub fn tokens(&self) -> TokenPair {
        self.state.tokens()
    }

    /// Current access token; an empty stored token counts as none.
    pub fn access_token(&self) -> Option<&str> {
        self.state
            .token
            .as_ref()
            .map(|t| t.access_token.as_str())
            .filter(|t| !t.is_empty())
    }

    pub fn has_refresh_token(&self) -> bool {
        self.state
            .token
            .as_ref()
            .and_then(|t| t.refresh_token.as_deref())
            .is_some()
    }

    pub fn state(&self) -> &ConnectorState {
        &self.state
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Replace the in-memory state wholesale (token included).
    pub fn replace_state(&mut self, state: ConnectorState) {
        self.status = status_for(&state);
        self.state = state;
    }

    /// Re-read the state from the store.
    pub fn reload(&mut self) {
        let state = self.store.load(&self.asset_id);
        self.replace_state(state);
    }

    /// Write the in-memory state to the store.
    pub fn persist(&self) -> Result<(), StateStoreError> {
        self.store.save(&self.asset_id, &self.state).map_err(|e| {
            warn!("Failed to save state for asset {}: {}", self.asset_id, e);
            e
        })
    }

    /// Redeem an authorization code.
    pub async fn exchange_authorization_code(
        &mut self,
        code: &str,
        redirect_uri: &str,
    ) -> OneDriveResult<TokenPair> {
        let fields = vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("redirect_uri".to_string(), redirect_uri.to_string()),
            ("code".to_string(), code.to_string()),
        ];
        let pair = self.request_token(fields).await?;
        info!("Authorization code exchanged for asset {}", self.asset_id);
        Ok(pair)
    }

    /// Mint a new access token from the stored refresh token.
    pub async fn refresh_access_token(&mut self) -> OneDriveResult<TokenPair> {
        let refresh_token = self
            .state
            .token
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
            .ok_or_else(|| OneDriveError::auth("Refresh token is not available"))?;

        let previous = self.status;
        self.status = TokenStatus::RefreshInFlight;
        let fields = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh_token),
        ];
        match self.request_token(fields).await {
            Ok(pair) => {
                info!("Token refreshed successfully");
                Ok(pair)
            }
            Err(e) => {
                self.status = previous;
                Err(e)
            }
        }
    }

    async fn request_token(&mut self, grant: Vec<(String, String)>) -> OneDriveResult<TokenPair> {
        let mut fields = vec![
            ("client_id".to_string(), self.client_id.clone()),
            ("scope".to_string(), self.scope.clone()),
            ("client_secret".to_string(), self.client_secret.clone()),
        ];
        fields.extend(grant);

        let request = HttpRequest::post(&self.token_url).form(fields);
        let body = self.rest.execute(&request).await.map_err(into_auth_error)?;
        let record = parse_token_response(body)?;

        self.state.token = Some(record.clone());
        self.status = TokenStatus::HasAccessToken;
        self.verify_persisted(&record)?;
        Ok(TokenPair::from(&record))
    }

    fn verify_persisted(&self, record: &TokenRecord) -> OneDriveResult<()> {
        // A failed write surfaces through the read-back below.
        let _ = self.persist();
        let reloaded = self.store.load(&self.asset_id);
        let stored = reloaded.token.as_ref().map(|t| t.access_token.as_str());
        if stored != Some(record.access_token.as_str()) {
            return Err(OneDriveError::new(
                OneDriveErrorKind::StateIntegrity,
                STATE_WRITE_FAILED,
            ));
        }
        Ok(())
    }
}

fn status_for(state: &ConnectorState) -> TokenStatus {
    if state.token.as_ref().is_some_and(|t| !t.access_token.is_empty()) {
        TokenStatus::HasAccessToken
    } else {
        TokenStatus::NoToken
    }
}

/// Token endpoint rejections are auth failures; transport failures stay as they are.
fn into_auth_error(err: OneDriveError) -> OneDriveError {
    match err.kind {
        OneDriveErrorKind::ApiError
        | OneDriveErrorKind::HttpError
        | OneDriveErrorKind::UnrecognizedContentType => OneDriveError {
            kind: OneDriveErrorKind::AuthError,
            ..err
        },
        _ => err,
    }
}

fn parse_token_response(body: Value) -> OneDriveResult<TokenRecord> {
    let has_token = body
        .get("access_token")
        .and_then(Value::as_str)
        .is_some_and(|t| !t.is_empty());
    if !has_token {
        let message = body
            .get("error_description")
            .and_then(Value::as_str)
            .unwrap_or("Error while generating access_token");
        return Err(OneDriveError::auth(message));
    }
    let mut record: TokenRecord = serde_json::from_value(body)
        .map_err(|e| OneDriveError::auth(format!("Invalid token response: {}", e)))?;
    record.obtained_at = Some(Utc::now());
    Ok(record)
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onedrive::state_store::MemoryStateStore;
    use crate::onedrive::transport::ScriptedTransport;
    use serde_json::json;

    /// Accepts every write and forgets it.
    struct ForgetfulStore;

    impl StateStore for ForgetfulStore {
        fn load(&self, _asset_id: &str) -> ConnectorState {
            ConnectorState::default()
        }
        fn save(&self, _asset_id: &str, _state: &ConnectorState) -> Result<(), StateStoreError> {
            Ok(())
        }
    }

    fn config() -> ConnectorConfig {
        ConnectorConfig::new("app-id", "app-secret")
    }

    fn manager(transport: Arc<ScriptedTransport>, store: Arc<dyn StateStore>) -> TokenManager {
        TokenManager::new(&config(), RestClient::new(transport), store, "asset1")
    }

    #[test]
    fn test_authorization_url() {
        let url = build_authorization_url(&config(), "http://localhost:8400/onedrive/result", "asset1");
        assert!(url.starts_with(
            "https://login.microsoftonline.com/common/oauth2/v2.0/authorize?client_id=app%2Did"
        ));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8400%2Fonedrive%2Fresult"));
        assert!(url.contains("&response_type=code&state=asset1&"));
        assert!(url.ends_with("scope=offline%5Faccess%20files%2Ereadwrite%2Eall"));
    }

    #[tokio::test]
    async fn exchange_persists_and_sends_form() {
        let transport = ScriptedTransport::new();
        transport
            .push_json(200, json!({"access_token": "at1", "refresh_token": "rt1", "expires_in": 3600}))
            .await;
        let store = Arc::new(MemoryStateStore::new());
        let mut tm = manager(transport.clone(), store.clone());
        assert_eq!(tm.status(), TokenStatus::NoToken);

        let pair = tm
            .exchange_authorization_code("the-code", "http://cb/result")
            .await
            .unwrap();
        assert_eq!(pair.access_token.as_deref(), Some("at1"));
        assert_eq!(tm.status(), TokenStatus::HasAccessToken);
        assert_eq!(store.load("asset1").tokens(), pair);

        let sent = &transport.requests().await[0];
        assert_eq!(
            sent.url,
            "https://login.microsoftonline.com/common/oauth2/v2.0/token"
        );
        assert_eq!(sent.form_value("grant_type"), Some("authorization_code"));
        assert_eq!(sent.form_value("code"), Some("the-code"));
        assert_eq!(sent.form_value("redirect_uri"), Some("http://cb/result"));
        assert_eq!(sent.form_value("client_secret"), Some("app-secret"));
        assert!(!sent.has_header("authorization"));
    }

    #[tokio::test]
    async fn refresh_replaces_pair_wholesale() {
        let transport = ScriptedTransport::new();
        transport
            .push_json(200, json!({"access_token": "at1", "refresh_token": "rt1"}))
            .await;
        transport.push_json(200, json!({"access_token": "at2"})).await;
        let store = Arc::new(MemoryStateStore::new());
        let mut tm = manager(transport.clone(), store.clone());

        tm.exchange_authorization_code("c", "r").await.unwrap();
        let pair = tm.refresh_access_token().await.unwrap();
        assert_eq!(
            pair,
            TokenPair {
                access_token: Some("at2".into()),
                refresh_token: None,
            }
        );
        let sent = &transport.requests().await[1];
        assert_eq!(sent.form_value("grant_type"), Some("refresh_token"));
        assert_eq!(sent.form_value("refresh_token"), Some("rt1"));
    }

    #[tokio::test]
    async fn missing_access_token_uses_error_description() {
        let transport = ScriptedTransport::new();
        transport
            .push_json(200, json!({"error_description": "AADSTS50126: invalid credentials"}))
            .await;
        transport.push_json(200, json!({"token_type": "Bearer"})).await;
        let mut tm = manager(transport, Arc::new(MemoryStateStore::new()));

        let err = tm.exchange_authorization_code("c", "r").await.unwrap_err();
        assert_eq!(err.kind, OneDriveErrorKind::AuthError);
        assert_eq!(err.message, "AADSTS50126: invalid credentials");

        let err = tm.exchange_authorization_code("c", "r").await.unwrap_err();
        assert_eq!(err.message, "Error while generating access_token");
        assert_eq!(tm.status(), TokenStatus::NoToken);
    }

    #[tokio::test]
    async fn rejected_grant_is_auth_error() {
        let transport = ScriptedTransport::new();
        transport
            .push_json(400, json!({"error": "invalid_grant", "error_codes": [70008], "error_description": "expired"}))
            .await;
        let store = Arc::new(MemoryStateStore::new());
        store
            .save(
                "asset1",
                &serde_json::from_value(json!({"token": {"access_token": "old", "refresh_token": "rt"}})).unwrap(),
            )
            .unwrap();
        let mut tm = manager(transport, store);
        assert_eq!(tm.status(), TokenStatus::HasAccessToken);

        let err = tm.refresh_access_token().await.unwrap_err();
        assert!(err.is_auth_error());
        assert!(err.message.contains("ErrorCode: 70008"));
        assert_eq!(tm.status(), TokenStatus::HasAccessToken);
        assert_eq!(tm.access_token(), Some("old"));
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_fails_fast() {
        let transport = ScriptedTransport::new();
        let mut tm = manager(transport.clone(), Arc::new(MemoryStateStore::new()));
        let err = tm.refresh_access_token().await.unwrap_err();
        assert!(err.is_auth_error());
        assert_eq!(transport.request_count().await, 0);
    }

    #[tokio::test]
    async fn unverifiable_write_is_state_integrity_error() {
        let transport = ScriptedTransport::new();
        transport
            .push_json(200, json!({"access_token": "at1", "refresh_token": "rt1"}))
            .await;
        let mut tm = manager(transport, Arc::new(ForgetfulStore));

        let err = tm.exchange_authorization_code("c", "r").await.unwrap_err();
        assert_eq!(err.kind, OneDriveErrorKind::StateIntegrity);
        assert!(err.is_auth_error());
        assert!(err.message.contains("permissions of the state file"));
    }
}
