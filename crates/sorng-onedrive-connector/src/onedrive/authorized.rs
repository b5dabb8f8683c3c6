//! Bearer-authenticated Graph calls.
//!
//! `AuthorizedClient` resolves relative endpoints against the Graph base URL,
//! attaches the current access token, and recovers from exactly one
//! token-expired response per call by refreshing and retrying once.

use crate::onedrive::api_client::RestClient;
use crate::onedrive::auth::TokenManager;
use crate::onedrive::config::ConnectorConfig;
use crate::onedrive::error::{OneDriveError, OneDriveResult};
use crate::onedrive::transport::{HttpRequest, RequestBody};
use log::{debug, info};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;

/// Shared, immutable context every component is built from.
#[derive(Clone)]
pub struct ClientContext {
    pub config: Arc<ConnectorConfig>,
    pub rest: RestClient,
}

impl ClientContext {
    pub fn new(config: ConnectorConfig, rest: RestClient) -> Self {
        Self {
            config: Arc::new(config),
            rest,
        }
    }

    /// Absolute URLs (continuation links, download URLs) pass through.
    pub fn resolve(&self, endpoint: &str) -> String {
        if endpoint.starts_with("https://") || endpoint.starts_with("http://") {
            endpoint.to_string()
        } else {
            format!(
                "{}/{}",
                self.config.graph_base_url.trim_end_matches('/'),
                endpoint.trim_start_matches('/')
            )
        }
    }
}

/// A Graph call before authentication is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCall {
    pub method: Method,
    pub endpoint: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiCall {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn post_json(endpoint: impl Into<String>, body: Value) -> Self {
        let mut call = Self::new(Method::POST, endpoint);
        call.body = RequestBody::Json(body);
        call
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }
}

/// Graph client that owns the token lifecycle.
pub struct AuthorizedClient {
    ctx: ClientContext,
    tokens: TokenManager,
}

impl AuthorizedClient {
    pub fn new(ctx: ClientContext, tokens: TokenManager) -> Self {
        Self { ctx, tokens }
    }

    pub fn context(&self) -> &ClientContext {
        &self.ctx
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut TokenManager {
        &mut self.tokens
    }

    /// Run one call, refreshing the access token at most once.
    pub async fn call(&mut self, call: &ApiCall) -> OneDriveResult<Value> {
        let mut refreshed = false;
        if self.tokens.access_token().is_none() {
            if !self.tokens.has_refresh_token() {
                return Err(OneDriveError::no_credentials());
            }
            debug!("No access token held, refreshing before {}", call.endpoint);
            self.tokens.refresh_access_token().await?;
            refreshed = true;
        }

        let result = self.send(call).await;
        match result {
            Err(e) if e.is_token_expired() && !refreshed => {
                info!("Access token expired, refreshing and retrying {}", call.endpoint);
                self.tokens.refresh_access_token().await?;
                self.send(call).await
            }
            other => other,
        }
    }

    async fn send(&self, call: &ApiCall) -> OneDriveResult<Value> {
        let request = self.build_request(call)?;
        self.ctx.rest.execute(&request).await
    }

    fn build_request(&self, call: &ApiCall) -> OneDriveResult<HttpRequest> {
        let token = self
            .tokens
            .access_token()
            .ok_or_else(OneDriveError::no_credentials)?;

        let mut request = HttpRequest::new(call.method.clone(), self.ctx.resolve(&call.endpoint))
            .header("Authorization", format!("Bearer {}", token));
        if !call
            .headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        {
            request = request.header("Content-Type", "application/json");
        }
        request.headers.extend(call.headers.iter().cloned());
        request.query = call.query.clone();
        request.body = call.body.clone();
        Ok(request)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onedrive::error::OneDriveErrorKind;
    use crate::onedrive::state_store::{MemoryStateStore, StateStore};
    use crate::onedrive::transport::ScriptedTransport;
    use serde_json::json;

    const EXPIRED: &str = "Access token has expired or is not yet valid.";

    fn client_with_state(transport: Arc<ScriptedTransport>, state: Value) -> AuthorizedClient {
        let store = Arc::new(MemoryStateStore::new());
        store
            .save("asset1", &serde_json::from_value(state).unwrap())
            .unwrap();
        let config = ConnectorConfig::new("id", "secret");
        let rest = RestClient::new(transport);
        let tokens = TokenManager::new(&config, rest.clone(), store, "asset1");
        AuthorizedClient::new(ClientContext::new(config, rest), tokens)
    }

    fn expired_body() -> Value {
        json!({"error": {"code": "InvalidAuthenticationToken", "message": EXPIRED}})
    }

    #[test]
    fn resolve_relative_and_absolute() {
        let ctx = ClientContext::new(
            ConnectorConfig::new("id", "secret"),
            RestClient::new(ScriptedTransport::new()),
        );
        assert_eq!(ctx.resolve("/me/drives"), "https://graph.microsoft.com/v1.0/me/drives");
        assert_eq!(ctx.resolve("me"), "https://graph.microsoft.com/v1.0/me");
        assert_eq!(
            ctx.resolve("https://graph.microsoft.com/v1.0/me/drives?$skiptoken=x"),
            "https://graph.microsoft.com/v1.0/me/drives?$skiptoken=x"
        );
    }

    #[tokio::test]
    async fn attaches_bearer_and_default_content_type() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, json!({"id": "u1"})).await;
        transport.push_json(200, json!({})).await;
        let mut client =
            client_with_state(transport.clone(), json!({"token": {"access_token": "at"}}));

        client.call(&ApiCall::get("/me")).await.unwrap();
        client
            .call(&ApiCall::get("/me").with_header("content-type", "text/plain"))
            .await
            .unwrap();

        let sent = transport.requests().await;
        assert_eq!(sent[0].url, "https://graph.microsoft.com/v1.0/me");
        assert_eq!(sent[0].header_value("authorization"), Some("Bearer at"));
        assert_eq!(sent[0].header_value("content-type"), Some("application/json"));
        assert_eq!(sent[1].header_value("Content-Type"), Some("text/plain"));
        assert_eq!(
            sent[1]
                .headers
                .iter()
                .filter(|(k, _)| k.eq_ignore_ascii_case("content-type"))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn no_credentials_at_all() {
        let transport = ScriptedTransport::new();
        let mut client = client_with_state(transport.clone(), json!({}));
        let err = client.call(&ApiCall::get("/me")).await.unwrap_err();
        assert_eq!(err.kind, OneDriveErrorKind::NoCredentials);
        assert_eq!(transport.request_count().await, 0);
    }

    #[tokio::test]
    async fn refresh_first_when_only_refresh_token() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, json!({"access_token": "fresh", "refresh_token": "rt2"})).await;
        transport.push_json(200, json!({"id": "u1"})).await;
        let mut client = client_with_state(
            transport.clone(),
            json!({"token": {"access_token": "", "refresh_token": "rt"}}),
        );
        assert!(client.tokens().access_token().is_none());

        let out = client.call(&ApiCall::get("/me")).await.unwrap();
        assert_eq!(out["id"], "u1");
        let sent = transport.requests().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].form_value("grant_type"), Some("refresh_token"));
        assert_eq!(sent[1].header_value("authorization"), Some("Bearer fresh"));
    }

    #[tokio::test]
    async fn expiry_after_refresh_first_is_final() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, json!({"access_token": "fresh", "refresh_token": "rt2"})).await;
        transport.push_json(401, expired_body()).await;
        transport.push_json(200, json!({"access_token": "again", "refresh_token": "rt3"})).await;
        transport.push_json(200, json!({"id": "u1"})).await;
        let mut client = client_with_state(
            transport.clone(),
            json!({"token": {"access_token": "", "refresh_token": "rt"}}),
        );

        let err = client.call(&ApiCall::get("/me")).await.unwrap_err();
        assert!(err.is_token_expired());
        let sent = transport.requests().await;
        let refreshes = sent
            .iter()
            .filter(|r| r.form_value("grant_type") == Some("refresh_token"))
            .count();
        assert_eq!(refreshes, 1);
        assert_eq!(sent.len(), 2);
        assert_eq!(transport.remaining().await, 2);
    }

    #[tokio::test]
    async fn refresh_only_state_refreshes_first() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, json!({"access_token": "fresh", "refresh_token": "rt2"})).await;
        transport.push_json(200, json!({"id": "u1"})).await;
        let mut client = client_with_state(
            transport.clone(),
            json!({"token": {"refresh_token": "rt"}, "code": "c"}),
        );
        assert!(client.tokens().has_refresh_token());
        assert_eq!(client.tokens().state().code.as_deref(), Some("c"));

        let out = client.call(&ApiCall::get("/me")).await.unwrap();
        assert_eq!(out["id"], "u1");
        let sent = transport.requests().await;
        assert_eq!(sent[0].form_value("refresh_token"), Some("rt"));
        assert_eq!(sent[1].header_value("authorization"), Some("Bearer fresh"));
    }

    #[tokio::test]
    async fn expired_token_refreshes_once_and_retries_once() {
        let transport = ScriptedTransport::new();
        transport.push_json(401, expired_body()).await;
        transport.push_json(200, json!({"access_token": "at2", "refresh_token": "rt2"})).await;
        transport.push_json(200, json!({"id": "u1"})).await;
        let mut client = client_with_state(
            transport.clone(),
            json!({"token": {"access_token": "at1", "refresh_token": "rt1"}}),
        );

        let out = client.call(&ApiCall::get("/me")).await.unwrap();
        assert_eq!(out["id"], "u1");
        let sent = transport.requests().await;
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].header_value("authorization"), Some("Bearer at1"));
        assert_eq!(sent[2].header_value("authorization"), Some("Bearer at2"));
    }

    #[tokio::test]
    async fn second_expiry_is_final() {
        let transport = ScriptedTransport::new();
        transport.push_json(401, expired_body()).await;
        transport.push_json(200, json!({"access_token": "at2", "refresh_token": "rt2"})).await;
        transport.push_json(401, expired_body()).await;
        let mut client = client_with_state(
            transport.clone(),
            json!({"token": {"access_token": "at1", "refresh_token": "rt1"}}),
        );

        let err = client.call(&ApiCall::get("/me")).await.unwrap_err();
        assert!(err.is_token_expired());
        let refreshes = transport
            .requests()
            .await
            .iter()
            .filter(|r| r.form_value("grant_type") == Some("refresh_token"))
            .count();
        assert_eq!(refreshes, 1);
        assert_eq!(transport.request_count().await, 3);
    }

    #[tokio::test]
    async fn other_failures_do_not_refresh() {
        let transport = ScriptedTransport::new();
        transport
            .push_json(404, json!({"error": {"code": "itemNotFound", "message": "nope"}}))
            .await;
        let mut client = client_with_state(
            transport.clone(),
            json!({"token": {"access_token": "at1", "refresh_token": "rt1"}}),
        );
        let err = client.call(&ApiCall::get("/me/drive/items/x")).await.unwrap_err();
        assert_eq!(err.status, Some(404));
        assert_eq!(transport.request_count().await, 1);
    }
}
