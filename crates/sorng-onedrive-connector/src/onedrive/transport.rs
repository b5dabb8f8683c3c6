//! HTTP transport abstraction.
//!
//! `RestClient` never talks to reqwest directly: it hands an `HttpRequest`
//! to an `HttpTransport` and classifies the `RawResponse` it gets back.
//! `ReqwestTransport` is the real network; `ScriptedTransport` replays a
//! queue of canned responses and records every request it was given.

use bytes::Bytes;
use log::debug;
use reqwest::Method;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / response
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Request payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
    Bytes(Bytes),
}

/// A single HTTP request, fully described.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = RequestBody::Form(fields);
        self
    }

    pub fn bytes(mut self, data: Bytes) -> Self {
        self.body = RequestBody::Bytes(data);
        self
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header_value(name).is_some()
    }

    /// Form field lookup, for assertions on token requests.
    pub fn form_value(&self, name: &str) -> Option<&str> {
        match &self.body {
            RequestBody::Form(fields) => fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }
}

/// What came back over the wire, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    /// Raw `Content-Type` header, empty when absent.
    pub content_type: String,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, "application/json", body.to_string())
    }

    pub fn empty(status: u16) -> Self {
        Self::new(status, "", Bytes::new())
    }

    pub fn html(status: u16, body: impl Into<String>) -> Self {
        Self::new(status, "text/html; charset=utf-8", body.into())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Result of a download attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    /// Status was exactly 200; this many bytes went into the sink.
    Written(u64),
    /// Anything else, left for the classifier.
    Response(RawResponse),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request did not produce a response.
    #[error("{0}")]
    Network(String),
    /// The response arrived but the download sink rejected it.
    #[error("failed writing download: {0}")]
    Sink(#[from] std::io::Error),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transport trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Abstract HTTP transport.
///
/// Implementations must be `Send + Sync` so they can be shared behind an
/// `Arc` by every component of a connector.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform exactly one request.
    async fn send(&self, request: &HttpRequest) -> Result<RawResponse, TransportError>;

    /// Perform one request and copy a 200 body into `sink`.
    async fn download(
        &self,
        request: &HttpRequest,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<DownloadOutcome, TransportError> {
        let response = self.send(request).await?;
        if response.status != 200 {
            return Ok(DownloadOutcome::Response(response));
        }
        sink.write_all(&response.body).await?;
        sink.flush().await?;
        Ok(DownloadOutcome::Written(response.body.len() as u64))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reqwest transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Network transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    inner: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { inner })
    }

    fn build(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let mut builder = self.inner.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            // reqwest derives the length from the body itself.
            if name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(fields) => builder.form(fields),
            RequestBody::Bytes(data) => builder.body(data.clone()),
        }
    }

    fn content_type(response: &reqwest::Response) -> String {
        response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        debug!("{} {}", request.method, request.url);
        let response = self
            .build(request)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let content_type = Self::content_type(&response);
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        debug!("{} {} -> {}", request.method, request.url, status);
        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }

    async fn download(
        &self,
        request: &HttpRequest,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<DownloadOutcome, TransportError> {
        debug!("{} {} (download)", request.method, request.url);
        let mut response = self
            .build(request)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        if status != 200 {
            let content_type = Self::content_type(&response);
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;
            return Ok(DownloadOutcome::Response(RawResponse {
                status,
                content_type,
                body,
            }));
        }

        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?
        {
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;
        Ok(DownloadOutcome::Written(written))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A fully in-memory transport for tests and offline demos.
///
/// Responses are served in the order they were queued regardless of the
/// request; every request is recorded for later assertions.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<RawResponse, String>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn push(&self, response: RawResponse) {
        self.responses.lock().await.push_back(Ok(response));
    }

    pub async fn push_json(&self, status: u16, body: Value) {
        self.push(RawResponse::json(status, &body)).await;
    }

    /// Queue a transport-level failure (no response at all).
    pub async fn push_network_error(&self, detail: impl Into<String>) {
        self.responses.lock().await.push_back(Err(detail.into()));
    }

    /// Every request seen so far, in order.
    pub async fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    pub async fn remaining(&self) -> usize {
        self.responses.lock().await.len()
    }
}

#[async_trait::async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        self.requests.lock().await.push(request.clone());
        match self.responses.lock().await.pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(detail)) => Err(TransportError::Network(detail)),
            None => Err(TransportError::Network(format!(
                "no scripted response for {} {}",
                request.method, request.url
            ))),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn scripted_replays_in_order_and_records() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, json!({"n": 1})).await;
        transport.push_network_error("connection reset").await;

        let first = transport.send(&HttpRequest::get("https://a/1")).await.unwrap();
        assert_eq!(first.status, 200);
        assert_eq!(first.text(), r#"{"n":1}"#);

        let second = transport.send(&HttpRequest::get("https://a/2")).await;
        assert!(matches!(second, Err(TransportError::Network(ref d)) if d == "connection reset"));

        let third = transport.send(&HttpRequest::get("https://a/3")).await;
        assert!(third.is_err());

        let urls: Vec<String> = transport.requests().await.into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["https://a/1", "https://a/2", "https://a/3"]);
    }

    #[tokio::test]
    async fn default_download_writes_only_on_200() {
        let transport = ScriptedTransport::new();
        transport.push(RawResponse::new(200, "application/octet-stream", "hello")).await;
        transport.push(RawResponse::empty(302)).await;

        let mut sink: Vec<u8> = Vec::new();
        let outcome = transport
            .download(&HttpRequest::get("https://dl/1"), &mut sink)
            .await
            .unwrap();
        assert_eq!(outcome, DownloadOutcome::Written(5));
        assert_eq!(sink, b"hello");

        let outcome = transport
            .download(&HttpRequest::get("https://dl/2"), &mut sink)
            .await
            .unwrap();
        assert!(matches!(outcome, DownloadOutcome::Response(r) if r.status == 302));
        assert_eq!(sink.len(), 5);
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = HttpRequest::post("https://x")
            .header("Content-Type", "text/plain")
            .form(vec![("grant_type".into(), "refresh_token".into())]);
        assert_eq!(req.header_value("content-type"), Some("text/plain"));
        assert_eq!(req.form_value("grant_type"), Some("refresh_token"));
        assert!(!req.has_header("authorization"));
    }
}
