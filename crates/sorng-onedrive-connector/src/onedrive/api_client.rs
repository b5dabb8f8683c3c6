//! Single-shot REST dispatch.
//!
//! `RestClient` performs exactly one request per call through the shared
//! transport and runs the result through the response classifier. It knows
//! nothing about tokens; see `authorized` for bearer handling.

use crate::onedrive::classifier::classify;
use crate::onedrive::config::ConnectorConfig;
use crate::onedrive::error::{OneDriveError, OneDriveResult};
use crate::onedrive::transport::{
    DownloadOutcome, HttpRequest, HttpTransport, ReqwestTransport, TransportError,
};
use log::debug;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWrite;

/// Low-level REST client over an injected transport.
#[derive(Clone)]
pub struct RestClient {
    transport: Arc<dyn HttpTransport>,
}

impl RestClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Client backed by the network, honouring the configured timeout.
    pub fn from_config(config: &ConnectorConfig) -> OneDriveResult<Self> {
        let transport = ReqwestTransport::new(Duration::from_secs(config.timeout_sec))
            .map_err(|e| OneDriveError::config(e.to_string()))?;
        Ok(Self::new(Arc::new(transport)))
    }

    /// Issue the request and classify whatever comes back.
    pub async fn execute(&self, request: &HttpRequest) -> OneDriveResult<Value> {
        debug!("{} {}", request.method, request.url);
        let response = self
            .transport
            .send(request)
            .await
            .map_err(map_transport_error)?;
        debug!("{} {} -> {}", request.method, request.url, response.status);
        classify(&response)
    }

    /// Stream a 200 body into `sink`; anything else is classified and, when
    /// the classifier accepts it, reported as zero bytes written.
    pub async fn download(
        &self,
        request: &HttpRequest,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> OneDriveResult<u64> {
        debug!("{} {} (download)", request.method, request.url);
        match self
            .transport
            .download(request, sink)
            .await
            .map_err(map_transport_error)?
        {
            DownloadOutcome::Written(bytes) => Ok(bytes),
            DownloadOutcome::Response(response) => classify(&response).map(|_| 0),
        }
    }
}

fn map_transport_error(err: TransportError) -> OneDriveError {
    match err {
        TransportError::Network(detail) => OneDriveError::connection(detail),
        TransportError::Sink(io) => io.into(),
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
