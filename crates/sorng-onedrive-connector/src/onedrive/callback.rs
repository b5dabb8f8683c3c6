//! Interactive OAuth callback surface.
//!
//! Two routes, both keyed by asset id:
//!
//! - `GET /start_oauth?asset_id=…` redirects the operator's browser to the
//!   authorization URL that `test_connectivity` stored for that asset.
//! - `GET /result?state=…&code=…` is the redirect URI; it drops the
//!   authorization code into the asset's state where the polling
//!   connectivity test picks it up.

use crate::onedrive::config::ConnectorConfig;
use crate::onedrive::state_store::StateStore;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use log::{info, warn};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Clone)]
pub struct CallbackState {
    store: Arc<dyn StateStore>,
}

#[derive(Debug, Deserialize)]
pub struct StartParams {
    asset_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResultParams {
    state: Option<String>,
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Routes relative to the callback base path.
pub fn router(store: Arc<dyn StateStore>) -> Router {
    Router::new()
        .route("/start_oauth", get(start_oauth))
        .route("/result", get(oauth_result))
        .with_state(CallbackState { store })
}

/// Bind to the host and port of `callback_base_url` and serve the routes
/// under its path until the listener fails.
pub async fn serve(config: &ConnectorConfig, store: Arc<dyn StateStore>) -> std::io::Result<()> {
    let base = url::Url::parse(&config.callback_base_url)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let host = base.host_str().unwrap_or("127.0.0.1").to_string();
    let port = base.port_or_known_default().unwrap_or(80);

    let prefix = base.path().trim_end_matches('/');
    let app = if prefix.is_empty() {
        router(store)
    } else {
        Router::new().nest(prefix, router(store))
    };

    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    info!("OAuth callback listening on {}", config.callback_base_url);
    axum::serve(listener, app).await
}

async fn start_oauth(State(state): State<CallbackState>, Query(params): Query<StartParams>) -> Response {
    let Some(asset_id) = params.asset_id.filter(|a| !a.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "ERROR: Asset ID not found in URL").into_response();
    };
    let app_state = state.store.load(&asset_id);
    match app_state.authorization_url {
        Some(url) => (StatusCode::FOUND, [(header::LOCATION, url)]).into_response(),
        None => (
            StatusCode::BAD_REQUEST,
            "App state is invalid, authorization_url key not found",
        )
            .into_response(),
    }
}

async fn oauth_result(
    State(state): State<CallbackState>,
    Query(params): Query<ResultParams>,
) -> (StatusCode, String) {
    let Some(asset_id) = params.state.filter(|a| !a.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "ERROR: Invalid asset_id".into());
    };
    if let Some(error) = params.error {
        warn!("Authorization for asset {} failed: {}", asset_id, error);
        return (
            StatusCode::BAD_REQUEST,
            format!(
                "Server returned Error: {} Details: {}",
                error,
                params.error_description.unwrap_or_default()
            ),
        );
    }
    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            "Error while authenticating. Authorization code not found".into(),
        );
    };

    let mut app_state = state.store.load(&asset_id);
    app_state.code = Some(code);
    if let Err(e) = state.store.save(&asset_id, &app_state) {
        warn!("Could not store authorization code for {}: {}", asset_id, e);
        return (
            StatusCode::BAD_REQUEST,
            format!("Unable to store the authorization code: {}", e),
        );
    }
    info!("Authorization code received for asset {}", asset_id);
    (
        StatusCode::OK,
        "Code received. Please close this window, the action will continue to get new token.".into(),
    )
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
