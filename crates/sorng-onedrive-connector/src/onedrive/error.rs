//! Error types for the OneDrive connector.
//!
//! All public API surfaces in this crate return `OneDriveResult<T>`.

use crate::onedrive::classifier::escape_braces;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Convenience alias.
pub type OneDriveResult<T> = Result<T, OneDriveError>;

/// Substring the Graph API puts in the error message of an expired bearer token.
pub const TOKEN_EXPIRED_MARKER: &str = "Access token has expired";

/// Failure categories surfaced by the connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OneDriveErrorKind {
    /// DNS, TLS, reset, timeout: the request never produced a response.
    ConnectionError,
    /// The server claimed JSON but the body did not parse.
    ParseError,
    /// Structured error returned by the API.
    ApiError,
    /// Non-JSON failure (HTML error page, empty body with bad status).
    HttpError,
    /// Body present but the content type is neither JSON nor HTML.
    UnrecognizedContentType,
    /// Token endpoint rejected the exchange.
    AuthError,
    /// Neither an access token nor a refresh token is available.
    NoCredentials,
    /// Token was written to the state store but did not read back identically.
    StateIntegrity,
    /// Caller supplied missing or contradictory parameters.
    ValidationError,
    /// Remote item does not exist or has no content.
    NotFound,
    /// Local object vault failure.
    VaultError,
    /// Upload session ended in an inconsistent state.
    UploadFailed,
    /// The interactive authorization window elapsed.
    Timeout,
    /// Connector configuration is unusable.
    ConfigError,
}

impl fmt::Display for OneDriveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Structured error returned by every public function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneDriveError {
    pub kind: OneDriveErrorKind,
    pub message: String,
    pub status: Option<u16>,
}

impl fmt::Display for OneDriveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)?;
        if let Some(status) = self.status {
            write!(f, " (HTTP {})", status)?;
        }
        Ok(())
    }
}

impl std::error::Error for OneDriveError {}

impl OneDriveError {
    /// Create from a kind + message.
    pub fn new(kind: OneDriveErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            status: None,
        }
    }

    /// Attach the HTTP status the failure came from.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Shortcut: transport failure.
    pub fn connection(detail: impl fmt::Display) -> Self {
        Self::new(
            OneDriveErrorKind::ConnectionError,
            format!(
                "Error Connecting to server. Details: {}",
                escape_braces(&detail.to_string())
            ),
        )
    }

    /// Shortcut: auth failure.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::new(OneDriveErrorKind::AuthError, msg)
    }

    /// Shortcut: no credentials at all.
    pub fn no_credentials() -> Self {
        Self::new(
            OneDriveErrorKind::NoCredentials,
            "Access token and refresh token are not available. Please run test connectivity first.",
        )
    }

    /// Shortcut: validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(OneDriveErrorKind::ValidationError, msg)
    }

    /// Shortcut: not found.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(OneDriveErrorKind::NotFound, msg)
    }

    /// Shortcut: upload failure.
    pub fn upload(msg: impl Into<String>) -> Self {
        Self::new(OneDriveErrorKind::UploadFailed, msg)
    }

    /// Shortcut: configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(OneDriveErrorKind::ConfigError, msg)
    }

    /// `true` for every failure that belongs to the authentication category.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self.kind,
            OneDriveErrorKind::AuthError
                | OneDriveErrorKind::NoCredentials
                | OneDriveErrorKind::StateIntegrity
        )
    }

    /// `true` when the server said the bearer token has expired.
    pub fn is_token_expired(&self) -> bool {
        self.message.contains(TOKEN_EXPIRED_MARKER)
    }

    /// Append context to the message, keeping kind and status.
    pub fn context(mut self, suffix: &str) -> Self {
        self.message.push_str(suffix);
        self
    }
}

impl From<reqwest::Error> for OneDriveError {
    fn from(err: reqwest::Error) -> Self {
        Self::connection(err)
    }
}

impl From<serde_json::Error> for OneDriveError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(
            OneDriveErrorKind::ParseError,
            format!("Unable to parse JSON response. Error: {}", err),
        )
    }
}

impl From<url::ParseError> for OneDriveError {
    fn from(err: url::ParseError) -> Self {
        Self::validation(format!("URL parse error: {}", err))
    }
}

impl From<std::io::Error> for OneDriveError {
    fn from(err: std::io::Error) -> Self {
        Self::new(OneDriveErrorKind::VaultError, format!("I/O error: {}", err))
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
