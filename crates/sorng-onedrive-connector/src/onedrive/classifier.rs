//! Turns a raw HTTP response into a success payload or a typed failure.
//!
//! The rules are content-type driven: JSON bodies are parsed and their error
//! envelope extracted, HTML bodies are reduced to readable text, empty bodies
//! only succeed on 200/204. Every failure message has `{`/`}` doubled so it
//! can be fed to a format-style renderer downstream unchanged.

use crate::onedrive::error::{OneDriveError, OneDriveErrorKind, OneDriveResult};
use crate::onedrive::transport::RawResponse;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

lazy_static! {
    static ref NOISE_ELEMENTS: Vec<Regex> = ["script", "style", "footer", "nav"]
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>"))
                .expect("static element pattern")
        })
        .collect();
    static ref HTML_COMMENT: Regex = Regex::new(r"(?s)<!--.*?-->").expect("static comment pattern");
    static ref BLOCK_BREAK: Regex =
        Regex::new(r"(?i)<br\s*/?>|</(p|div|h[1-6]|li|tr|title)\s*>").expect("static break pattern");
    static ref HTML_TAG: Regex = Regex::new(r"(?s)<[^>]*>").expect("static tag pattern");
}

/// Classify one response.
pub fn classify(response: &RawResponse) -> OneDriveResult<Value> {
    let status = response.status;
    let body_is_empty = response.body.is_empty();

    if is_empty_ok(status) && body_is_empty {
        return Ok(json!({}));
    }

    let content_type = response.content_type.to_ascii_lowercase();
    if content_type.contains("json") || content_type.contains("text/javascript") {
        return classify_json(response);
    }
    if content_type.contains("html") {
        return classify_html(response);
    }
    if body_is_empty {
        return Err(failure(
            OneDriveErrorKind::HttpError,
            status,
            "Empty response and no information in the header".to_string(),
        ));
    }

    Err(failure(
        OneDriveErrorKind::UnrecognizedContentType,
        status,
        format!(
            "Can't process response from server. Status Code: {} Data from server: {}",
            status,
            response.text()
        ),
    ))
}

fn is_empty_ok(status: u16) -> bool {
    status == 200 || status == 204
}

fn classify_json(response: &RawResponse) -> OneDriveResult<Value> {
    let status = response.status;
    let parsed: Value = serde_json::from_slice(&response.body).map_err(|e| {
        failure(
            OneDriveErrorKind::ParseError,
            status,
            format!("Unable to parse JSON response. Error: {}", e),
        )
    })?;

    if (200..399).contains(&status) {
        return Ok(parsed);
    }

    let detail = extract_api_error(&parsed).unwrap_or_else(|| response.text());
    Err(failure(
        OneDriveErrorKind::ApiError,
        status,
        format!(
            "Error from server. Status Code: {} Data from server: {}",
            status, detail
        ),
    ))
}

fn classify_html(response: &RawResponse) -> OneDriveResult<Value> {
    let status = response.status;
    if is_empty_ok(status) {
        return Ok(json!({}));
    }
    Err(failure(
        OneDriveErrorKind::HttpError,
        status,
        format!(
            "Status Code: {}. Data from server:\n{}\n",
            status,
            html_to_text(&response.text())
        ),
    ))
}

/// Pull a readable error out of an identity-platform or Graph error body.
///
/// Identity platform: `{"error_codes": [70000], "error_description": "..."}`.
/// Graph: `{"error": {"code": "...", "message": "..."}}`.
pub fn extract_api_error(body: &Value) -> Option<String> {
    if let Some(code) = body
        .get("error_codes")
        .and_then(Value::as_array)
        .and_then(|codes| codes.first())
    {
        let message = body.get("error_description").map(scalar_text).unwrap_or_default();
        return Some(format!(
            "ErrorCode: {}\nErrorMessage: {}",
            scalar_text(code),
            message
        ));
    }

    let error = body.get("error").filter(|e| e.is_object())?;
    let code = error.get("code").map(scalar_text).unwrap_or_default();
    if code == "UnknownError" {
        return Some("Unknown error occurred".to_string());
    }
    let message = error.get("message").map(scalar_text).unwrap_or_default();
    Some(format!("ErrorCode: {}\nErrorMessage: {}", code, message))
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Reduce an HTML page to its visible text, one trimmed line per block.
pub fn html_to_text(html: &str) -> String {
    let mut text = HTML_COMMENT.replace_all(html, "").into_owned();
    for element in NOISE_ELEMENTS.iter() {
        text = element.replace_all(&text, "").into_owned();
    }
    let text = BLOCK_BREAK.replace_all(&text, "\n");
    let text = HTML_TAG.replace_all(&text, "");
    let text = decode_entities(&text);

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Double braces so the message survives a later format pass verbatim.
pub fn escape_braces(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

fn failure(kind: OneDriveErrorKind, status: u16, message: String) -> OneDriveError {
    OneDriveError::new(kind, escape_braces(&message)).with_status(status)
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
