//! REST boundary to the hardware database.
//!
//! [`HwdbClient`] is the seam the submission driver talks to. Whatever the server sends back
//! (a JSON envelope, an HTML error page from a proxy, plain text) is normalized by
//! [`normalize_response`] into a [`Response`] with one of three statuses.

use std::fmt;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde_json::json;

use crate::error::HwdbResult;

/// Outcome class of a REST call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    Error,
    ServerError,
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::Error => f.write_str("Error"),
            Self::ServerError => f.write_str("Server Error"),
        }
    }
}

/// A normalized response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: ResponseStatus,
    /// The JSON body, or `{"status", "data"}` built from a non-JSON body.
    pub payload: serde_json::Value,
}

impl Response {
    pub fn ok(payload: serde_json::Value) -> Self {
        Self {
            status: ResponseStatus::Ok,
            payload,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    /// `data` of the payload, the usual carrier of results and error messages.
    pub fn data(&self) -> &serde_json::Value {
        &self.payload["data"]
    }

    /// A short human-readable description of the response.
    pub fn message(&self) -> String {
        match self.data() {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => self.status.to_string(),
            other => other.to_string(),
        }
    }
}

/// The three verbs the HWDB API needs. `resource` is relative to the API root, e.g.
/// `component-types/Z00100300001/components`.
pub trait HwdbClient {
    fn get(&self, resource: &str) -> HwdbResult<Response>;
    fn post(&self, resource: &str, body: &serde_json::Value) -> HwdbResult<Response>;
    fn patch(&self, resource: &str, body: &serde_json::Value) -> HwdbResult<Response>;
}

/// Normalize a raw HTTP response into a [`Response`]. Never panics.
///
/// - JSON bodies carry their own `status` (`"OK"` → Ok, anything else → Error); without one,
///   the status code decides. A 5xx code always means ServerError.
/// - HTML bodies (error pages) become ServerError for 5xx codes and Error otherwise, with the
///   page title as the message.
/// - Any other body is wrapped as a message; the status code decides.
pub fn normalize_response(status_code: u16, content_type: Option<&str>, body: &str) -> Response {
    let server_error = (500..600).contains(&status_code);
    let by_code = if server_error {
        ResponseStatus::ServerError
    } else if (200..300).contains(&status_code) {
        ResponseStatus::Ok
    } else {
        ResponseStatus::Error
    };
    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
    let trimmed = body.trim_start();

    let looks_json = content_type.contains("json") || trimmed.starts_with('{') || trimmed.starts_with('[');
    if looks_json {
        if let Ok(payload) = serde_json::from_str::<serde_json::Value>(body) {
            let status = match payload.get("status").and_then(|s| s.as_str()) {
                _ if server_error => ResponseStatus::ServerError,
                Some(s) if s.eq_ignore_ascii_case("OK") => ResponseStatus::Ok,
                Some(_) => ResponseStatus::Error,
                None => by_code,
            };
            return Response { status, payload };
        }
    }

    let looks_html = content_type.contains("html") || trimmed.to_ascii_lowercase().starts_with("<!doctype html")
        || trimmed.to_ascii_lowercase().starts_with("<html");
    if looks_html {
        let status = if server_error {
            ResponseStatus::ServerError
        } else {
            ResponseStatus::Error
        };
        let message = html_title(body).unwrap_or_else(|| format!("HTTP {status_code}"));
        return Response {
            status,
            payload: json!({"status": status.to_string(), "data": message, "http_status": status_code}),
        };
    }

    Response {
        status: by_code,
        payload: json!({"status": by_code.to_string(), "data": body.trim(), "http_status": status_code}),
    }
}

fn html_title(body: &str) -> Option<String> {
    let lower = body.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title")?;
    let title = body.get(start..end)?.trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// Blocking HTTP client for the HWDB REST API.
pub struct HttpClient {
    client: Client,
    base_url: String,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> HwdbResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/{}", self.base_url, resource.trim_start_matches('/'))
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder, method: &str, resource: &str) -> HwdbResult<Response> {
        tracing::debug!(method, resource, "hwdb request");
        let response = request
            .header(USER_AGENT, concat!("hwdb-docket/", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, "application/json")
            .send()?;
        let code = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text()?;
        let normalized = normalize_response(code, content_type.as_deref(), &body);
        if !normalized.is_ok() {
            tracing::warn!(method, resource, code, status = %normalized.status, message = %normalized.message(), "hwdb request failed");
        }
        Ok(normalized)
    }
}

impl HwdbClient for HttpClient {
    fn get(&self, resource: &str) -> HwdbResult<Response> {
        self.send(self.client.get(self.url(resource)), "GET", resource)
    }

    fn post(&self, resource: &str, body: &serde_json::Value) -> HwdbResult<Response> {
        self.send(self.client.post(self.url(resource)).json(body), "POST", resource)
    }

    fn patch(&self, resource: &str, body: &serde_json::Value) -> HwdbResult<Response> {
        self.send(self.client.patch(self.url(resource)).json(body), "PATCH", resource)
    }
}
