/*!
HTTP transport abstraction for the remote client.

The client only builds requests and parses responses; sending them is left
to an [`HttpTransport`] so the environment decides TLS, proxies and timeouts.
*/

use crate::error::RemoteError;
use async_trait::async_trait;
use std::fmt;

/// HTTP methods used by the snippet-storage API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// A fully built request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get<S: Into<String>>(url: S) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post<S: Into<String>>(url: S, body: String) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First header value matching `name`, case-insensitively
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status and body of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new<S: Into<String>>(status: u16, body: S) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// True for any 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends requests on behalf of the remote client
///
/// A transport reports every answered request as `Ok`, whatever the status.
/// `Err` is reserved for requests that never produced a response.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, RemoteError>;
}

#[async_trait]
impl<T: HttpTransport + ?Sized> HttpTransport for std::sync::Arc<T> {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, RemoteError> {
        (**self).send(request).await
    }
}

#[cfg(feature = "reqwest-transport")]
pub use reqwest_transport::ReqwestTransport;

#[cfg(feature = "reqwest-transport")]
mod reqwest_transport {
    use super::{HttpRequest, HttpResponse, HttpTransport, Method};
    use crate::error::RemoteError;
    use crate::{Result, SyncError};
    use async_trait::async_trait;
    use std::time::Duration;
    use tracing::debug;

    /// Default timeout in seconds for remote requests
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// [`HttpTransport`] backed by a shared `reqwest` client
    #[derive(Debug, Clone)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        /// Create a transport with the default timeout
        pub fn new() -> Result<Self> {
            Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        }

        /// Create a transport whose requests give up after `timeout`
        pub fn with_timeout(timeout: Duration) -> Result<Self> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(concat!("savesync/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| SyncError::validation(format!("Failed to build HTTP client: {e}")))?;
            Ok(Self { client })
        }
    }

    #[async_trait]
    impl HttpTransport for ReqwestTransport {
        async fn send(
            &self,
            request: HttpRequest,
        ) -> std::result::Result<HttpResponse, RemoteError> {
            let method = match request.method {
                Method::Get => reqwest::Method::GET,
                Method::Post => reqwest::Method::POST,
            };

            let mut builder = self.client.request(method, &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| RemoteError::transport(classify_reqwest_error(&e)))?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| RemoteError::transport(format!("failed to read response body: {e}")))?;

            debug!(url = %request.url, status = status, size = body.len(), "HTTP response received");
            Ok(HttpResponse { status, body })
        }
    }

    fn classify_reqwest_error(error: &reqwest::Error) -> String {
        if error.is_timeout() {
            format!("request timed out: {error}")
        } else if error.is_connect() {
            format!("connection failed: {error}")
        } else if error.is_builder() {
            format!("invalid request: {error}")
        } else {
            format!("network error: {error}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let request = HttpRequest::post("https://example.test/gists", "{}".to_string())
            .header("Authorization", "token abc")
            .header("Content-Type", "application/json");

        assert_eq!(request.method, Method::Post);
        assert_eq!(request.header_value("authorization"), Some("token abc"));
        assert_eq!(request.header_value("content-type"), Some("application/json"));
        assert_eq!(request.body.as_deref(), Some("{}"));

        let request = HttpRequest::get("https://example.test/gists/1");
        assert_eq!(request.method.to_string(), "GET");
        assert!(request.body.is_none());
        assert!(request.header_value("Authorization").is_none());
    }

    #[test]
    fn test_response_success_range() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(201, "").is_success());
        assert!(!HttpResponse::new(304, "").is_success());
        assert!(!HttpResponse::new(404, "").is_success());
        assert!(!HttpResponse::new(500, "").is_success());
    }

    #[cfg(feature = "reqwest-transport")]
    #[test]
    fn test_reqwest_transport_builds() {
        assert!(ReqwestTransport::new().is_ok());
    }
}
