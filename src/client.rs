//! Authenticated HTTP client for the access-control management API.
//!
//! `EaaClient` wraps a `reqwest::Client` and the immutable [`Credentials`].
//! Every request goes through [`EaaClient::send`], which:
//! - resolves the endpoint against the origin of its API generation,
//! - encodes query parameters and the optional JSON body,
//! - attaches the generation's authorization (Basic or HMAC-signed),
//! - returns the status and body without judging the status.
//!
//! Only transport failures surface as errors from `send`. Callers that
//! want non-2xx answers as errors use [`ApiResponse::error_for_status`] or
//! the [`EaaClient::get_json`] shortcut.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::auth::{Credentials, Endpoint, authorize};
use crate::error::{EaaError, Result};

/// Connect timeout. Covers TCP + TLS handshake only.
const API_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default overall request timeout. Bounds how long a stop request can be
/// held up by an in-flight call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Status and raw body of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status returned by the API.
    pub status: StatusCode,
    /// Response body as text.
    pub body: String,
}

impl ApiResponse {
    /// Returns `self` on 2xx, otherwise an `Api` error carrying status and
    /// body.
    pub fn error_for_status(self) -> Result<Self> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(EaaError::Api {
                status: self.status,
                body: self.body,
            })
        }
    }

    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Authenticated client for both API generations.
///
/// `base_url` is `None` in production, where the origin comes from the
/// endpoint's generation. Tests override it to point every generation at a
/// local mock server.
#[derive(Debug, Clone)]
pub struct EaaClient {
    client: Client,
    credentials: Credentials,
    base_url: Option<String>,
}

fn build_http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .connect_timeout(API_CONNECT_TIMEOUT)
        .timeout(timeout)
        .user_agent(concat!("eaactl/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

impl EaaClient {
    /// Creates a client talking to the production origins.
    pub fn new(credentials: Credentials, timeout: Duration) -> Result<Self> {
        Ok(EaaClient {
            client: build_http_client(timeout)?,
            credentials,
            base_url: None,
        })
    }

    /// Creates a client that sends every request to `base_url`, whatever
    /// the generation. Used by tests to target a mock server.
    pub fn with_base_url(credentials: Credentials, base_url: &str) -> Result<Self> {
        Ok(EaaClient {
            client: build_http_client(DEFAULT_REQUEST_TIMEOUT)?,
            credentials,
            base_url: Some(base_url.to_string()),
        })
    }

    fn url_for(&self, endpoint: &Endpoint) -> Result<Url> {
        let origin = match &self.base_url {
            Some(base) => format!("{}/", base.trim_end_matches('/')),
            None => endpoint.generation.origin(&self.credentials),
        };
        let raw = format!("{origin}{}", endpoint.relative_url());
        Url::parse(&raw).map_err(|e| EaaError::config(format!("invalid URL {raw}: {e}")))
    }

    /// Sends one authenticated request.
    ///
    /// `params` are appended as the query string. `body`, when present, is
    /// sent as JSON. A non-2xx status is *not* an error here; the caller
    /// inspects [`ApiResponse::status`].
    ///
    /// # Errors
    ///
    /// - `EaaError::Network` on DNS, connection, TLS or timeout failures.
    /// - `EaaError::Config` if the endpoint does not form a valid URL.
    pub async fn send(
        &self,
        method: Method,
        endpoint: &Endpoint,
        params: &[(String, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse> {
        let url = self.url_for(endpoint)?;
        let payload = match body {
            Some(value) => serde_json::to_vec(value)?,
            None => Vec::new(),
        };

        let mut builder = self.client.request(method.clone(), url).query(params);
        if body.is_some() {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(payload.clone());
        }
        let mut request = builder.build()?;

        let auth = authorize(
            endpoint.generation,
            &self.credentials,
            &method,
            request.url(),
            &payload,
        );
        let header = HeaderValue::from_str(&auth.header_value())
            .map_err(|e| EaaError::config(format!("credentials produce an invalid header: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, header);

        debug!(%method, url = %request.url(), "sending request");
        let response = self.client.execute(request).await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(%status, bytes = body.len(), "received response");

        Ok(ApiResponse { status, body })
    }

    /// Sends an authenticated GET and deserializes a 2xx JSON answer.
    ///
    /// # Errors
    ///
    /// `EaaError::Api` for non-2xx statuses, `EaaError::Parse` for bodies
    /// of the wrong shape, plus the transport errors of [`EaaClient::send`].
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
        params: &[(String, String)],
    ) -> Result<T> {
        self.send(Method::GET, endpoint, params, None)
            .await?
            .error_for_status()?
            .json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            host: "tenant.example.net".to_string(),
            key_id: "key".to_string(),
            secret: "secret".to_string(),
            access_token: "token".to_string(),
        }
    }

    #[test]
    fn production_url_follows_generation() {
        let client = EaaClient::new(creds(), DEFAULT_REQUEST_TIMEOUT).unwrap();
        let legacy = client.url_for(&Endpoint::legacy("analytics/ops")).unwrap();
        assert_eq!(
            legacy.as_str(),
            "https://manage.akamai-access.com/api/v1/analytics/ops"
        );
        let current = client.url_for(&Endpoint::current("mgmt-pop/idp")).unwrap();
        assert_eq!(
            current.as_str(),
            "https://tenant.example.net/crux/v1/mgmt-pop/idp"
        );
    }

    #[test]
    fn base_url_override_applies_to_both_generations() {
        let client = EaaClient::with_base_url(creds(), "http://127.0.0.1:9999/").unwrap();
        let legacy = client.url_for(&Endpoint::legacy("analytics/ops")).unwrap();
        assert_eq!(legacy.as_str(), "http://127.0.0.1:9999/api/v1/analytics/ops");
        let current = client.url_for(&Endpoint::current("mgmt-pop/agents")).unwrap();
        assert_eq!(current.as_str(), "http://127.0.0.1:9999/crux/v1/mgmt-pop/agents");
    }

    #[test]
    fn error_for_status_keeps_body() {
        let resp = ApiResponse {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: "try later".to_string(),
        };
        let err = resp.error_for_status().unwrap_err();
        assert!(matches!(
            err,
            EaaError::Api { status, ref body } if status == StatusCode::SERVICE_UNAVAILABLE && body == "try later"
        ));
    }

    #[test]
    fn json_reports_parse_errors() {
        let resp = ApiResponse {
            status: StatusCode::OK,
            body: "<html>".to_string(),
        };
        let parsed: Result<serde_json::Value> = resp.json();
        assert!(matches!(parsed, Err(EaaError::Parse(_))));
    }
}
